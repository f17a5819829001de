//! Worker pool shared by both schedulers.

use crossbeam_channel::Sender;
use gc_types::{CancellationToken, GcResult, SchedulerError, SolverError};
use tracing::{debug, error};

/// Identifier of one submitted batch, increasing from 0 per run.
pub type BatchId = u64;

/// A finished batch as seen by the event loop.
#[derive(Debug)]
pub struct Completion<T> {
    pub batch: BatchId,
    pub result: Result<T, SolverError>,
}

/// Fixed-size rayon pool plus the token that stops its jobs.
///
/// A batch is one job on the pool; it may fan out further with rayon's
/// parallel iterators, which stay on the same pool.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    token: CancellationToken,
    threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> GcResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gc-worker-{i}"))
            .panic_handler(|_| error!("worker panicked while evaluating a batch"))
            .build()
            .map_err(|e| SchedulerError::PoolBuild {
                message: e.to_string(),
            })?;
        debug!(threads, "worker pool started");
        Ok(Self {
            pool,
            token: CancellationToken::new(),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `job` on the pool and deliver its result to `done`.
    ///
    /// If the job panics, a `Failed` completion is delivered instead so the
    /// event loop never waits on a batch that will not report.
    pub fn submit<T, F>(&self, batch: BatchId, done: Sender<Completion<T>>, job: F)
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T, SolverError> + Send + 'static,
    {
        let token = self.token.clone();
        let reply = Reply {
            batch,
            done: Some(done),
        };
        self.pool.spawn(move || {
            let result = job(&token);
            reply.send(result);
        });
    }

    /// Signal every running job to stop at its next checkpoint.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            debug!(threads = self.threads, "cancelling worker pool");
        }
        self.token.cancel();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Reply<T> {
    batch: BatchId,
    done: Option<Sender<Completion<T>>>,
}

impl<T> Reply<T> {
    fn send(mut self, result: Result<T, SolverError>) {
        if let Some(done) = self.done.take() {
            // The loop may already have returned; nobody is left to tell.
            let _ = done.send(Completion {
                batch: self.batch,
                result,
            });
        }
    }
}

impl<T> Drop for Reply<T> {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Completion {
                batch: self.batch,
                result: Err(SolverError::Failed {
                    message: format!("batch {} panicked", self.batch),
                }),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn results_come_back_tagged() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, rx) = unbounded();
        for batch in 0..4u64 {
            pool.submit(batch, tx.clone(), move |_| Ok(batch * 10));
        }

        let mut seen: Vec<(BatchId, u64)> = (0..4)
            .map(|_| {
                let c = rx.recv_timeout(Duration::from_secs(5)).unwrap();
                (c.batch, c.result.unwrap())
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![(0, 0), (1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn shutdown_is_visible_to_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = unbounded();
        pool.shutdown();
        assert!(pool.is_shut_down());

        pool.submit(0, tx, |token| {
            if token.is_cancelled() {
                Err(SolverError::Cancelled)
            } else {
                Ok(())
            }
        });
        let c = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(c.result, Err(SolverError::Cancelled));
    }

    #[test]
    fn panicking_job_still_reports() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = unbounded::<Completion<()>>();
        pool.submit(7, tx, |_| panic!("boom"));

        let c = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(c.batch, 7);
        assert!(matches!(c.result, Err(SolverError::Failed { .. })));
    }
}
