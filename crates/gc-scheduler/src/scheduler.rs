//! Event loop shared by the unique and reuse schedulers.
//!
//! Workers only compute. Every completion comes back over one channel to the
//! thread that called [`Scheduler::join`], which alone assigns record
//! indices, writes to the store, updates counters and submits the next batch.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use gc_store::ResultStore;
use gc_types::{
    internal_error, CancellationToken, FailureRecord, GcError, GcResult, RunId, SchedulerError,
    SchedulingMode, SolverError, TrialRecord,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::pool::{BatchId, Completion, WorkerPool};

/// Lifecycle state of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Counters of a scheduler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerProgress {
    pub run_id: RunId,
    pub mode: SchedulingMode,
    pub state: RunState,
    pub quota: usize,
    pub successes: usize,
    pub failures: usize,
    pub in_flight: usize,
    pub batches_submitted: u64,
    pub batches_completed: u64,
    /// Completions that were received but never persisted: cancelled
    /// batches, and batches that had already finished when the loop stopped.
    pub ignored_completions: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SchedulerProgress {
    pub fn new(run_id: RunId, mode: SchedulingMode, quota: usize) -> Self {
        Self {
            run_id,
            mode,
            state: RunState::Pending,
            quota,
            successes: 0,
            failures: 0,
            in_flight: 0,
            batches_submitted: 0,
            batches_completed: 0,
            ignored_completions: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.successes >= self.quota
    }

    pub fn remaining(&self) -> usize {
        self.quota.saturating_sub(self.successes)
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

/// Stops a running scheduler from another thread.
///
/// Interrupting cancels every in-flight batch and makes `join` return
/// [`SchedulerError::Interrupted`].
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    wake: Sender<()>,
    token: CancellationToken,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        // Wake first: a cancelled batch must never be seen without it.
        let _ = self.wake.send(());
        self.token.cancel();
    }
}

/// A trial scheduler.
pub trait Scheduler: Send {
    /// Fill the pool with the initial batches. Called by `join` if needed.
    fn start(&mut self) -> GcResult<()>;

    /// Block until the quota is met, a fatal error occurs or the run is
    /// interrupted.
    fn join(&mut self) -> GcResult<SchedulerProgress>;

    fn interrupt_handle(&self) -> InterruptHandle;

    fn progress(&self) -> &SchedulerProgress;
}

/// What a finished batch turned into.
#[derive(Debug)]
pub enum Verdict {
    Accepted(TrialRecord),
    Rejected(FailureRecord),
}

/// How one scheduling mode fills and interprets batches.
pub trait BatchStrategy: Send {
    type Output: Send + 'static;

    fn mode(&self) -> SchedulingMode;

    /// Spawn batch `batch` on `pool`; its result must be delivered to `done`.
    fn submit(&mut self, batch: BatchId, pool: &WorkerPool, done: Sender<Completion<Self::Output>>);

    /// Interpret a successful batch. Runs on the event-loop thread.
    fn finish(&mut self, batch: BatchId, output: Self::Output) -> Verdict;
}

/// Drives a [`BatchStrategy`] until the success quota is met.
pub struct BatchScheduler<S: BatchStrategy> {
    strategy: S,
    pool: WorkerPool,
    store: Box<dyn ResultStore>,
    done_tx: Sender<Completion<S::Output>>,
    done_rx: Receiver<Completion<S::Output>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    progress: SchedulerProgress,
    in_flight_target: usize,
    next_batch: BatchId,
    joined: bool,
}

impl<S: BatchStrategy> std::fmt::Debug for BatchScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("pool", &self.pool)
            .field("progress", &self.progress)
            .field("in_flight_target", &self.in_flight_target)
            .finish()
    }
}

impl<S: BatchStrategy> BatchScheduler<S> {
    pub fn with_strategy(
        config: &RunConfig,
        strategy: S,
        store: Box<dyn ResultStore>,
    ) -> GcResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.resolved_worker_threads())?;
        let (done_tx, done_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let progress = SchedulerProgress::new(config.run_id, strategy.mode(), config.num_trials);

        Ok(Self {
            strategy,
            pool,
            store,
            done_tx,
            done_rx,
            wake_tx,
            wake_rx,
            progress,
            in_flight_target: config.resolved_in_flight_batches(),
            next_batch: 0,
            joined: false,
        })
    }

    fn submit_next(&mut self) {
        let batch = self.next_batch;
        self.next_batch += 1;
        self.progress.batches_submitted += 1;
        self.progress.in_flight += 1;
        debug!(batch, in_flight = self.progress.in_flight, "submitting batch");
        self.strategy.submit(batch, &self.pool, self.done_tx.clone());
    }

    fn run_loop(&mut self) -> GcResult<()> {
        let wake_rx = self.wake_rx.clone();
        let done_rx = self.done_rx.clone();
        while !self.progress.is_complete() {
            select! {
                recv(wake_rx) -> _ => return Err(self.interrupted()),
                recv(done_rx) -> msg => {
                    let completion = msg.map_err(|_| SchedulerError::WorkerLost {
                        in_flight: self.progress.in_flight,
                    })?;
                    // An interrupt that raced this completion still wins.
                    if !wake_rx.is_empty() {
                        self.discard(completion.batch);
                        return Err(self.interrupted());
                    }
                    self.on_completion(completion)?;
                }
            }
        }
        Ok(())
    }

    fn interrupted(&self) -> GcError {
        warn!(
            successes = self.progress.successes,
            in_flight = self.progress.in_flight,
            "interrupt received, terminating workers"
        );
        SchedulerError::Interrupted.into()
    }

    fn settle(&mut self) {
        self.progress.in_flight = self.progress.in_flight.saturating_sub(1);
        self.progress.batches_completed += 1;
    }

    fn discard(&mut self, batch: BatchId) {
        self.settle();
        self.progress.ignored_completions += 1;
        debug!(batch, "discarding completion");
    }

    /// Account for batches that finished after the loop stopped listening.
    fn drain_finished(&mut self) {
        let done_rx = self.done_rx.clone();
        for completion in done_rx.try_iter() {
            self.discard(completion.batch);
        }
    }

    fn on_completion(&mut self, completion: Completion<S::Output>) -> GcResult<()> {
        let Completion { batch, result } = completion;
        self.settle();

        let output = match result {
            Ok(output) => output,
            Err(SolverError::Cancelled) if self.pool.is_shut_down() => {
                self.progress.ignored_completions += 1;
                debug!(batch, "batch cancelled");
                if !self.wake_rx.is_empty() {
                    return Err(SchedulerError::Interrupted.into());
                }
                if self.progress.in_flight == 0 {
                    return Err(internal_error!(
                        "worker pool cancelled with {} trials outstanding",
                        self.progress.remaining()
                    ));
                }
                return Ok(());
            }
            Err(err) => {
                error!(batch, error = %err, "batch failed");
                return Err(err.into());
            }
        };

        match self.strategy.finish(batch, output) {
            Verdict::Accepted(record) => {
                let path = self.store.store_success(self.progress.successes, &record)?;
                self.progress.successes += 1;
                info!(
                    batch,
                    path = %path.display(),
                    remaining = self.progress.remaining(),
                    "saved trial"
                );
            }
            Verdict::Rejected(failure) => {
                let path = self.store.store_failure(self.progress.failures, &failure)?;
                self.progress.failures += 1;
                info!(
                    batch,
                    path = %path.display(),
                    failures = self.progress.failures,
                    "saved rejected sample"
                );
            }
        }

        if !self.progress.is_complete() {
            self.submit_next();
        }
        Ok(())
    }
}

impl<S: BatchStrategy> Scheduler for BatchScheduler<S> {
    fn start(&mut self) -> GcResult<()> {
        if self.progress.state != RunState::Pending {
            return Ok(());
        }
        self.progress.mark_running();
        info!(
            run_id = %self.progress.run_id,
            mode = %self.progress.mode,
            quota = self.progress.quota,
            workers = self.pool.threads(),
            batches = self.in_flight_target,
            "starting scheduler"
        );
        for _ in 0..self.in_flight_target {
            self.submit_next();
        }
        Ok(())
    }

    fn join(&mut self) -> GcResult<SchedulerProgress> {
        if self.joined {
            return Err(SchedulerError::AlreadyJoined.into());
        }
        self.start()?;
        let outcome = self.run_loop();
        self.joined = true;
        self.pool.shutdown();
        self.drain_finished();

        match &outcome {
            Ok(()) => {
                self.progress.mark_completed();
                info!(
                    successes = self.progress.successes,
                    failures = self.progress.failures,
                    batches = self.progress.batches_submitted,
                    "quota reached"
                );
            }
            Err(err) if err.is_interrupt() => self.progress.mark_cancelled(),
            Err(err) => self.progress.mark_failed(err.to_string()),
        }
        outcome.map(|()| self.progress.clone())
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            wake: self.wake_tx.clone(),
            token: self.pool.token(),
        }
    }

    fn progress(&self) -> &SchedulerProgress {
        &self.progress
    }
}

/// Evaluate `items` in parallel on the current pool, preserving order.
///
/// The first non-cancellation error cancels `cancel` so sibling lanes stop
/// early, and that error is the one returned.
pub(crate) fn run_lanes<I, T, F>(
    items: &[I],
    cancel: &CancellationToken,
    lane: F,
) -> Result<Vec<T>, SolverError>
where
    I: Sync,
    T: Send,
    F: Fn(usize, &I) -> Result<T, SolverError> + Sync + Send,
{
    let fatal = OnceLock::new();
    let results = items
        .par_iter()
        .enumerate()
        .map(|(i, item)| {
            lane(i, item).map_err(|err| {
                if err != SolverError::Cancelled {
                    let _ = fatal.set(err.clone());
                    cancel.cancel();
                }
                err
            })
        })
        .collect::<Result<Vec<T>, SolverError>>();

    match fatal.into_inner() {
        Some(err) => Err(err),
        None => results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_store::MemoryStore;
    use gc_types::ParameterGrid;
    use std::sync::Arc;

    /// Reports every batch as finished the moment it is submitted.
    struct InstantBatches {
        run_id: RunId,
        grid: ParameterGrid,
    }

    impl BatchStrategy for InstantBatches {
        type Output = ();

        fn mode(&self) -> SchedulingMode {
            SchedulingMode::Unique
        }

        fn submit(&mut self, batch: BatchId, _pool: &WorkerPool, done: Sender<Completion<()>>) {
            let _ = done.send(Completion {
                batch,
                result: Ok(()),
            });
        }

        fn finish(&mut self, _batch: BatchId, _output: ()) -> Verdict {
            Verdict::Accepted(TrialRecord::new(self.run_id, SchedulingMode::Unique, &self.grid))
        }
    }

    fn instant(
        trials: usize,
        in_flight: usize,
        store: Arc<MemoryStore>,
    ) -> BatchScheduler<InstantBatches> {
        let config = RunConfig::new("unused", vec![1], vec![1.0])
            .with_num_trials(trials)
            .with_worker_threads(1)
            .with_in_flight_batches(in_flight);
        let strategy = InstantBatches {
            run_id: config.run_id,
            grid: config.grid().unwrap(),
        };
        BatchScheduler::with_strategy(&config, strategy, Box::new(store)).unwrap()
    }

    #[test]
    fn finished_batches_past_the_quota_are_counted_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let mut scheduler = instant(1, 3, store.clone());

        let progress = scheduler.join().unwrap();
        assert_eq!(progress.successes, 1);
        assert_eq!(progress.batches_submitted, 3);
        assert_eq!(progress.batches_completed, 3);
        assert_eq!(progress.ignored_completions, 2);
        assert_eq!(progress.in_flight, 0);
        assert_eq!(store.success_count(), 1);
    }

    #[test]
    fn pending_interrupt_beats_a_ready_completion() {
        let store = Arc::new(MemoryStore::new());
        let mut scheduler = instant(2, 1, store.clone());
        scheduler.interrupt_handle().interrupt();

        let err = scheduler.join().unwrap_err();
        assert!(err.is_interrupt());
        assert_eq!(store.success_count(), 0);

        let progress = scheduler.progress();
        assert_eq!(progress.state, RunState::Cancelled);
        assert_eq!(progress.successes, 0);
        assert_eq!(progress.ignored_completions, 1);
        assert_eq!(progress.in_flight, 0);
    }

    #[test]
    fn progress_lifecycle() {
        let mut progress = SchedulerProgress::new(uuid::Uuid::new_v4(), SchedulingMode::Reuse, 3);
        assert_eq!(progress.state, RunState::Pending);
        assert_eq!(progress.remaining(), 3);
        assert!(!progress.is_complete());

        progress.mark_running();
        assert!(progress.started_at.is_some());

        progress.successes = 3;
        assert!(progress.is_complete());
        assert_eq!(progress.remaining(), 0);

        progress.mark_failed("disk full".into());
        assert_eq!(progress.state, RunState::Failed);
        assert_eq!(progress.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn lanes_keep_order() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let items: Vec<u32> = (0..20).collect();
        let out = pool
            .install(|| run_lanes(&items, &CancellationToken::new(), |i, x| Ok(i as u32 + x)))
            .unwrap();
        assert_eq!(out, (0..20).map(|x| 2 * x).collect::<Vec<_>>());
    }

    #[test]
    fn fatal_lane_error_wins_and_cancels() {
        let cancel = CancellationToken::new();
        let items: Vec<usize> = (0..8).collect();
        let err = run_lanes(&items, &cancel, |i, _| {
            if i == 5 {
                Err(SolverError::Failed {
                    message: "bad lattice".into(),
                })
            } else if cancel.is_cancelled() {
                Err(SolverError::Cancelled)
            } else {
                Ok(i)
            }
        })
        .unwrap_err();

        assert!(matches!(err, SolverError::Failed { .. }));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn cancellation_alone_is_returned_as_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_lanes(&[1, 2, 3], &cancel, |_, _| Err::<(), _>(SolverError::Cancelled))
            .unwrap_err();
        assert_eq!(err, SolverError::Cancelled);
    }
}
