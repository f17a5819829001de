//! # gc-scheduler
//!
//! Parallel generation of grid-code bases.
//!
//! Two schedulers share one event loop. The unique scheduler searches a fresh
//! basis for every parameter combination of a trial; the reuse scheduler
//! samples one basis per trial and accepts it only if every slice of it is
//! acceptable. Both keep a fixed number of batches in flight on a rayon pool
//! until the requested number of trials has been stored.

mod config;
mod pool;
mod reuse;
mod sampler;
mod scheduler;
mod unique;

use gc_solver::TrialEvaluator;
use gc_store::ResultStore;
use gc_types::{GcResult, SchedulingMode};

pub use config::RunConfig;
pub use pool::{BatchId, Completion, WorkerPool};
pub use reuse::{ReuseBasesScheduler, ReuseBatches, SlicedBasis};
pub use sampler::{haar_orthogonal, lane_rng, sample_scales, BasisSampler};
pub use scheduler::{
    BatchScheduler, BatchStrategy, InterruptHandle, RunState, Scheduler, SchedulerProgress,
    Verdict,
};
pub use unique::{find_acceptable_basis, AcceptedBasis, UniqueBasesScheduler, UniqueBatches};

/// Build the scheduler selected by `config.mode`.
pub fn build_scheduler(
    config: &RunConfig,
    evaluator: TrialEvaluator,
    store: Box<dyn ResultStore>,
) -> GcResult<Box<dyn Scheduler>> {
    Ok(match config.mode {
        SchedulingMode::Unique => Box::new(UniqueBasesScheduler::new(config, evaluator, store)?),
        SchedulingMode::Reuse => Box::new(ReuseBasesScheduler::new(config, evaluator, store)?),
    })
}
