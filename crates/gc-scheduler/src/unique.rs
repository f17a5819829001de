//! One fresh basis per parameter combination.

use std::sync::Arc;

use crossbeam_channel::Sender;
use gc_solver::TrialEvaluator;
use gc_store::ResultStore;
use gc_types::{
    Basis, CancellationToken, CombinationOutcome, DiscardCounts, GcResult, ParameterCombination,
    ParameterGrid, Rectangle, RunId, SchedulingMode, SolverError, TrialRecord,
};
use rand::Rng;
use tracing::debug;

use crate::config::RunConfig;
use crate::pool::{BatchId, Completion, WorkerPool};
use crate::sampler::{lane_rng, BasisSampler};
use crate::scheduler::{run_lanes, BatchScheduler, BatchStrategy, Verdict};

/// Schedules one batch per trial; every combination in the batch searches
/// independently until it finds an acceptable basis.
pub type UniqueBasesScheduler = BatchScheduler<UniqueBatches>;

impl BatchScheduler<UniqueBatches> {
    pub fn new(
        config: &RunConfig,
        evaluator: TrialEvaluator,
        store: Box<dyn ResultStore>,
    ) -> GcResult<Self> {
        let strategy = UniqueBatches::new(config, evaluator)?;
        BatchScheduler::with_strategy(config, strategy, store)
    }
}

/// The accepted basis of one combination and what was thrown away on the
/// way.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedBasis {
    pub basis: Basis,
    pub rectangle: Rectangle,
    pub discards: DiscardCounts,
}

#[derive(Debug)]
pub struct UniqueBatches {
    run_id: RunId,
    grid: Arc<ParameterGrid>,
    evaluator: TrialEvaluator,
    sampler: BasisSampler,
    size_filter: Option<f64>,
    seed: Option<u64>,
}

impl UniqueBatches {
    pub fn new(config: &RunConfig, evaluator: TrialEvaluator) -> GcResult<Self> {
        Ok(Self {
            run_id: config.run_id,
            grid: Arc::new(config.grid()?),
            evaluator,
            sampler: BasisSampler::new(config.orthogonal, config.normalize_scales),
            size_filter: config.size_filter(),
            seed: config.seed,
        })
    }
}

impl BatchStrategy for UniqueBatches {
    type Output = Vec<AcceptedBasis>;

    fn mode(&self) -> SchedulingMode {
        SchedulingMode::Unique
    }

    fn submit(&mut self, batch: BatchId, pool: &WorkerPool, done: Sender<Completion<Self::Output>>) {
        let grid = Arc::clone(&self.grid);
        let evaluator = self.evaluator.clone();
        let sampler = self.sampler;
        let size_filter = self.size_filter;
        let seed = self.seed;

        pool.submit(batch, done, move |cancel| {
            run_lanes(grid.combinations(), cancel, |lane, combo| {
                let mut rng = lane_rng(seed, batch, lane as u64);
                find_acceptable_basis(combo, &sampler, &evaluator, size_filter, &mut rng, cancel)
            })
        });
    }

    fn finish(&mut self, _batch: BatchId, output: Self::Output) -> Verdict {
        let mut record = TrialRecord::new(self.run_id, SchedulingMode::Unique, &self.grid);
        for ((index, combo), accepted) in self.grid.iter().zip(output) {
            record.push(
                index,
                CombinationOutcome {
                    combination: *combo,
                    basis: accepted.basis,
                    rectangle: accepted.rectangle,
                },
                accepted.discards,
            );
        }
        Verdict::Accepted(record)
    }
}

/// Sample bases for `combo` until one is acceptable.
///
/// Empty or oversized rectangles count as too big, solver timeouts count as
/// timeouts; both are resampled. Any other solver error ends the search.
pub fn find_acceptable_basis<R: Rng>(
    combo: &ParameterCombination,
    sampler: &BasisSampler,
    evaluator: &TrialEvaluator,
    size_filter: Option<f64>,
    rng: &mut R,
    cancel: &CancellationToken,
) -> Result<AcceptedBasis, SolverError> {
    let mut discards = DiscardCounts::default();
    loop {
        if cancel.is_cancelled() {
            return Err(SolverError::Cancelled);
        }

        let basis = sampler.sample(combo.module_count, combo.column_count(), rng);
        match evaluator.evaluate(&basis, combo.phase_resolution, cancel)? {
            Some(rectangle) if rectangle.is_acceptable(size_filter) => {
                return Ok(AcceptedBasis {
                    basis,
                    rectangle,
                    discards,
                })
            }
            Some(rectangle) => {
                discards.too_big += 1;
                debug!(
                    combination = %combo,
                    max_side = rectangle.max_side(),
                    discarded = discards.too_big,
                    "discarding basis, bin too big"
                );
            }
            None => discards.timeout += 1,
        }
    }
}
