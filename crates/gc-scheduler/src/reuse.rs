//! One shared basis sliced to every parameter combination.

use std::sync::Arc;

use crossbeam_channel::Sender;
use gc_solver::TrialEvaluator;
use gc_store::ResultStore;
use gc_types::{
    Basis, CombinationOutcome, DiscardCounts, FailureRecord, GcResult, ParameterGrid, Rectangle,
    RunId, SchedulingMode, SliceOutcome, TrialRecord,
};
use tracing::debug;

use crate::config::RunConfig;
use crate::pool::{BatchId, Completion, WorkerPool};
use crate::sampler::{lane_rng, BasisSampler};
use crate::scheduler::{run_lanes, BatchScheduler, BatchStrategy, Verdict};

/// Schedules one sampled basis per batch. The batch succeeds only if every
/// slice of that basis is acceptable; otherwise the basis is recorded as a
/// failure and a new one is drawn.
pub type ReuseBasesScheduler = BatchScheduler<ReuseBatches>;

impl BatchScheduler<ReuseBatches> {
    pub fn new(
        config: &RunConfig,
        evaluator: TrialEvaluator,
        store: Box<dyn ResultStore>,
    ) -> GcResult<Self> {
        let strategy = ReuseBatches::new(config, evaluator)?;
        BatchScheduler::with_strategy(config, strategy, store)
    }
}

/// A sampled basis and the rectangle of each of its slices, in grid order.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicedBasis {
    pub basis: Basis,
    /// `None` where the solver timed out.
    pub rectangles: Vec<Option<Rectangle>>,
}

#[derive(Debug)]
pub struct ReuseBatches {
    run_id: RunId,
    grid: Arc<ParameterGrid>,
    evaluator: TrialEvaluator,
    sampler: BasisSampler,
    size_filter: Option<f64>,
    seed: Option<u64>,
}

impl ReuseBatches {
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

    /// Draw a basis large enough for every combination in the grid.
    pub fn sample_shared_basis(&self, batch: BatchId) -> Basis {
        let mut rng = lane_rng(self.seed, batch, 0);
        self.sampler.sample(
            self.grid.max_module_count(),
            self.grid.max_column_count(),
            &mut rng,
        )
    }
}

impl BatchStrategy for ReuseBatches {
    type Output = SlicedBasis;

    fn mode(&self) -> SchedulingMode {
        SchedulingMode::Reuse
    }

    fn submit(&mut self, batch: BatchId, pool: &WorkerPool, done: Sender<Completion<Self::Output>>) {
        let basis = self.sample_shared_basis(batch);
        let grid = Arc::clone(&self.grid);
        let evaluator = self.evaluator.clone();

        pool.submit(batch, done, move |cancel| {
            let rectangles = run_lanes(grid.combinations(), cancel, |_, combo| {
                let slice = basis.slice(combo.module_count, combo.column_count());
                evaluator.evaluate(&slice, combo.phase_resolution, cancel)
            })?;
            Ok(SlicedBasis { basis, rectangles })
        });
    }

    fn finish(&mut self, batch: BatchId, output: Self::Output) -> Verdict {
        let SlicedBasis { basis, rectangles } = output;
        let accepted = rectangles
            .iter()
            .all(|rect| rect.as_ref().is_some_and(|r| r.is_acceptable(self.size_filter)));

        if !accepted {
            let slices: Vec<SliceOutcome> = self
                .grid
                .combinations()
                .iter()
                .zip(rectangles)
                .map(|(combo, rectangle)| SliceOutcome {
                    combination: *combo,
                    rectangle,
                })
                .collect();
            let failure = FailureRecord::new(self.run_id, &self.grid, basis, slices);
            debug!(
                batch,
                rejected = failure.rejected_slices(self.size_filter).count(),
                "shared basis rejected"
            );
            return Verdict::Rejected(failure);
        }

        let mut record = TrialRecord::new(self.run_id, SchedulingMode::Reuse, &self.grid);
        for ((index, combo), rectangle) in self.grid.iter().zip(rectangles.into_iter().flatten()) {
            record.push(
                index,
                CombinationOutcome {
                    combination: *combo,
                    basis: basis.slice(combo.module_count, combo.column_count()),
                    rectangle,
                },
                DiscardCounts::default(),
            );
        }
        Verdict::Accepted(record.with_shared_basis(basis))
    }
}
