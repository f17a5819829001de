//! Run configuration.

use std::path::{Path, PathBuf};

use gc_solver::SolverSettings;
use gc_types::{config_error, GcResult, ParameterGrid, RunId, SchedulingMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything a scheduler needs to know about one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: RunId,

    /// Folder that receives `in/` and `failures/`.
    pub output_dir: PathBuf,

    /// Number of trial records to produce.
    pub num_trials: usize,

    pub module_counts: Vec<usize>,
    pub dimensions: Vec<f64>,
    pub phase_resolutions: Vec<f64>,

    /// Draw module bases from Haar-random orthogonal matrices.
    pub orthogonal: bool,

    /// Rescale module scales so their mean is exactly 1.
    pub normalize_scales: bool,

    /// Reject rectangles with any side at or above `max_bin_sidelength`.
    pub filtered: bool,
    pub max_bin_sidelength: f64,

    pub mode: SchedulingMode,

    /// Worker threads; 0 means one per available CPU.
    pub worker_threads: usize,

    /// Batches kept in flight; 0 means one per worker.
    pub in_flight_batches: usize,

    pub solver: SolverSettings,

    /// Seed for reproducible sampling. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(output_dir: impl Into<PathBuf>, module_counts: Vec<usize>, dimensions: Vec<f64>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            output_dir: output_dir.into(),
            num_trials: 1,
            module_counts,
            dimensions,
            phase_resolutions: vec![0.2],
            orthogonal: false,
            normalize_scales: false,
            filtered: false,
            max_bin_sidelength: 1.0,
            mode: SchedulingMode::Unique,
            worker_threads: 0,
            in_flight_batches: 0,
            solver: SolverSettings::default(),
            seed: None,
        }
    }

    pub fn with_num_trials(mut self, n: usize) -> Self {
        self.num_trials = n;
        self
    }

    pub fn with_phase_resolutions(mut self, phrs: Vec<f64>) -> Self {
        self.phase_resolutions = phrs;
        self
    }

    pub fn with_orthogonal(mut self, orthogonal: bool) -> Self {
        self.orthogonal = orthogonal;
        self
    }

    pub fn with_normalize_scales(mut self, normalize: bool) -> Self {
        self.normalize_scales = normalize;
        self
    }

    pub fn with_filter(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }

    pub fn with_max_bin_sidelength(mut self, bound: f64) -> Self {
        self.max_bin_sidelength = bound;
        self
    }

    pub fn with_mode(mut self, mode: SchedulingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn with_in_flight_batches(mut self, n: usize) -> Self {
        self.in_flight_batches = n;
        self
    }

    pub fn with_solver(mut self, settings: SolverSettings) -> Self {
        self.solver = settings;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// The size bound applied to accepted rectangles, if filtering is on.
    pub fn size_filter(&self) -> Option<f64> {
        self.filtered.then_some(self.max_bin_sidelength)
    }

    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn resolved_in_flight_batches(&self) -> usize {
        if self.in_flight_batches > 0 {
            self.in_flight_batches
        } else {
            self.resolved_worker_threads()
        }
    }

    pub fn grid(&self) -> GcResult<ParameterGrid> {
        ParameterGrid::new(
            self.phase_resolutions.clone(),
            self.module_counts.clone(),
            self.dimensions.clone(),
        )
    }

    pub fn validate(&self) -> GcResult<()> {
        if self.num_trials == 0 {
            return Err(config_error!("num_trials must be at least 1"));
        }
        if self.filtered && !(self.max_bin_sidelength.is_finite() && self.max_bin_sidelength > 0.0) {
            return Err(config_error!(
                "max_bin_sidelength must be positive, got {}",
                self.max_bin_sidelength
            ));
        }
        let solver = &self.solver;
        if !(solver.result_resolution > 0.0 && solver.upper_bound > solver.result_resolution) {
            return Err(config_error!(
                "solver needs 0 < result_resolution < upper_bound, got {} and {}",
                solver.result_resolution,
                solver.upper_bound
            ));
        }
        self.grid().map(|_| ())
    }

    /// Write the resolved configuration to `<dir>/config.json`.
    pub fn write_to(&self, dir: &Path) -> GcResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("config.json");
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> RunConfig {
        RunConfig::new("out", vec![2, 3], vec![2.0, 4.0])
            .with_num_trials(5)
            .with_phase_resolutions(vec![0.2, 0.1])
            .with_filter(true)
    }

    #[test]
    fn defaults_match_command_line_defaults() {
        let config = RunConfig::new("out", vec![1], vec![1.0]);
        assert_eq!(config.num_trials, 1);
        assert_eq!(config.phase_resolutions, vec![0.2]);
        assert_eq!(config.mode, SchedulingMode::Unique);
        assert!(!config.orthogonal);
        assert_eq!(config.size_filter(), None);
        assert_eq!(config.solver, SolverSettings::default());
    }

    #[test]
    fn filter_uses_configured_bound() {
        let config = sample_config().with_max_bin_sidelength(0.5);
        assert_eq!(config.size_filter(), Some(0.5));
    }

    #[test]
    fn worker_resolution() {
        let config = sample_config();
        assert!(config.resolved_worker_threads() >= 1);
        assert_eq!(
            config.resolved_in_flight_batches(),
            config.resolved_worker_threads()
        );

        let pinned = sample_config()
            .with_worker_threads(3)
            .with_in_flight_batches(7);
        assert_eq!(pinned.resolved_worker_threads(), 3);
        assert_eq!(pinned.resolved_in_flight_batches(), 7);
    }

    #[test]
    fn validation_rejects_bad_runs() {
        assert!(sample_config().validate().is_ok());
        assert!(sample_config().with_num_trials(0).validate().is_err());
        assert!(sample_config()
            .with_max_bin_sidelength(-1.0)
            .validate()
            .is_err());
        // m=1 with k=3 has no admissible combination.
        assert!(RunConfig::new("out", vec![1], vec![3.0]).validate().is_err());

        let bad_solver = sample_config().with_solver(SolverSettings {
            result_resolution: 0.0,
            ..SolverSettings::default()
        });
        assert!(bad_solver.validate().is_err());
    }

    #[test]
    fn config_round_trip() {
        let config = sample_config()
            .with_mode(SchedulingMode::Reuse)
            .with_seed(Some(7));
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
