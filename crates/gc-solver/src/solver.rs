//! Solver contract and settings.

use std::time::Duration;

use gc_types::{CancellationToken, ModuleBasis, Rectangle, SolverError};
use serde::{Deserialize, Serialize};

/// Fixed knobs passed to the solver on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Precision of the returned half-widths.
    pub result_resolution: f64,
    /// Half-widths never exceed this value.
    pub upper_bound: f64,
    pub timeout_seconds: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            result_resolution: 0.01,
            upper_bound: 2048.0,
            timeout_seconds: 600,
        }
    }
}

impl SolverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// One bin-rectangle computation.
#[derive(Debug, Clone, Copy)]
pub struct SolverQuery<'a> {
    /// One 2×k matrix per module, already in the order the solver should
    /// visit them.
    pub modules: &'a [ModuleBasis],
    pub phase_resolution: f64,
    pub result_resolution: f64,
    pub upper_bound: f64,
    pub timeout: Duration,
}

impl<'a> SolverQuery<'a> {
    pub fn new(modules: &'a [ModuleBasis], phase_resolution: f64, settings: &SolverSettings) -> Self {
        Self {
            modules,
            phase_resolution,
            result_resolution: settings.result_resolution,
            upper_bound: settings.upper_bound,
            timeout: settings.timeout(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.modules.first().map_or(0, ModuleBasis::column_count)
    }
}

/// Computes the bounding rectangle of the bin that contains the origin.
///
/// Implementations must poll `cancel` often enough that a cancelled pool
/// drains promptly, and must report exceeding `query.timeout` as
/// [`SolverError::Timeout`]. Any other error is treated as fatal by callers.
pub trait BinRectangleSolver: Send + Sync {
    fn compute_bin_rectangle(
        &self,
        query: &SolverQuery<'_>,
        cancel: &CancellationToken,
    ) -> Result<Rectangle, SolverError>;

    /// Human-readable solver name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = SolverSettings::default();
        assert_eq!(settings.result_resolution, 0.01);
        assert_eq!(settings.upper_bound, 2048.0);
        assert_eq!(settings.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn query_copies_settings() {
        let modules = vec![ModuleBasis::from_rows(vec![1.0, 0.0], vec![0.0, 1.0])];
        let settings = SolverSettings {
            timeout_seconds: 5,
            ..SolverSettings::default()
        };
        let query = SolverQuery::new(&modules, 0.2, &settings);
        assert_eq!(query.column_count(), 2);
        assert_eq!(query.timeout, Duration::from_secs(5));
        assert_eq!(query.phase_resolution, 0.2);
    }

    #[test]
    fn settings_round_trip() {
        let settings = SolverSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: SolverSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }
}
