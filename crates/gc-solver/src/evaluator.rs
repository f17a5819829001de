//! Single-basis evaluation with timeout classification.

use std::sync::Arc;

use gc_types::{Basis, CancellationToken, Rectangle, SolverError};
use tracing::{debug, warn};

use crate::solver::{BinRectangleSolver, SolverQuery, SolverSettings};

/// Wraps one solver call per basis.
///
/// Timeouts are logged and reported as `Ok(None)` so the caller can resample;
/// every other solver error is returned unchanged and treated as fatal.
#[derive(Clone)]
pub struct TrialEvaluator {
    solver: Arc<dyn BinRectangleSolver>,
    settings: SolverSettings,
}

impl std::fmt::Debug for TrialEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialEvaluator")
            .field("solver", &self.solver.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl TrialEvaluator {
    pub fn new(solver: Arc<dyn BinRectangleSolver>, settings: SolverSettings) -> Self {
        Self { solver, settings }
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    pub fn evaluate(
        &self,
        basis: &Basis,
        phase_resolution: f64,
        cancel: &CancellationToken,
    ) -> Result<Option<Rectangle>, SolverError> {
        // The solver prunes faster when the coarsest modules come first.
        let ordered = basis.sorted_by_scale_desc();
        let query = SolverQuery::new(&ordered.modules, phase_resolution, &self.settings);

        match self.solver.compute_bin_rectangle(&query, cancel) {
            Ok(rect) => {
                debug!(
                    phase_resolution,
                    modules = basis.module_count(),
                    columns = basis.column_count(),
                    sides = rect.len(),
                    "evaluated basis"
                );
                Ok(Some(rect))
            }
            Err(SolverError::Timeout { timeout_seconds }) => {
                let basis_json = serde_json::to_string(&basis.modules).unwrap_or_default();
                warn!(
                    timeout_seconds,
                    phase_resolution,
                    basis = %basis_json,
                    "solver timed out on query"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
