//! # gc-solver
//!
//! Bin-rectangle solving for sampled grid-code bases.
//!
//! The [`BinRectangleSolver`] trait is the seam to the expensive geometric
//! computation. [`ZeroBinSolver`] is the reference implementation shipped with
//! the workspace, and [`TrialEvaluator`] wraps any solver with the fixed
//! resolution, bound and timeout used by the schedulers.

mod evaluator;
mod solver;
mod zero_bin;

pub use evaluator::TrialEvaluator;
pub use solver::{BinRectangleSolver, SolverQuery, SolverSettings};
pub use zero_bin::ZeroBinSolver;
