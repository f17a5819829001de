//! Trial and failure records persisted by the result store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::basis::{Basis, Rectangle};
use crate::params::{Array3, GridIndex, ParameterCombination, ParameterGrid};

/// Unique identifier of one scheduler run.
pub type RunId = Uuid;

/// How bases are drawn across the combinations of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Every combination searches its own independent basis.
    Unique,
    /// One basis per trial, sliced down for every combination.
    Reuse,
}

impl Default for SchedulingMode {
    fn default() -> Self {
        Self::Unique
    }
}

impl std::fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Reuse => write!(f, "reuse"),
        }
    }
}

/// Samples thrown away before a combination produced an accepted basis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardCounts {
    pub too_big: u64,
    pub timeout: u64,
}

impl DiscardCounts {
    pub fn total(&self) -> u64 {
        self.too_big + self.timeout
    }
}

/// The accepted basis and rectangle for one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationOutcome {
    #[serde(flatten)]
    pub combination: ParameterCombination,
    #[serde(flatten)]
    pub basis: Basis,
    pub rectangle: Rectangle,
}

/// One complete sweep: an accepted result for every combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub run_id: RunId,
    pub mode: SchedulingMode,
    pub phase_resolutions: Vec<f64>,
    pub ms: Vec<usize>,
    pub ks: Vec<f64>,
    pub discarded_too_big: Array3<u64>,
    pub discarded_timeout: Array3<u64>,
    /// Largest rectangle component per combination; `None` where 2m < k.
    pub bin_sidelength: Array3<Option<f64>>,
    pub entries: Vec<CombinationOutcome>,
    /// The basis every entry was sliced from (reuse mode only).
    pub shared_basis: Option<Basis>,
    pub created_at: DateTime<Utc>,
}

impl TrialRecord {
    pub fn new(run_id: RunId, mode: SchedulingMode, grid: &ParameterGrid) -> Self {
        let shape = grid.shape();
        Self {
            run_id,
            mode,
            phase_resolutions: grid.phase_resolutions().to_vec(),
            ms: grid.module_counts().to_vec(),
            ks: grid.dimensions().to_vec(),
            discarded_too_big: Array3::filled(shape, 0),
            discarded_timeout: Array3::filled(shape, 0),
            bin_sidelength: Array3::filled(shape, None),
            entries: Vec::with_capacity(grid.len()),
            shared_basis: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_shared_basis(mut self, basis: Basis) -> Self {
        self.shared_basis = Some(basis);
        self
    }

    /// Record the accepted outcome of the combination at `index`.
    pub fn push(&mut self, index: GridIndex, outcome: CombinationOutcome, discards: DiscardCounts) {
        self.discarded_too_big.add(index, discards.too_big);
        self.discarded_timeout.add(index, discards.timeout);
        self.bin_sidelength.set(index, outcome.rectangle.max_side());
        self.entries.push(outcome);
    }

    pub fn entry(&self, combination: &ParameterCombination) -> Option<&CombinationOutcome> {
        self.entries.iter().find(|e| e.combination == *combination)
    }

    /// Every rectangle non-empty and, when bounded, strictly below the bound.
    pub fn all_acceptable(&self, max_side: Option<f64>) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.rectangle.is_acceptable(max_side))
    }
}

/// Evaluation outcome of one slice of a rejected sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceOutcome {
    #[serde(flatten)]
    pub combination: ParameterCombination,
    /// `None` when the solver timed out on this slice.
    pub rectangle: Option<Rectangle>,
}

/// A sampled basis that failed at least one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub run_id: RunId,
    pub phase_resolutions: Vec<f64>,
    pub ms: Vec<usize>,
    pub ks: Vec<f64>,
    #[serde(flatten)]
    pub basis: Basis,
    pub slices: Vec<SliceOutcome>,
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(run_id: RunId, grid: &ParameterGrid, basis: Basis, slices: Vec<SliceOutcome>) -> Self {
        Self {
            run_id,
            phase_resolutions: grid.phase_resolutions().to_vec(),
            ms: grid.module_counts().to_vec(),
            ks: grid.dimensions().to_vec(),
            basis,
            slices,
            created_at: Utc::now(),
        }
    }

    /// Slices that caused the rejection.
    pub fn rejected_slices(&self, max_side: Option<f64>) -> impl Iterator<Item = &SliceOutcome> + '_ {
        self.slices.iter().filter(move |slice| {
            !slice
                .rectangle
                .as_ref()
                .is_some_and(|rect| rect.is_acceptable(max_side))
        })
    }
}
