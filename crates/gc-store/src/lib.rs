//! Result persistence for generated bases.
//!
//! Successful trials and rejected samples are written once under a
//! monotonically increasing index and never overwritten.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use std::path::PathBuf;

use gc_types::{FailureRecord, GcResult, TrialRecord};

/// Destination for finished trials and rejected samples.
pub trait ResultStore: Send {
    /// Persist a finished trial under `index`. Returns where it was written.
    fn store_success(&self, index: usize, record: &TrialRecord) -> GcResult<PathBuf>;

    /// Persist a rejected sample under `index`. Returns where it was written.
    fn store_failure(&self, index: usize, record: &FailureRecord) -> GcResult<PathBuf>;
}

impl<S: ResultStore + Sync> ResultStore for std::sync::Arc<S> {
    fn store_success(&self, index: usize, record: &TrialRecord) -> GcResult<PathBuf> {
        (**self).store_success(index, record)
    }

    fn store_failure(&self, index: usize, record: &FailureRecord) -> GcResult<PathBuf> {
        (**self).store_failure(index, record)
    }
}
