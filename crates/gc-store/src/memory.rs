use std::collections::BTreeMap;
use std::path::PathBuf;

use gc_types::{FailureRecord, GcResult, StoreError, TrialRecord};
use parking_lot::Mutex;

use crate::ResultStore;

/// In-process store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    successes: Mutex<BTreeMap<usize, TrialRecord>>,
    failures: Mutex<BTreeMap<usize, FailureRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> Vec<(usize, TrialRecord)> {
        self.successes
            .lock()
            .iter()
            .map(|(i, r)| (*i, r.clone()))
            .collect()
    }

    pub fn failures(&self) -> Vec<(usize, FailureRecord)> {
        self.failures
            .lock()
            .iter()
            .map(|(i, r)| (*i, r.clone()))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }
}

fn memory_path(kind: &str, index: usize) -> PathBuf {
    PathBuf::from(format!("memory://{kind}/{index}"))
}

impl ResultStore for MemoryStore {
    fn store_success(&self, index: usize, record: &TrialRecord) -> GcResult<PathBuf> {
        let path = memory_path("in", index);
        let mut successes = self.successes.lock();
        if successes.contains_key(&index) {
            return Err(StoreError::AlreadyExists { path }.into());
        }
        successes.insert(index, record.clone());
        Ok(path)
    }

    fn store_failure(&self, index: usize, record: &FailureRecord) -> GcResult<PathBuf> {
        let path = memory_path("failures", index);
        let mut failures = self.failures.lock();
        if failures.contains_key(&index) {
            return Err(StoreError::AlreadyExists { path }.into());
        }
        failures.insert(index, record.clone());
        Ok(path)
    }
}
