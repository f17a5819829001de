use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use gc_types::{FailureRecord, GcResult, StoreError, TrialRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::ResultStore;

const SUCCESS_DIR: &str = "in";
const SUCCESS_PREFIX: &str = "in_";
const FAILURE_DIR: &str = "failures";
const FAILURE_PREFIX: &str = "failure_";

/// Pretty-printed JSON files under an output folder.
///
/// ```text
/// <root>/in/in_0.json, in_1.json, ...
/// <root>/failures/failure_0.json, ...
/// ```
///
/// Each record is written to a temporary sibling first and then linked into
/// place, so a final name either holds a complete record or does not exist.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn success_path(&self, index: usize) -> PathBuf {
        self.root
            .join(SUCCESS_DIR)
            .join(format!("{SUCCESS_PREFIX}{index}.json"))
    }

    pub fn failure_path(&self, index: usize) -> PathBuf {
        self.root
            .join(FAILURE_DIR)
            .join(format!("{FAILURE_PREFIX}{index}.json"))
    }

    pub fn load_success(&self, index: usize) -> GcResult<TrialRecord> {
        read_json(&self.success_path(index))
    }

    pub fn load_failure(&self, index: usize) -> GcResult<FailureRecord> {
        read_json(&self.failure_path(index))
    }

    /// Indices of all stored trials, ascending.
    pub fn list_successes(&self) -> GcResult<Vec<usize>> {
        list_indices(&self.root.join(SUCCESS_DIR), SUCCESS_PREFIX)
    }

    /// Indices of all stored failures, ascending.
    pub fn list_failures(&self) -> GcResult<Vec<usize>> {
        list_indices(&self.root.join(FAILURE_DIR), FAILURE_PREFIX)
    }
}

impl ResultStore for JsonFileStore {
    fn store_success(&self, index: usize, record: &TrialRecord) -> GcResult<PathBuf> {
        let path = self.success_path(index);
        write_json_once(&path, record)?;
        Ok(path)
    }

    fn store_failure(&self, index: usize, record: &FailureRecord) -> GcResult<PathBuf> {
        let path = self.failure_path(index);
        write_json_once(&path, record)?;
        Ok(path)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json_once<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if path.exists() {
        return Err(StoreError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
        file.write_all(&bytes).map_err(io_error(&tmp))?;
        file.sync_all().map_err(io_error(&tmp))?;
    }

    // Linking refuses to replace an existing file, unlike rename.
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => {
            debug!(path = %path.display(), bytes = bytes.len(), "record written");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(io_error(path)(e)),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> GcResult<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            }
            .into())
        }
        Err(e) => return Err(io_error(path)(e).into()),
    };
    Ok(serde_json::from_slice(&bytes).map_err(StoreError::from)?)
}

fn list_indices(dir: &Path, prefix: &str) -> GcResult<Vec<usize>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir)(e).into()),
    };

    let mut indices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_error(dir))?;
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix(prefix))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        indices.push(index);
    }
    indices.sort_unstable();
    Ok(indices)
}
