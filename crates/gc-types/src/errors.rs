use std::path::PathBuf;

use thiserror::Error;

/// Main error type for basis generation
#[derive(Error, Debug)]
pub enum GcError {
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl GcError {
    /// True when the error came from an external interrupt rather than a
    /// real failure.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, GcError::Scheduler(SchedulerError::Interrupted))
    }
}

/// Errors raised by a bin-rectangle solver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Solver timeout: computation took longer than {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    #[error("Solver cancelled")]
    Cancelled,

    #[error("Invalid solver input: {message}")]
    InvalidInput { message: String },

    #[error("Solver failed: {message}")]
    Failed { message: String },
}

impl SolverError {
    /// Only timeouts are recoverable; the caller resamples and retries.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SolverError::Timeout { .. })
    }
}

/// Result store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Record not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scheduler lifecycle errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Interrupted before the trial quota was reached")]
    Interrupted,

    #[error("Worker pool could not be built: {message}")]
    PoolBuild { message: String },

    #[error("All workers disconnected with {in_flight} batches outstanding")]
    WorkerLost { in_flight: usize },

    #[error("Scheduler already joined")]
    AlreadyJoined,
}

/// Result type alias for basis generation operations
pub type GcResult<T> = Result<T, GcError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::GcError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::GcError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GcError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SolverError::Timeout { timeout_seconds: 600 };
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("600"));

        let error = StoreError::AlreadyExists {
            path: PathBuf::from("out/in/in_3.json"),
        };
        assert!(error.to_string().contains("in_3.json"));
    }

    #[test]
    fn test_error_conversion() {
        let solver_error = SolverError::Failed {
            message: "singular lattice".to_string(),
        };
        let gc_error: GcError = solver_error.into();

        match gc_error {
            GcError::Solver(SolverError::Failed { .. }) => (),
            _ => panic!("Expected Solver error"),
        }
    }

    #[test]
    fn test_timeout_is_only_recoverable_solver_error() {
        assert!(SolverError::Timeout { timeout_seconds: 1 }.is_timeout());
        assert!(!SolverError::Cancelled.is_timeout());
        assert!(!SolverError::Failed { message: String::new() }.is_timeout());
    }

    #[test]
    fn test_interrupt_detection() {
        let err: GcError = SchedulerError::Interrupted.into();
        assert!(err.is_interrupt());
        assert!(!config_error!("bad").is_interrupt());
    }

    #[test]
    fn test_macros() {
        let _validation_err = validation_error!("Invalid value: {}", 42);
        let _internal_err = internal_error!("Something went wrong");
        let _config_err = config_error!("Missing required field: {}", "ms");
    }
}
