//! corebench - multi-core hardware benchmark engine
//!
//! Runs a fixed amount of synthetic work (AES-CTR, floating-point math,
//! memory traffic, disk I/O) across worker threads and reports the
//! wall-clock duration of the parallel phase, with verified results.

use thiserror::Error;

pub mod bench;
pub mod config;
pub mod io;
pub mod models;
pub mod util;
pub mod workloads;

pub use bench::partition::{Chunk, ClaimMode, WorkSpec};
pub use bench::runner::{run_benchmark, BenchmarkRunner, Transform};
pub use models::{RunResult, RunStatus};

/// Failure raised by a single chunk transform
#[derive(Debug, Error)]
pub enum TransformError {
    /// The underlying primitive could not be initialized
    #[error("primitive initialization failed: {0}")]
    PrimitiveInit(String),
    /// A buffer region was requested twice or lies outside the buffer
    #[error("invalid chunk region {start}..{end}: {reason}")]
    Region {
        start: u64,
        end: u64,
        reason: &'static str,
    },
    /// Positional I/O failed
    #[error("I/O failed at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    /// Any other per-chunk failure
    #[error("{0}")]
    Other(String),
}

/// Common error type for corebench operations
#[derive(Debug, Error)]
pub enum BenchError {
    /// Resource acquisition failed before any worker started
    #[error("Allocation error: {0}")]
    Allocation(String),
    /// A worker's per-chunk operation failed
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    /// The run completed but its output failed verification
    #[error("Correctness mismatch: {0}")]
    CorrectnessMismatch(String),
    /// Worker infrastructure failed (spawn failure, panicked worker)
    #[error("Worker fatal error: {0}")]
    WorkerFatal(String),
    /// Configuration validation or parsing error
    #[error("Configuration error: {0}")]
    Config(String),
    /// I/O operation failed outside a worker
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Results persistence error
    #[error("Results persistence error: {0}")]
    Persistence(String),
    /// The run was stopped by its cancellation flag before finishing
    #[error("Run cancelled before all chunks completed")]
    Cancelled,
}

impl BenchError {
    /// Map this error onto the terminal status of a run
    pub fn status(&self) -> RunStatus {
        match self {
            BenchError::Allocation(_)
            | BenchError::Config(_)
            | BenchError::Io(_)
            | BenchError::Persistence(_) => RunStatus::AllocationError,
            BenchError::Transform(_) | BenchError::Cancelled => RunStatus::TransformError,
            BenchError::CorrectnessMismatch(_) => RunStatus::CorrectnessMismatch,
            BenchError::WorkerFatal(_) => RunStatus::WorkerFatalError,
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Persistence(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::Config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for BenchError {
    fn from(err: toml::ser::Error) -> Self {
        BenchError::Config(format!("TOML serialization error: {}", err))
    }
}

impl From<std::collections::TryReserveError> for BenchError {
    fn from(err: std::collections::TryReserveError) -> Self {
        BenchError::Allocation(err.to_string())
    }
}

/// Result type alias for corebench operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// User-facing error helpers
pub mod error {
    use super::BenchError;

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &BenchError) -> String {
        match error {
            BenchError::Allocation(_) => {
                "Not enough memory for the benchmark buffers. Try a smaller --size.".to_string()
            }
            BenchError::CorrectnessMismatch(_) => {
                "Benchmark output failed verification. The result is not trustworthy.".to_string()
            }
            BenchError::WorkerFatal(_) => {
                "A worker thread could not be started or crashed.".to_string()
            }
            BenchError::Config(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            BenchError::Persistence(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            BenchError::Cancelled => "Benchmark was cancelled.".to_string(),
            _ => error.to_string(),
        }
    }
}

pub const APP_NAME: &str = "corebench";
pub const CONFIG_FILE: &str = "corebench.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const TEMP_FILE_PREFIX: &str = "COREBENCH_TMP_";
pub const MAX_RESULTS_HISTORY: usize = 100;
