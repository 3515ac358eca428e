//! Data models module
//!
//! Run outcomes, scores, and persisted benchmark records.

pub mod result;

// Re-export commonly used types
pub use result::{BenchmarkRecord, Category, RunResult, RunStatus, Score, ScoreBoard, SystemInfo, INSTANT_SCORE};
