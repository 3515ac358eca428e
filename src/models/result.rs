//! Benchmark result data models
//!
//! Terminal run status, scores, and the records persisted to the history.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bench::clock::duration_ms;
use crate::config::BenchmarkKind;
use crate::Result;

/// Terminal status of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    /// Resource acquisition failed before any worker started
    AllocationError,
    /// A per-chunk operation failed
    TransformError,
    /// The run finished but its output failed verification
    CorrectnessMismatch,
    /// Worker infrastructure failed
    WorkerFatalError,
}

impl RunStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RunStatus::Ok)
    }

    /// Negative code reported by the numeric interface
    pub fn legacy_code(&self) -> Option<i64> {
        match self {
            RunStatus::Ok => None,
            RunStatus::AllocationError => Some(-1),
            RunStatus::TransformError => Some(-2),
            RunStatus::CorrectnessMismatch => Some(-10),
            RunStatus::WorkerFatalError => Some(-11),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::AllocationError => "allocation error",
            RunStatus::TransformError => "transform error",
            RunStatus::CorrectnessMismatch => "correctness mismatch",
            RunStatus::WorkerFatalError => "worker fatal error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Duration and status of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Elapsed time of the parallel phase (0 unless the run succeeded)
    pub duration_ms: u64,
    pub status: RunStatus,
}

impl RunResult {
    pub fn ok(duration: Duration) -> Self {
        Self {
            duration_ms: duration_ms(duration),
            status: RunStatus::Ok,
        }
    }

    pub fn failed(status: RunStatus) -> Self {
        Self {
            duration_ms: 0,
            status,
        }
    }

    /// Fold a run outcome into exactly one terminal status
    pub fn from_outcome(outcome: Result<Duration>) -> Self {
        match outcome {
            Ok(duration) => Self::ok(duration),
            Err(e) => {
                tracing::error!(error = %e, "Benchmark run failed");
                Self::failed(e.status())
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Elapsed milliseconds on success, a negative error code otherwise
    pub fn legacy_code(&self) -> i64 {
        self.status
            .legacy_code()
            .unwrap_or_else(|| i64::try_from(self.duration_ms).unwrap_or(i64::MAX))
    }
}

/// Benchmark category used for score totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cpu,
    Memory,
    Storage,
}

impl Category {
    pub fn description(&self) -> &'static str {
        match self {
            Category::Cpu => "CPU",
            Category::Memory => "Memory",
            Category::Storage => "Storage",
        }
    }
}

/// Score given to a successful run that took under a millisecond
pub const INSTANT_SCORE: u64 = i32::MAX as u64;

/// Inverse-time score; higher is faster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Score {
    pub value: u64,
}

impl Score {
    /// `scale / duration_ms`; zero for failed runs, capped for instant ones
    pub fn compute(result: &RunResult, scale: u64) -> Self {
        let value = if !result.is_ok() {
            0
        } else if result.duration_ms == 0 {
            INSTANT_SCORE
        } else {
            scale / result.duration_ms
        };
        Self { value }
    }
}

/// System information captured at benchmark time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system and architecture
    pub os: String,
    /// Logical CPUs
    pub logical_cpus: usize,
    /// Physical cores
    pub physical_cpus: usize,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::detect()
    }
}

impl SystemInfo {
    /// Detect the current system
    pub fn detect() -> Self {
        Self {
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            logical_cpus: num_cpus::get(),
            physical_cpus: num_cpus::get_physical(),
        }
    }
}

/// One persisted benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Timestamp when the benchmark was executed
    pub timestamp: DateTime<Utc>,
    pub kind: BenchmarkKind,
    pub result: RunResult,
    pub score: Score,
    /// Worker threads used
    pub workers: usize,
    pub system_info: SystemInfo,
}

impl BenchmarkRecord {
    /// Create a record with detected system info
    pub fn new(kind: BenchmarkKind, result: RunResult, workers: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            score: Score::compute(&result, kind.score_scale()),
            result,
            workers,
            system_info: SystemInfo::detect(),
        }
    }

    /// Get a human-readable summary of the record
    pub fn summary(&self) -> String {
        let outcome = if self.result.is_ok() {
            format!("{} ms", self.result.duration_ms)
        } else {
            self.result.status.to_string()
        };
        format!(
            "{} - {} - {} workers - {} - score {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.kind.description(),
            self.workers,
            outcome,
            self.score.value
        )
    }
}

/// Score totals per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub cpu: u64,
    pub memory: u64,
    pub storage: u64,
    /// Records whose run did not succeed
    #[serde(default)]
    pub failures: usize,
}

impl ScoreBoard {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a BenchmarkRecord>) -> Self {
        let mut board = Self::default();
        for record in records {
            board.record(record);
        }
        board
    }

    /// Add a record's score and count it if it failed
    pub fn record(&mut self, record: &BenchmarkRecord) {
        if !record.result.is_ok() {
            self.failures += 1;
        }
        self.add(record.kind.category(), record.score);
    }

    pub fn all_ok(&self) -> bool {
        self.failures == 0
    }

    pub fn add(&mut self, category: Category, score: Score) {
        let slot = match category {
            Category::Cpu => &mut self.cpu,
            Category::Memory => &mut self.memory,
            Category::Storage => &mut self.storage,
        };
        *slot = slot.saturating_add(score.value);
    }

    pub fn category(&self, category: Category) -> u64 {
        match category {
            Category::Cpu => self.cpu,
            Category::Memory => self.memory,
            Category::Storage => self.storage,
        }
    }

    pub fn total(&self) -> u64 {
        self.cpu
            .saturating_add(self.memory)
            .saturating_add(self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BenchError, TransformError};

    #[test]
    fn test_from_outcome_maps_every_error_class() {
        let cases = [
            (BenchError::Allocation("oom".into()), RunStatus::AllocationError, -1),
            (
                BenchError::Transform(TransformError::PrimitiveInit("key".into())),
                RunStatus::TransformError,
                -2,
            ),
            (BenchError::CorrectnessMismatch("x".into()), RunStatus::CorrectnessMismatch, -10),
            (BenchError::WorkerFatal("spawn".into()), RunStatus::WorkerFatalError, -11),
        ];
        for (err, status, code) in cases {
            let result = RunResult::from_outcome(Err(err));
            assert_eq!(result.status, status);
            assert_eq!(result.duration_ms, 0);
            assert_eq!(result.legacy_code(), code);
        }
    }

    #[test]
    fn test_ok_result_reports_milliseconds() {
        let result = RunResult::from_outcome(Ok(Duration::from_micros(12_345_678)));
        assert!(result.is_ok());
        assert_eq!(result.duration_ms, 12_345);
        assert_eq!(result.legacy_code(), 12_345);
    }

    #[test]
    fn test_score_compute() {
        assert_eq!(Score::compute(&RunResult::ok(Duration::from_millis(2000)), 100_000_000).value, 50_000);
        assert_eq!(Score::compute(&RunResult::ok(Duration::ZERO), 100_000_000).value, 2_147_483_647);
        assert_eq!(Score::compute(&RunResult::ok(Duration::from_micros(900)), 10_000_000).value, INSTANT_SCORE);
        assert_eq!(Score::compute(&RunResult::failed(RunStatus::TransformError), 100_000_000).value, 0);
    }

    #[test]
    fn test_score_board_totals() {
        let ok = |ms| RunResult::ok(Duration::from_millis(ms));
        let records = vec![
            BenchmarkRecord::new(BenchmarkKind::CryptoMulti, ok(1000), 8),
            BenchmarkRecord::new(BenchmarkKind::MathSingle, ok(2000), 1),
            BenchmarkRecord::new(BenchmarkKind::RamRead, ok(100), 1),
            BenchmarkRecord::new(BenchmarkKind::DiskSeqWrite, RunResult::failed(RunStatus::AllocationError), 4),
        ];
        let board = ScoreBoard::from_records(&records);
        assert_eq!(board.cpu, 100_000 + 50_000);
        assert_eq!(board.memory, 100_000);
        assert_eq!(board.storage, 0);
        assert_eq!(board.total(), 250_000);
        assert_eq!(board.category(Category::Cpu), 150_000);
        assert_eq!(board.failures, 1);
        assert!(!board.all_ok());
        assert!(ScoreBoard::from_records(&records[..3]).all_ok());
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = BenchmarkRecord::new(BenchmarkKind::DiskRandomRead, RunResult::ok(Duration::from_millis(42)), 4);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"disk-random-read\""));
        assert!(json.contains("\"ok\""));
        let back: BenchmarkRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(record.summary().contains("42 ms"));
    }
}
