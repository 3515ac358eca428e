//! Results persistence module
//!
//! Handles saving, loading, and rotation of benchmark records.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::result::BenchmarkRecord;
use crate::{BenchError, Result, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    records: Vec<BenchmarkRecord>,
}

impl ResultsStorage {
    /// Create a new results storage manager at the standard location
    pub fn new() -> Result<Self> {
        Ok(Self::at(Self::results_file_path()?))
    }

    /// Create a storage manager backed by `results_path`
    pub fn at(results_path: PathBuf) -> Self {
        Self { results_path }
    }

    /// Get the standard results file path
    /// Uses $DATA_HOME/corebench/results.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            BenchError::Persistence("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all records from the results file
    pub fn load_records(&self) -> Result<Vec<BenchmarkRecord>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            BenchError::Persistence(format!(
                "Failed to read results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            BenchError::Persistence(format!(
                "Failed to parse results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.records)
    }

    /// Append a new record to the results file
    /// Automatically rotates old records beyond MAX_RESULTS_HISTORY entries
    pub fn append_record(&self, record: BenchmarkRecord) -> Result<()> {
        let mut records = self.load_records()?;
        records.push(record);

        if records.len() > MAX_RESULTS_HISTORY {
            let skip_count = records.len() - MAX_RESULTS_HISTORY;
            records.drain(..skip_count);
        }

        self.save_records(records)
    }

    fn save_records(&self, records: Vec<BenchmarkRecord>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BenchError::Persistence(format!(
                    "Failed to create results directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let count = records.len();
        let content = serde_json::to_string_pretty(&ResultsFile {
            version: 1,
            records,
        })?;

        fs::write(&self.results_path, content).map_err(|e| {
            BenchError::Persistence(format!(
                "Failed to write results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        debug!(path = %self.results_path.display(), count, "Saved results");
        Ok(())
    }

    /// Get the number of stored records
    pub fn count_records(&self) -> Result<usize> {
        Ok(self.load_records()?.len())
    }

    /// Clear all stored records
    pub fn clear_records(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path).map_err(|e| {
                BenchError::Persistence(format!(
                    "Failed to remove results file {}: {}",
                    self.results_path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Get the most recent N records, most recent first
    pub fn recent_records(&self, count: usize) -> Result<Vec<BenchmarkRecord>> {
        let mut records = self.load_records()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(count);
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.results_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchmarkKind;
    use crate::models::result::{RunResult, RunStatus};
    use tempfile::TempDir;

    fn create_test_record(duration_ms: u64) -> BenchmarkRecord {
        BenchmarkRecord::new(
            BenchmarkKind::CryptoMulti,
            RunResult {
                duration_ms,
                status: RunStatus::Ok,
            },
            4,
        )
    }

    fn storage(temp_dir: &TempDir) -> ResultsStorage {
        ResultsStorage::at(temp_dir.path().join(RESULTS_FILE))
    }

    #[test]
    fn test_load_empty_results() {
        let temp_dir = TempDir::new().unwrap();
        assert!(storage(&temp_dir).load_records().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_record() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        storage.append_record(create_test_record(1234)).unwrap();

        let records = storage.load_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.duration_ms, 1234);
        assert_eq!(records[0].kind, BenchmarkKind::CryptoMulti);
        assert_eq!(records[0].score.value, 100_000_000 / 1234);
    }

    #[test]
    fn test_results_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);

        for i in 0..MAX_RESULTS_HISTORY + 10 {
            storage.append_record(create_test_record(i as u64 + 1)).unwrap();
        }

        let records = storage.load_records().unwrap();
        assert_eq!(records.len(), MAX_RESULTS_HISTORY);
        // The oldest ten were dropped
        assert_eq!(records[0].result.duration_ms, 11);
        assert_eq!(
            records[records.len() - 1].result.duration_ms,
            (MAX_RESULTS_HISTORY + 10) as u64
        );
    }

    #[test]
    fn test_count_and_clear_records() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        assert_eq!(storage.count_records().unwrap(), 0);

        for _ in 0..3 {
            storage.append_record(create_test_record(10)).unwrap();
        }
        assert_eq!(storage.count_records().unwrap(), 3);

        storage.clear_records().unwrap();
        assert_eq!(storage.count_records().unwrap(), 0);
    }

    #[test]
    fn test_recent_records() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        for i in 0..10 {
            storage.append_record(create_test_record(i + 1)).unwrap();
        }

        let recent = storage.recent_records(5).unwrap();
        assert_eq!(recent.len(), 5);
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(storage.recent_records(20).unwrap().len(), 10);
        assert!(storage.recent_records(0).unwrap().is_empty());
    }

    #[test]
    fn test_results_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        storage.append_record(create_test_record(5)).unwrap();

        let content = fs::read_to_string(storage.path()).unwrap();
        let results_file: ResultsFile = serde_json::from_str(&content).unwrap();
        assert_eq!(results_file.version, 1);
        assert_eq!(results_file.records.len(), 1);
        assert!(content.contains("\"crypto-multi\""));
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        fs::write(storage.path(), "not json").unwrap();
        assert!(matches!(
            storage.load_records(),
            Err(BenchError::Persistence(_))
        ));
    }
}
