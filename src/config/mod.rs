//! Configuration management module
//!
//! Handles loading, saving, and validation of benchmark configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bench::partition::{ClaimMode, DEFAULT_NUM_TASKS};
use crate::bench::placement::{CorePlacement, NoPlacement, PinnedCores};
use crate::bench::progress::{ProgressOptions, ProgressOrdering};
use crate::bench::worker::PoolOptions;
use crate::models::{BenchmarkRecord, Category};
use crate::{BenchError, Result, APP_NAME, CONFIG_FILE};

pub mod persistence;

const MIB: u64 = 1024 * 1024;
const MAX_WORKERS: usize = 1024;

/// Benchmark configuration structure containing all test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Worker threads for multi-core runs (None: all hardware threads)
    pub workers: Option<usize>,
    /// Cores to pin workers to, round-robin (empty: no pinning)
    pub cores: Vec<usize>,
    /// Ask the OS for a higher scheduling priority in each worker
    pub elevate_priority: bool,
    /// Number of tasks the work is split into
    pub num_tasks: usize,
    /// Chunk assignment override (None: per-benchmark default)
    pub claim_mode: Option<ClaimMode>,
    /// Memory ordering of the progress counter
    pub progress_ordering: ProgressOrdering,
    /// Emit progress after this many chunks even without a percent change
    pub progress_chunk_interval: Option<u64>,
    pub crypto: CryptoConfig,
    pub math: MathConfig,
    pub memory: MemoryConfig,
    pub disk: DiskConfig,
}

/// AES-256-CTR workload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Plaintext size in bytes
    pub size_bytes: u64,
    /// Encrypt/decrypt passes over the buffer
    pub passes: u32,
    pub key_byte: u8,
    pub iv_byte: u8,
}

/// Floating-point workload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MathConfig {
    pub iterations: u64,
}

/// RAM workload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub size_bytes: u64,
}

/// Storage workload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Directory the test file is created in
    pub dir: PathBuf,
    /// Test file size in bytes
    pub file_size: u64,
    /// Block size for sequential I/O
    pub seq_block_size: u64,
    /// Block size for random I/O
    pub random_block_size: u64,
    /// Random operations per run (None: one per random block in the file)
    pub random_ops: Option<u64>,
    /// Whether to keep the test file after the run
    pub keep_file: bool,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            size_bytes: 256 * MIB,
            passes: 200,
            key_byte: 0x11,
            iv_byte: 0x22,
        }
    }
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            iterations: 70_000_000,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size_bytes: 768 * MIB,
        }
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            file_size: 500 * MIB,
            seq_block_size: 4 * MIB,
            random_block_size: 4 * 1024,
            random_ops: None,
            keep_file: false,
        }
    }
}

impl DiskConfig {
    /// Random operations per run
    pub fn random_ops(&self) -> u64 {
        self.random_ops
            .unwrap_or(self.file_size / self.random_block_size.max(1))
    }

    fn validate(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(BenchError::Config(format!(
                "Disk directory does not exist: {}",
                self.dir.display()
            )));
        }
        for (name, block) in [
            ("Sequential block size", self.seq_block_size),
            ("Random block size", self.random_block_size),
        ] {
            if !block.is_power_of_two() || block % 256 != 0 {
                return Err(BenchError::Config(format!(
                    "{} must be a power of 2 and a multiple of 256 bytes",
                    name
                )));
            }
            if self.file_size < block || self.file_size % block != 0 {
                return Err(BenchError::Config(format!(
                    "File size must be a non-zero multiple of the {} ({} bytes)",
                    name.to_lowercase(),
                    block
                )));
            }
        }
        if self.random_ops() == 0 {
            return Err(BenchError::Config(
                "Random operation count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            workers: None,
            cores: Vec::new(),
            elevate_priority: true,
            num_tasks: DEFAULT_NUM_TASKS,
            claim_mode: None,
            progress_ordering: ProgressOrdering::default(),
            progress_chunk_interval: None,
            crypto: CryptoConfig::default(),
            math: MathConfig::default(),
            memory: MemoryConfig::default(),
            disk: DiskConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.validate_common()?;
        self.disk.validate()
    }

    fn validate_common(&self) -> Result<()> {
        match self.workers {
            Some(0) => {
                return Err(BenchError::Config(
                    "Worker count must be greater than 0".to_string(),
                ))
            }
            Some(n) if n > MAX_WORKERS => {
                return Err(BenchError::Config(format!(
                    "Too many workers: {} (max: {})",
                    n, MAX_WORKERS
                )))
            }
            _ => {}
        }

        if self.num_tasks == 0 {
            return Err(BenchError::Config(
                "Task count must be greater than 0".to_string(),
            ));
        }

        if self.crypto.size_bytes == 0 || self.memory.size_bytes == 0 {
            return Err(BenchError::Config(
                "Buffer sizes must be greater than 0".to_string(),
            ));
        }
        if self.crypto.passes == 0 {
            return Err(BenchError::Config(
                "Crypto passes must be greater than 0".to_string(),
            ));
        }
        if self.math.iterations == 0 {
            return Err(BenchError::Config(
                "Math iterations must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate only the settings `kind` depends on; disk settings are
    /// checked for disk kinds alone
    pub fn validate_for(&self, kind: BenchmarkKind) -> Result<()> {
        self.validate_common()?;
        if kind.uses_disk() {
            self.disk.validate()?;
        }
        Ok(())
    }

    /// Set the number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the cores workers are pinned to
    pub fn with_cores(mut self, cores: Vec<usize>) -> Self {
        self.cores = cores;
        self
    }

    pub fn with_elevate_priority(mut self, elevate: bool) -> Self {
        self.elevate_priority = elevate;
        self
    }

    pub fn with_num_tasks(mut self, num_tasks: usize) -> Self {
        self.num_tasks = num_tasks;
        self
    }

    pub fn with_claim_mode(mut self, mode: ClaimMode) -> Self {
        self.claim_mode = Some(mode);
        self
    }

    pub fn with_progress_ordering(mut self, ordering: ProgressOrdering) -> Self {
        self.progress_ordering = ordering;
        self
    }

    pub fn with_crypto_size(mut self, size_bytes: u64) -> Self {
        self.crypto.size_bytes = size_bytes;
        self
    }

    pub fn with_crypto_passes(mut self, passes: u32) -> Self {
        self.crypto.passes = passes;
        self
    }

    pub fn with_math_iterations(mut self, iterations: u64) -> Self {
        self.math.iterations = iterations;
        self
    }

    pub fn with_memory_size(mut self, size_bytes: u64) -> Self {
        self.memory.size_bytes = size_bytes;
        self
    }

    /// Set the directory for disk test files
    pub fn with_disk_dir(mut self, dir: PathBuf) -> Self {
        self.disk.dir = dir;
        self
    }

    pub fn with_disk_file_size(mut self, size: u64) -> Self {
        self.disk.file_size = size;
        self
    }

    /// Worker threads for multi-core runs
    ///
    /// Defaults to one worker per listed core, or every hardware thread
    /// when no cores are listed.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                if self.cores.is_empty() {
                    num_cpus::get()
                } else {
                    self.cores.len()
                }
            })
            .max(1)
    }

    /// Bytes `kind` moves through its timed phase, for throughput display
    pub fn bytes_for(&self, kind: BenchmarkKind) -> Option<u64> {
        match kind {
            BenchmarkKind::CryptoSingle | BenchmarkKind::CryptoMulti => Some(
                self.crypto
                    .size_bytes
                    .saturating_mul(u64::from(self.crypto.passes))
                    .saturating_mul(2),
            ),
            BenchmarkKind::MathSingle | BenchmarkKind::MathMulti => None,
            BenchmarkKind::RamWrite | BenchmarkKind::RamRead => Some(self.memory.size_bytes),
            BenchmarkKind::DiskSeqWrite | BenchmarkKind::DiskSeqRead => Some(self.disk.file_size),
            BenchmarkKind::DiskRandomWrite | BenchmarkKind::DiskRandomRead => Some(
                self.disk
                    .random_ops()
                    .saturating_mul(self.disk.random_block_size),
            ),
        }
    }

    /// Worker threads used by `kind`
    pub fn workers_for(&self, kind: BenchmarkKind) -> usize {
        if kind.is_single_core() {
            1
        } else {
            self.worker_count()
        }
    }

    /// Pool settings for `kind`
    pub fn pool_options(&self, kind: BenchmarkKind) -> PoolOptions {
        PoolOptions::default()
            .with_claim_mode(self.claim_mode.unwrap_or(kind.default_claim_mode()))
            .with_num_tasks(self.num_tasks)
            .with_elevate_priority(self.elevate_priority)
            .with_progress(ProgressOptions {
                ordering: self.progress_ordering,
                chunk_interval: self.progress_chunk_interval,
            })
    }

    /// Core placement for `kind`; single-core runs use the first listed core
    pub fn placement(&self, kind: BenchmarkKind) -> Box<dyn CorePlacement> {
        match (self.cores.first(), kind.is_single_core()) {
            (None, _) => Box::new(NoPlacement),
            (Some(&core), true) => Box::new(PinnedCores::new(vec![core])),
            (Some(_), false) => Box::new(PinnedCores::new(self.cores.clone())),
        }
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load configuration from `path`, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            BenchError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Disk settings are checked when a disk benchmark runs
        config.validate_common()?;
        Ok(config)
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Validate and save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BenchError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            BenchError::Config(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/corebench/corebench.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            BenchError::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

/// Catalogue of benchmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchmarkKind {
    CryptoSingle,
    CryptoMulti,
    MathSingle,
    MathMulti,
    RamWrite,
    RamRead,
    DiskSeqWrite,
    DiskSeqRead,
    DiskRandomWrite,
    DiskRandomRead,
}

impl BenchmarkKind {
    /// Every benchmark, in suite order
    pub const ALL: [BenchmarkKind; 10] = [
        BenchmarkKind::CryptoSingle,
        BenchmarkKind::CryptoMulti,
        BenchmarkKind::MathSingle,
        BenchmarkKind::MathMulti,
        BenchmarkKind::RamWrite,
        BenchmarkKind::RamRead,
        BenchmarkKind::DiskSeqWrite,
        BenchmarkKind::DiskSeqRead,
        BenchmarkKind::DiskRandomWrite,
        BenchmarkKind::DiskRandomRead,
    ];

    /// Command-line name
    pub fn name(&self) -> &'static str {
        match self {
            BenchmarkKind::CryptoSingle => "crypto-single",
            BenchmarkKind::CryptoMulti => "crypto-multi",
            BenchmarkKind::MathSingle => "math-single",
            BenchmarkKind::MathMulti => "math-multi",
            BenchmarkKind::RamWrite => "ram-write",
            BenchmarkKind::RamRead => "ram-read",
            BenchmarkKind::DiskSeqWrite => "disk-seq-write",
            BenchmarkKind::DiskSeqRead => "disk-seq-read",
            BenchmarkKind::DiskRandomWrite => "disk-random-write",
            BenchmarkKind::DiskRandomRead => "disk-random-read",
        }
    }

    /// Get a human-readable description of the benchmark
    pub fn description(&self) -> &'static str {
        match self {
            BenchmarkKind::CryptoSingle => "AES-256-CTR (single core)",
            BenchmarkKind::CryptoMulti => "AES-256-CTR (multi core)",
            BenchmarkKind::MathSingle => "Floating-point math (single core)",
            BenchmarkKind::MathMulti => "Floating-point math (multi core)",
            BenchmarkKind::RamWrite => "RAM sequential write",
            BenchmarkKind::RamRead => "RAM sequential read",
            BenchmarkKind::DiskSeqWrite => "Disk sequential write",
            BenchmarkKind::DiskSeqRead => "Disk sequential read",
            BenchmarkKind::DiskRandomWrite => "Disk random write",
            BenchmarkKind::DiskRandomRead => "Disk random read",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            BenchmarkKind::CryptoSingle
            | BenchmarkKind::CryptoMulti
            | BenchmarkKind::MathSingle
            | BenchmarkKind::MathMulti => Category::Cpu,
            BenchmarkKind::RamWrite | BenchmarkKind::RamRead => Category::Memory,
            _ => Category::Storage,
        }
    }

    /// Check if this benchmark always runs on one worker
    pub fn is_single_core(&self) -> bool {
        matches!(
            self,
            BenchmarkKind::CryptoSingle
                | BenchmarkKind::MathSingle
                | BenchmarkKind::RamWrite
                | BenchmarkKind::RamRead
        )
    }

    /// Check if this benchmark needs a disk test file
    pub fn uses_disk(&self) -> bool {
        self.category() == Category::Storage
    }

    /// Claim mode used unless the config overrides it
    ///
    /// Uniform compute splits statically; I/O with uneven per-chunk cost
    /// claims dynamically.
    pub fn default_claim_mode(&self) -> ClaimMode {
        if self.uses_disk() {
            ClaimMode::Dynamic
        } else {
            ClaimMode::Static
        }
    }

    /// Numerator of the score formula
    pub fn score_scale(&self) -> u64 {
        match self.category() {
            Category::Cpu => 100_000_000,
            Category::Memory | Category::Storage => 10_000_000,
        }
    }
}

impl fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BenchmarkKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        BenchmarkKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = BenchmarkKind::ALL.iter().map(|k| k.name()).collect();
                BenchError::Config(format!(
                    "Unknown benchmark '{}' (expected one of: {})",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Configuration manager for handling config and results persistence
pub struct ConfigManager {
    config_path: PathBuf,
    results: persistence::ResultsStorage,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: BenchmarkConfig::config_file_path()?,
            results: persistence::ResultsStorage::new()?,
        })
    }

    /// Create a manager rooted at explicit paths
    pub fn with_paths(config_path: PathBuf, results_path: PathBuf) -> Self {
        Self {
            config_path,
            results: persistence::ResultsStorage::at(results_path),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file or return default
    pub fn load_config(&self) -> Result<BenchmarkConfig> {
        BenchmarkConfig::load_from(&self.config_path)
    }

    /// Save configuration to file
    pub fn save_config(&self, config: &BenchmarkConfig) -> Result<()> {
        config.save_to(&self.config_path)
    }

    /// Save a benchmark record
    pub fn save_record(&self, record: BenchmarkRecord) -> Result<()> {
        self.results.append_record(record)
    }

    /// Load all saved records
    pub fn load_records(&self) -> Result<Vec<BenchmarkRecord>> {
        self.results.load_records()
    }

    /// Get the most recent records (up to limit), most recent first
    pub fn recent_records(&self, limit: usize) -> Result<Vec<BenchmarkRecord>> {
        self.results.recent_records(limit)
    }

    /// Number of saved records
    pub fn record_count(&self) -> Result<usize> {
        self.results.count_records()
    }

    /// Delete every saved record
    pub fn clear_history(&self) -> Result<()> {
        self.results.clear_records()
    }
}
