//! Storage workloads
//!
//! Sequential and random block I/O against one caller-provided file using
//! positional reads and writes. Blocks are multiples of 256 bytes at
//! block-aligned offsets, so every block holds the same pattern and read
//! checksums have a closed form.

use std::fs::File;
use std::sync::OnceLock;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::bench::clock::{duration_ms, Stopwatch};
use crate::bench::partition::{Claim, PartitionPlan, WorkSpec};
use crate::bench::progress::ProgressSink;
use crate::bench::runner::{BenchmarkRunner, Transform};
use crate::config::DiskConfig;
use crate::io::buffer::{alloc_pattern, find_pattern_mismatch, pattern_sum};
use crate::io::disk::{read_exact_at, write_all_at};
use crate::{BenchError, Result, TransformError};

/// Seed for the random offset table
pub const DEFAULT_SEED: u64 = 0x5EED_C0DE;

/// Random-write offsets checked after the run
const VERIFY_SAMPLE: usize = 1024;

fn scratch(len: usize) -> std::result::Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| TransformError::Other(format!("scratch buffer: {}", e)))?;
    buf.resize(len, 0);
    Ok(buf)
}

fn io_error(offset: u64) -> impl FnOnce(std::io::Error) -> TransformError {
    move |source| TransformError::Io { offset, source }
}

/// Block-aligned offsets drawn from a seeded generator
pub fn random_offsets(file_size: u64, block_size: u64, ops: u64, seed: u64) -> Vec<u64> {
    let blocks = (file_size / block_size).max(1);
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..ops).map(|_| rng.gen_range(0..blocks) * block_size).collect()
}

/// Writes pattern blocks to block-aligned offsets
///
/// With an offset table each unit is one operation at `offsets[unit]`;
/// without one, units are bytes written in place.
pub struct BlockWrite<'a> {
    file: &'a File,
    block: Vec<u8>,
    offsets: Option<&'a [u64]>,
}

impl<'a> BlockWrite<'a> {
    pub fn sequential(file: &'a File, block_size: u64) -> Result<Self> {
        Ok(Self {
            file,
            block: alloc_pattern(block_size as usize)?,
            offsets: None,
        })
    }

    pub fn random(file: &'a File, block_size: u64, offsets: &'a [u64]) -> Result<Self> {
        Ok(Self {
            file,
            block: alloc_pattern(block_size as usize)?,
            offsets: Some(offsets),
        })
    }

    fn verify_offsets(&self, offsets: &[u64]) -> Result<()> {
        let mut buf = alloc_pattern(self.block.len())?;
        for &offset in offsets {
            read_exact_at(self.file, &mut buf, offset)?;
            if let Some(at) = find_pattern_mismatch(&buf, 0) {
                return Err(BenchError::CorrectnessMismatch(format!(
                    "block at offset {} differs at byte {}",
                    offset, at
                )));
            }
        }
        Ok(())
    }
}

impl Transform for BlockWrite<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let chunk = claim.chunk();
        let block = self.block.len() as u64;
        match self.offsets {
            Some(offsets) => {
                for unit in chunk.start..chunk.end {
                    let offset = offsets[unit as usize];
                    write_all_at(self.file, &self.block, offset).map_err(io_error(offset))?;
                }
            }
            None => {
                let mut offset = chunk.start;
                while offset < chunk.end {
                    let len = block.min(chunk.end - offset) as usize;
                    write_all_at(self.file, &self.block[..len], offset).map_err(io_error(offset))?;
                    offset += len as u64;
                }
            }
        }
        Ok(())
    }

    fn verify(self) -> Result<()> {
        match self.offsets {
            Some(offsets) => {
                let step = (offsets.len() / VERIFY_SAMPLE).max(1);
                let sample: Vec<u64> = offsets.iter().step_by(step).copied().collect();
                self.verify_offsets(&sample)
            }
            None => {
                let len = self.file.metadata()?.len();
                let block = self.block.len() as u64;
                let sample: Vec<u64> = (0..len / block).map(|b| b * block).collect();
                self.verify_offsets(&sample)
            }
        }
    }
}

/// Reads blocks and checksums them per task
pub struct BlockRead<'a> {
    file: &'a File,
    block_size: u64,
    offsets: Option<&'a [u64]>,
    sums: Vec<OnceLock<u64>>,
    expected: u64,
}

impl<'a> BlockRead<'a> {
    pub fn sequential(file: &'a File, block_size: u64, plan: &PartitionPlan) -> Self {
        Self {
            file,
            block_size,
            offsets: None,
            sums: Self::slots(plan),
            expected: pattern_sum(0, plan.total_units()),
        }
    }

    pub fn random(file: &'a File, block_size: u64, offsets: &'a [u64], plan: &PartitionPlan) -> Self {
        Self {
            file,
            block_size,
            offsets: Some(offsets),
            sums: Self::slots(plan),
            expected: offsets.len() as u64 * pattern_sum(0, block_size),
        }
    }

    fn slots(plan: &PartitionPlan) -> Vec<OnceLock<u64>> {
        (0..plan.num_tasks()).map(|_| OnceLock::new()).collect()
    }
}

impl Transform for BlockRead<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let chunk = claim.chunk();
        let mut buf = scratch(self.block_size as usize)?;
        let mut sum = 0u64;
        let mut read_block = |offset: u64, len: usize| -> std::result::Result<(), TransformError> {
            read_exact_at(self.file, &mut buf[..len], offset).map_err(io_error(offset))?;
            sum += buf[..len].iter().map(|&b| u64::from(b)).sum::<u64>();
            Ok(())
        };

        match self.offsets {
            Some(offsets) => {
                for unit in chunk.start..chunk.end {
                    read_block(offsets[unit as usize], self.block_size as usize)?;
                }
            }
            None => {
                let mut offset = chunk.start;
                while offset < chunk.end {
                    let len = self.block_size.min(chunk.end - offset) as usize;
                    read_block(offset, len)?;
                    offset += len as u64;
                }
            }
        }

        self.sums
            .get(claim.task())
            .and_then(|slot| slot.set(sum).ok())
            .ok_or(TransformError::Region {
                start: chunk.start,
                end: chunk.end,
                reason: "task outside plan or read twice",
            })
    }

    fn verify(self) -> Result<()> {
        let mut total = 0u64;
        for (task, sum) in self.sums.into_iter().enumerate() {
            total += sum.into_inner().ok_or_else(|| {
                BenchError::CorrectnessMismatch(format!("task {} was never read", task))
            })?;
        }
        if total != self.expected {
            return Err(BenchError::CorrectnessMismatch(format!(
                "read checksum {} != expected {}",
                total, self.expected
            )));
        }
        Ok(())
    }
}

/// Disk sequential and random I/O benchmark
#[derive(Debug, Clone)]
pub struct DiskWorkload {
    file_size: u64,
    seq_block_size: u64,
    random_block_size: u64,
    random_ops: u64,
    seed: u64,
}

impl DiskWorkload {
    pub fn new(file_size: u64, seq_block_size: u64, random_block_size: u64, random_ops: u64) -> Self {
        Self {
            file_size,
            seq_block_size,
            random_block_size,
            random_ops,
            seed: DEFAULT_SEED,
        }
    }

    pub fn from_config(config: &DiskConfig) -> Self {
        Self::new(
            config.file_size,
            config.seq_block_size,
            config.random_block_size,
            config.random_ops(),
        )
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Fill the file with pattern blocks so reads have known contents
    pub fn prepare(&self, file: &File) -> Result<()> {
        let block = alloc_pattern(self.seq_block_size as usize)?;
        let mut offset = 0;
        while offset < self.file_size {
            let len = self.seq_block_size.min(self.file_size - offset) as usize;
            write_all_at(file, &block[..len], offset)?;
            offset += len as u64;
        }
        file.sync_all()?;
        debug!(bytes = self.file_size, "Prepared test file");
        Ok(())
    }

    fn offsets(&self) -> Vec<u64> {
        random_offsets(self.file_size, self.random_block_size, self.random_ops, self.seed)
    }

    /// Run the pool and include the final flush in the measured time
    fn run_timed<T: Transform>(
        &self,
        runner: &BenchmarkRunner<'_>,
        spec: &WorkSpec,
        transform: T,
        file: &File,
        flush: bool,
        sink: &dyn ProgressSink,
    ) -> Result<Duration> {
        let report = runner.execute(spec, &transform, sink)?;
        let mut elapsed = report.elapsed;
        if flush {
            let watch = Stopwatch::start(runner.clock());
            file.sync_data()?;
            elapsed += watch.stop();
        }
        transform.verify()?;
        info!(
            workers = spec.worker_count,
            bytes = self.file_size,
            duration_ms = duration_ms(elapsed),
            "Disk benchmark complete"
        );
        Ok(elapsed)
    }

    pub fn seq_write(&self, runner: &BenchmarkRunner<'_>, file: &File, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        file.set_len(self.file_size)?;
        let spec = WorkSpec::new(self.file_size, self.seq_block_size).with_workers(workers);
        let transform = BlockWrite::sequential(file, self.seq_block_size)?;
        self.run_timed(runner, &spec, transform, file, true, sink)
    }

    pub fn seq_read(&self, runner: &BenchmarkRunner<'_>, file: &File, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        self.prepare(file)?;
        let spec = WorkSpec::new(self.file_size, self.seq_block_size).with_workers(workers);
        let transform = BlockRead::sequential(file, self.seq_block_size, &runner.plan(&spec));
        self.run_timed(runner, &spec, transform, file, false, sink)
    }

    pub fn random_write(&self, runner: &BenchmarkRunner<'_>, file: &File, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        file.set_len(self.file_size)?;
        let offsets = self.offsets();
        let spec = WorkSpec::new(self.random_ops, 1).with_workers(workers);
        let transform = BlockWrite::random(file, self.random_block_size, &offsets)?;
        self.run_timed(runner, &spec, transform, file, true, sink)
    }

    pub fn random_read(&self, runner: &BenchmarkRunner<'_>, file: &File, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        self.prepare(file)?;
        let offsets = self.offsets();
        let spec = WorkSpec::new(self.random_ops, 1).with_workers(workers);
        let transform = BlockRead::random(file, self.random_block_size, &offsets, &runner.plan(&spec));
        self.run_timed(runner, &spec, transform, file, false, sink)
    }
}
