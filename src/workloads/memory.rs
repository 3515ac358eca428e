//! RAM bandwidth workloads
//!
//! Sequential write stores the position pattern into a large buffer;
//! sequential read sums a pattern-filled buffer per task. Both check their
//! result against the closed-form pattern after the join.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::info;

use crate::bench::clock::duration_ms;
use crate::bench::partition::{Claim, PartitionPlan, WorkSpec};
use crate::bench::progress::ProgressSink;
use crate::bench::runner::{BenchmarkRunner, Transform};
use crate::config::MemoryConfig;
use crate::io::buffer::{
    alloc_buffer, alloc_pattern, fill_pattern, find_pattern_mismatch, pattern_sum, DisjointMut,
    MemoryLock,
};
use crate::{BenchError, Result, TransformError};

/// Chunk alignment for memory workloads (one page)
pub const PAGE_SIZE: u64 = 4096;

/// Fills each claimed region with the position pattern
pub struct PatternWrite<'a> {
    buffer: DisjointMut<'a, u8>,
}

impl<'a> PatternWrite<'a> {
    pub fn new(buffer: &'a mut [u8], plan: PartitionPlan) -> Result<Self> {
        Ok(Self {
            buffer: DisjointMut::new(buffer, plan)?,
        })
    }
}

impl Transform for PatternWrite<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let mut region = self.buffer.take(claim)?;
        fill_pattern(&mut region, claim.chunk().start);
        Ok(())
    }

    fn verify(self) -> Result<()> {
        for (chunk, region) in self.buffer.into_regions() {
            if let Some(i) = find_pattern_mismatch(region, chunk.start) {
                return Err(BenchError::CorrectnessMismatch(format!(
                    "written buffer differs at byte {}",
                    chunk.start + i as u64
                )));
            }
        }
        Ok(())
    }
}

/// Sums each claimed region of a pattern-filled buffer
pub struct PatternRead<'a> {
    buffer: &'a [u8],
    sums: Vec<OnceLock<u64>>,
}

impl<'a> PatternRead<'a> {
    pub fn new(buffer: &'a [u8], plan: &PartitionPlan) -> Self {
        Self {
            buffer,
            sums: (0..plan.num_tasks()).map(|_| OnceLock::new()).collect(),
        }
    }
}

impl Transform for PatternRead<'_> {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let chunk = claim.chunk();
        let region = self
            .buffer
            .get(chunk.to_range())
            .ok_or(TransformError::Region {
                start: chunk.start,
                end: chunk.end,
                reason: "chunk outside buffer",
            })?;
        let sum = region.iter().map(|&b| u64::from(b)).sum::<u64>();
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
        let expected = pattern_sum(0, self.buffer.len() as u64);
        if total != expected {
            return Err(BenchError::CorrectnessMismatch(format!(
                "read checksum {} != expected {}",
                total, expected
            )));
        }
        Ok(())
    }
}

/// RAM sequential write/read benchmark
#[derive(Debug, Clone, Copy)]
pub struct MemoryWorkload {
    size_bytes: usize,
}

impl MemoryWorkload {
    pub fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.size_bytes as usize)
    }

    fn spec(&self, workers: usize) -> WorkSpec {
        WorkSpec::new(self.size_bytes as u64, PAGE_SIZE).with_workers(workers)
    }

    pub fn run_write(&self, runner: &BenchmarkRunner<'_>, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        let spec = self.spec(workers);
        let mut buffer = alloc_buffer(self.size_bytes)?;
        let _lock = MemoryLock::new(&buffer);

        let transform = PatternWrite::new(&mut buffer, runner.plan(&spec))?;
        let elapsed = runner.run(&spec, transform, sink)?;
        info!(workers, duration_ms = duration_ms(elapsed), "RAM write complete");
        Ok(elapsed)
    }

    pub fn run_read(&self, runner: &BenchmarkRunner<'_>, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        let spec = self.spec(workers);
        let buffer = alloc_pattern(self.size_bytes)?;
        let _lock = MemoryLock::new(&buffer);

        let transform = PatternRead::new(&buffer, &runner.plan(&spec));
        let elapsed = runner.run(&spec, transform, sink)?;
        info!(workers, duration_ms = duration_ms(elapsed), "RAM read complete");
        Ok(elapsed)
    }
}
