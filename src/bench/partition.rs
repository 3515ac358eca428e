//! Work partitioning
//!
//! Splits the logical unit index space `[0, total_units)` into disjoint,
//! `unit_size`-aligned chunks and hands them out to workers, either from a
//! precomputed static assignment or through a shared atomic claim counter.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::{BenchError, Result};

/// Default number of tasks a run is split into, independent of worker count
pub const DEFAULT_NUM_TASKS: usize = 100;

/// Size and parallelism of one benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSpec {
    /// Number of logical units (bytes, iterations, I/O operations)
    pub total_units: u64,
    /// Alignment granularity of chunk boundaries, in units
    pub unit_size: u64,
    /// Number of worker threads
    pub worker_count: usize,
}

impl WorkSpec {
    /// Create a spec using every available hardware thread
    pub fn new(total_units: u64, unit_size: u64) -> Self {
        Self {
            total_units,
            unit_size,
            worker_count: num_cpus::get().max(1),
        }
    }

    /// Set the number of worker threads
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Validate the spec. A zero-unit spec is valid and runs trivially.
    pub fn validate(&self) -> Result<()> {
        if self.unit_size == 0 {
            return Err(BenchError::Config(
                "Unit size must be greater than 0".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(BenchError::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Half-open range over the logical unit index space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of units in the chunk
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Index of the first `unit_size` block covered by this chunk
    pub fn first_block(&self, unit_size: u64) -> u64 {
        self.start / unit_size
    }

    /// The chunk as a slice range
    pub fn to_range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// Chunk assignment strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClaimMode {
    /// Each worker owns a contiguous, precomputed run of tasks
    Static,
    /// Workers claim the next unclaimed task from a shared counter
    #[default]
    Dynamic,
}

impl ClaimMode {
    pub fn description(&self) -> &'static str {
        match self {
            ClaimMode::Static => "static",
            ClaimMode::Dynamic => "dynamic",
        }
    }
}

impl std::str::FromStr for ClaimMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(ClaimMode::Static),
            "dynamic" => Ok(ClaimMode::Dynamic),
            other => Err(BenchError::Config(format!(
                "Unknown claim mode '{}' (expected static or dynamic)",
                other
            ))),
        }
    }
}

/// Deterministic split of a work range into tasks
///
/// Boundaries fall on multiples of `unit_size`. When `total_units` is not a
/// multiple of `unit_size`, the trailing partial block goes to the last task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    total_units: u64,
    unit_size: u64,
    num_tasks: usize,
    task_blocks: u64,
    remainder: u64,
    tail: u64,
}

impl PartitionPlan {
    /// Build a plan of (at most) `requested_tasks` tasks
    ///
    /// The task count shrinks when there are fewer whole blocks than tasks,
    /// so that no task is empty.
    pub fn new(total_units: u64, unit_size: u64, requested_tasks: usize) -> Self {
        let unit_size = unit_size.max(1);
        let total_blocks = total_units / unit_size;
        let tail = total_units % unit_size;

        let num_tasks = if total_units == 0 || requested_tasks == 0 {
            0
        } else if total_blocks == 0 {
            1
        } else {
            (requested_tasks as u64).min(total_blocks) as usize
        };

        let (task_blocks, remainder) = if num_tasks == 0 || total_blocks == 0 {
            (0, 0)
        } else {
            (
                total_blocks / num_tasks as u64,
                total_blocks % num_tasks as u64,
            )
        };

        Self {
            total_units,
            unit_size,
            num_tasks,
            task_blocks,
            remainder,
            tail,
        }
    }

    /// Plan for a work spec
    pub fn for_spec(spec: &WorkSpec, requested_tasks: usize) -> Self {
        Self::new(spec.total_units, spec.unit_size, requested_tasks)
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    pub fn total_units(&self) -> u64 {
        self.total_units
    }

    pub fn unit_size(&self) -> u64 {
        self.unit_size
    }

    /// Chunk covered by task `index`
    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        if index >= self.num_tasks {
            return None;
        }
        let i = index as u64;
        let start_block = i * self.task_blocks + i.min(self.remainder);
        let len_blocks = self.task_blocks + u64::from(i < self.remainder);

        let start = start_block * self.unit_size;
        let mut end = start + len_blocks * self.unit_size;
        if index == self.num_tasks - 1 {
            end += self.tail;
        }
        Some(Chunk::new(start, end))
    }

    /// All chunks in position order
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.num_tasks).filter_map(move |i| self.chunk(i))
    }

    /// Contiguous task range statically owned by `worker` out of `workers`
    pub fn static_tasks(&self, worker: usize, workers: usize) -> Range<usize> {
        if workers == 0 || worker >= workers {
            return 0..0;
        }
        let per_worker = self.num_tasks / workers;
        let extra = self.num_tasks % workers;
        let start = worker * per_worker + worker.min(extra);
        let len = per_worker + usize::from(worker < extra);
        start..start + len
    }
}

/// A task granted to exactly one worker
///
/// Claims are only produced by [`ClaimCursor::next_claim`] and cannot be
/// cloned, so holding one proves exclusive ownership of its chunk.
#[derive(Debug, PartialEq, Eq)]
pub struct Claim {
    task: usize,
    chunk: Chunk,
}

impl Claim {
    pub fn task(&self) -> usize {
        self.task
    }

    pub fn chunk(&self) -> Chunk {
        self.chunk
    }

    #[cfg(test)]
    pub(crate) fn for_test(task: usize, chunk: Chunk) -> Self {
        Self { task, chunk }
    }
}

enum Assignment {
    Static(Vec<Range<usize>>),
    Dynamic(AtomicUsize),
}

/// Shared claim state for one run
pub struct ClaimState {
    plan: PartitionPlan,
    assignment: Assignment,
}

impl ClaimState {
    pub fn new(plan: PartitionPlan, mode: ClaimMode, workers: usize) -> Self {
        let assignment = match mode {
            ClaimMode::Static => Assignment::Static(
                (0..workers).map(|w| plan.static_tasks(w, workers)).collect(),
            ),
            ClaimMode::Dynamic => Assignment::Dynamic(AtomicUsize::new(0)),
        };
        Self { plan, assignment }
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn mode(&self) -> ClaimMode {
        match self.assignment {
            Assignment::Static(_) => ClaimMode::Static,
            Assignment::Dynamic(_) => ClaimMode::Dynamic,
        }
    }

    /// Cursor through which `worker` claims its chunks
    pub fn cursor(&self, worker: usize) -> ClaimCursor<'_> {
        let owned = match &self.assignment {
            Assignment::Static(ranges) => ranges.get(worker).cloned().unwrap_or(0..0),
            Assignment::Dynamic(_) => 0..0,
        };
        ClaimCursor { state: self, owned }
    }
}

/// Per-worker view of a [`ClaimState`]
pub struct ClaimCursor<'a> {
    state: &'a ClaimState,
    owned: Range<usize>,
}

impl ClaimCursor<'_> {
    /// Claim the next chunk, or `None` when no work remains for this worker
    pub fn next_claim(&mut self) -> Option<Claim> {
        let task = match &self.state.assignment {
            Assignment::Static(_) => self.owned.next()?,
            Assignment::Dynamic(next_task) => {
                // fetch_add alone guarantees each index is granted once
                let task = next_task.fetch_add(1, Ordering::Relaxed);
                if task >= self.state.plan.num_tasks() {
                    return None;
                }
                task
            }
        };
        let chunk = self.state.plan.chunk(task)?;
        Some(Claim { task, chunk })
    }
}
