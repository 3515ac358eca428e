//! Benchmark engine module
//!
//! Partitioning, the worker pool, progress aggregation, timing and core
//! placement shared by every workload.

pub mod clock;
pub mod partition;
pub mod placement;
pub mod progress;
pub mod runner;
pub mod stress;
pub mod worker;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, MonotonicClock, Stopwatch};
pub use partition::{Chunk, Claim, ClaimMode, PartitionPlan, WorkSpec};
pub use placement::{CorePlacement, NoPlacement, PinnedCores};
pub use progress::{ChannelSink, NullSink, ProgressOptions, ProgressOrdering, ProgressSink, ScaledSink};
pub use runner::{run_benchmark, BenchmarkRunner, Transform};
pub use stress::{StressHandle, StressTest};
pub use worker::{CancellationFlag, PoolOptions, PoolReport, WorkerPool, WorkerReport, WorkerStatus};
