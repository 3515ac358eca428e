//! I/O module
//!
//! Benchmark buffers and the disk test file used by the storage workloads.

pub mod buffer;
pub mod disk;

pub use buffer::{alloc_buffer, alloc_pattern, DisjointMut, MemoryLock, RegionMut};
pub use disk::{read_exact_at, write_all_at, TempFile};
