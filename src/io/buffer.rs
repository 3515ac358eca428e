//! Benchmark buffers
//!
//! Fallible allocation, best-effort page locking, and [`DisjointMut`], which
//! hands each claimed chunk a mutable view of its own region of one shared
//! buffer.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::bench::partition::{Chunk, Claim, PartitionPlan};
use crate::{BenchError, Result, TransformError};

/// Allocate a zeroed buffer, reporting failure instead of aborting
pub fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|e| {
        BenchError::Allocation(format!("failed to allocate {} bytes: {}", len, e))
    })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Byte stored at `offset` in pattern-filled buffers
#[inline]
pub fn pattern_byte(offset: u64) -> u8 {
    (offset & 0xFF) as u8
}

/// Allocate a buffer filled with the position pattern
pub fn alloc_pattern(len: usize) -> Result<Vec<u8>> {
    let mut buffer = alloc_buffer(len)?;
    fill_pattern(&mut buffer, 0);
    Ok(buffer)
}

/// Fill `buf` with the pattern for the region starting at `offset`
pub fn fill_pattern(buf: &mut [u8], offset: u64) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = pattern_byte(offset + i as u64);
    }
}

/// Sum of pattern bytes over `[start, end)`
pub fn pattern_sum(start: u64, end: u64) -> u64 {
    fn prefix(n: u64) -> u64 {
        let full = n / 256;
        let rest = n % 256;
        full * (255 * 256 / 2) + rest * rest.saturating_sub(1) / 2
    }
    prefix(end) - prefix(start)
}

/// Position of the first byte that breaks the pattern
pub fn find_pattern_mismatch(buf: &[u8], offset: u64) -> Option<usize> {
    buf.iter()
        .enumerate()
        .position(|(i, &b)| b != pattern_byte(offset + i as u64))
}

/// RAII page lock over a buffer
///
/// Locking is best effort: failure is logged and the guard does nothing.
/// Declare the guard after the buffer so it is dropped first.
pub struct MemoryLock {
    addr: usize,
    len: usize,
    locked: bool,
}

impl MemoryLock {
    pub fn new(buf: &[u8]) -> Self {
        let addr = buf.as_ptr() as usize;
        let len = buf.len();
        let locked = len > 0 && lock_pages(addr, len);
        if locked {
            debug!(bytes = len, "Locked buffer in memory");
        }
        Self { addr, len, locked }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        if self.locked {
            unlock_pages(self.addr, self.len);
        }
    }
}

#[cfg(unix)]
fn lock_pages(addr: usize, len: usize) -> bool {
    // SAFETY: mlock only changes residency of an existing mapping.
    let rc = unsafe { libc::mlock(addr as *const libc::c_void, len) };
    if rc != 0 {
        warn!(
            bytes = len,
            error = %std::io::Error::last_os_error(),
            "Failed to lock buffer in memory"
        );
        return false;
    }
    true
}

#[cfg(unix)]
fn unlock_pages(addr: usize, len: usize) {
    // SAFETY: see lock_pages.
    unsafe {
        libc::munlock(addr as *const libc::c_void, len);
    }
}

#[cfg(not(unix))]
fn lock_pages(_addr: usize, _len: usize) -> bool {
    false
}

#[cfg(not(unix))]
fn unlock_pages(_addr: usize, _len: usize) {}

/// One shared buffer split into per-task mutable regions
///
/// The buffer is cut along a [`PartitionPlan`] up front, so every task owns
/// its own slice. Each region can be taken once; verification gets the
/// regions back through [`DisjointMut::into_regions`].
pub struct DisjointMut<'a, T> {
    plan: PartitionPlan,
    len: usize,
    regions: Vec<(Chunk, Mutex<&'a mut [T]>)>,
    taken: Vec<AtomicBool>,
}

impl<'a, T> DisjointMut<'a, T> {
    pub fn new(buffer: &'a mut [T], plan: PartitionPlan) -> Result<Self> {
        if plan.total_units() != buffer.len() as u64 {
            return Err(BenchError::Allocation(format!(
                "buffer of {} elements does not match work of {} units",
                buffer.len(),
                plan.total_units()
            )));
        }

        let len = buffer.len();
        let mut rest = buffer;
        let mut regions = Vec::with_capacity(plan.num_tasks());
        let mut next = 0;
        for task in 0..plan.num_tasks() {
            let chunk = plan
                .chunk(task)
                .filter(|c| c.start == next)
                .ok_or_else(|| BenchError::Allocation(format!("plan chunk {} is not contiguous", task)))?;
            let (region, tail) = std::mem::take(&mut rest).split_at_mut(chunk.len() as usize);
            regions.push((chunk, Mutex::new(region)));
            rest = tail;
            next = chunk.end;
        }

        Ok(Self {
            plan,
            len,
            regions,
            taken: (0..plan.num_tasks()).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutable view of the claimed chunk's region
    pub fn take(&self, claim: &Claim) -> std::result::Result<RegionMut<'_, 'a, T>, TransformError> {
        let chunk = claim.chunk();
        let region_error = |reason| TransformError::Region {
            start: chunk.start,
            end: chunk.end,
            reason,
        };

        if self.plan.chunk(claim.task()) != Some(chunk) {
            return Err(region_error("chunk does not belong to this buffer's plan"));
        }
        let (taken, (_, slot)) = self
            .taken
            .get(claim.task())
            .zip(self.regions.get(claim.task()))
            .ok_or_else(|| region_error("task outside plan"))?;
        if taken.swap(true, Ordering::AcqRel) {
            return Err(region_error("region already taken"));
        }

        // Uncontended: only the claim holder reaches this slot
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(RegionMut(guard))
    }

    /// Number of regions taken so far
    pub fn taken_count(&self) -> usize {
        self.taken
            .iter()
            .filter(|t| t.load(Ordering::Acquire))
            .count()
    }

    /// Every region with its chunk, in buffer order
    pub fn into_regions(self) -> Vec<(Chunk, &'a mut [T])> {
        self.regions
            .into_iter()
            .map(|(chunk, slot)| (chunk, slot.into_inner().unwrap_or_else(PoisonError::into_inner)))
            .collect()
    }
}

/// A taken region; derefs to the chunk's slice
pub struct RegionMut<'r, 'a, T>(MutexGuard<'r, &'a mut [T]>);

impl<T> Deref for RegionMut<'_, '_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> DerefMut for RegionMut<'_, '_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::partition::Chunk;

    #[test]
    fn test_alloc_buffer_zeroed() {
        let buffer = alloc_buffer(4096).unwrap();
        assert_eq!(buffer.len(), 4096);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_alloc_buffer_failure_is_allocation_error() {
        let err = alloc_buffer(usize::MAX).unwrap_err();
        assert!(matches!(err, BenchError::Allocation(_)));
    }

    #[test]
    fn test_pattern_sum_matches_naive() {
        for (start, end) in [(0u64, 0u64), (0, 1), (0, 256), (3, 700), (255, 257), (1000, 5000)] {
            let naive: u64 = (start..end).map(|o| pattern_byte(o) as u64).sum();
            assert_eq!(pattern_sum(start, end), naive, "{}..{}", start, end);
        }
    }

    #[test]
    fn test_pattern_mismatch_detection() {
        let mut buffer = alloc_pattern(1024).unwrap();
        assert_eq!(find_pattern_mismatch(&buffer, 0), None);
        buffer[700] ^= 0xFF;
        assert_eq!(find_pattern_mismatch(&buffer, 0), Some(700));
    }

    #[test]
    fn test_memory_lock_is_best_effort() {
        let buffer = alloc_buffer(8192).unwrap();
        let lock = MemoryLock::new(&buffer);
        // Either outcome is fine; it must never fail the caller
        let _ = lock.is_locked();
        drop(lock);
        assert!(!MemoryLock::new(&[]).is_locked());
    }

    #[test]
    fn test_disjoint_regions_taken_once() {
        let mut buffer = vec![0u8; 64];
        let plan = PartitionPlan::new(64, 16, 4);
        let regions = DisjointMut::new(&mut buffer, plan).unwrap();

        let first = Claim::for_test(0, Chunk::new(0, 16));
        regions.take(&first).unwrap().fill(1);
        assert!(regions.take(&first).is_err());

        let forged = Claim::for_test(1, Chunk::new(8, 24));
        assert!(regions.take(&forged).is_err());
        assert_eq!(regions.taken_count(), 1);

        let regions = regions.into_regions();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[0].0, Chunk::new(0, 16));
        assert!(regions[0].1.iter().all(|&b| b == 1));
        assert!(regions[1..].iter().all(|(_, r)| r.iter().all(|&b| b == 0)));
        drop(regions);
        assert!(buffer[..16].iter().all(|&b| b == 1));
    }

    #[test]
    fn test_regions_cover_buffer_across_threads() {
        let mut buffer = vec![0u8; 1000];
        let plan = PartitionPlan::new(1000, 1, 7);
        let regions = DisjointMut::new(&mut buffer, plan).unwrap();

        std::thread::scope(|scope| {
            for task in 0..plan.num_tasks() {
                let regions = &regions;
                scope.spawn(move || {
                    let claim = Claim::for_test(task, plan.chunk(task).unwrap());
                    let mut region = regions.take(&claim).unwrap();
                    region.fill(task as u8 + 1);
                });
            }
        });
        assert_eq!(regions.taken_count(), 7);

        let mut next = 0;
        for (task, (chunk, region)) in regions.into_regions().into_iter().enumerate() {
            assert_eq!(chunk.start, next);
            assert_eq!(region.len() as u64, chunk.len());
            assert!(region.iter().all(|&b| b == task as u8 + 1));
            next = chunk.end;
        }
        assert_eq!(next, 1000);
    }

    #[test]
    fn test_claim_from_other_task_is_rejected() {
        let mut buffer = vec![0u8; 64];
        let plan = PartitionPlan::new(64, 16, 4);
        let regions = DisjointMut::new(&mut buffer, plan).unwrap();

        // Right chunk, wrong task id
        assert!(regions.take(&Claim::for_test(2, Chunk::new(16, 32))).is_err());
        assert!(regions.take(&Claim::for_test(9, Chunk::new(0, 16))).is_err());
        assert_eq!(regions.taken_count(), 0);
    }

    #[test]
    fn test_disjoint_rejects_mismatched_plan() {
        let mut buffer = vec![0u8; 10];
        assert!(DisjointMut::new(&mut buffer, PartitionPlan::new(64, 16, 4)).is_err());
    }
}
