//! Worker placement on hardware execution units
//!
//! Placement and priority elevation are best effort: a failure is returned
//! to the worker pool, which logs it and keeps going.

use std::io;

/// Maps a worker index to a hardware execution unit
pub trait CorePlacement: Send + Sync {
    /// Apply the placement for `worker` to the calling thread
    fn apply(&self, worker: usize) -> io::Result<()>;

    /// Core the worker would be placed on, if any
    fn core_for(&self, _worker: usize) -> Option<usize> {
        None
    }
}

/// Leaves scheduling to the OS
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlacement;

impl CorePlacement for NoPlacement {
    fn apply(&self, _worker: usize) -> io::Result<()> {
        Ok(())
    }
}

/// Pins workers round-robin onto an explicit list of cores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCores {
    cores: Vec<usize>,
}

impl PinnedCores {
    pub fn new(cores: Vec<usize>) -> Self {
        Self { cores }
    }

    pub fn cores(&self) -> &[usize] {
        &self.cores
    }
}

impl CorePlacement for PinnedCores {
    fn apply(&self, worker: usize) -> io::Result<()> {
        match self.core_for(worker) {
            Some(core) => pin_current_thread(core),
            None => Ok(()),
        }
    }

    fn core_for(&self, worker: usize) -> Option<usize> {
        if self.cores.is_empty() {
            None
        } else {
            Some(self.cores[worker % self.cores.len()])
        }
    }
}

/// Pin the calling thread to `core`
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> io::Result<()> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core {} exceeds CPU_SETSIZE", core),
        ));
    }
    // SAFETY: cpu_set_t is plain data; the set is fully initialized before use
    // and the core index was bounds-checked above.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(core: usize) -> io::Result<()> {
    tracing::debug!(core, "Thread pinning not supported on this platform");
    Ok(())
}

/// Ask the OS for a higher scheduling priority for the calling thread
#[cfg(unix)]
pub fn raise_priority() -> io::Result<()> {
    // SAFETY: setpriority only reads its integer arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -10) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn raise_priority() -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_placement_is_valid() {
        assert!(NoPlacement.apply(0).is_ok());
        assert!(NoPlacement.apply(usize::MAX).is_ok());
        assert_eq!(NoPlacement.core_for(3), None);
    }

    #[test]
    fn test_pinned_cores_round_robin() {
        let placement = PinnedCores::new(vec![4, 5, 6, 7]);
        assert_eq!(placement.core_for(0), Some(4));
        assert_eq!(placement.core_for(3), Some(7));
        assert_eq!(placement.core_for(5), Some(5));

        let empty = PinnedCores::new(Vec::new());
        assert_eq!(empty.core_for(0), None);
        assert!(empty.apply(0).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_rejects_out_of_range_core() {
        let err = pin_current_thread(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
