//! Monotonic timing of the measured region
//!
//! Only the span between worker spawn and the final join is measured.
//! Memory fences on both sides keep setup and verification work from being
//! reordered into the timed window.

use std::sync::atomic::{compiler_fence, fence, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic instants
pub trait Clock: Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand, for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Measures one interval on a [`Clock`]
pub struct Stopwatch<'c> {
    clock: &'c dyn Clock,
    started: Instant,
}

impl<'c> Stopwatch<'c> {
    pub fn start(clock: &'c dyn Clock) -> Self {
        fence(Ordering::SeqCst);
        let started = clock.now();
        compiler_fence(Ordering::SeqCst);
        Self { clock, started }
    }

    /// Stop the watch and return the elapsed time
    pub fn stop(self) -> Duration {
        compiler_fence(Ordering::SeqCst);
        let stopped = self.clock.now();
        fence(Ordering::SeqCst);
        stopped.saturating_duration_since(self.started)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
