//! Sustained background load
//!
//! A stress test keeps every worker busy with the math kernel until it is
//! stopped. Threads are always joined: stopping (or dropping) the handle
//! cancels the run and waits for every worker to exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::bench::placement::CorePlacement;
use crate::bench::worker::CancellationFlag;
use crate::workloads::math::kernel;
use crate::{BenchError, Result};

/// Iterations evaluated between cancellation checks
const BATCH: u64 = 10_000;

/// Starts stress runs
pub struct StressTest;

impl StressTest {
    /// Start `workers` stress threads
    pub fn start(workers: usize, placement: Arc<dyn CorePlacement>) -> Result<StressHandle> {
        if workers == 0 {
            return Err(BenchError::Config(
                "Stress test needs at least one worker".to_string(),
            ));
        }

        let cancel = Arc::new(CancellationFlag::new());
        let iterations = Arc::new(AtomicU64::new(0));
        let mut handle = StressHandle {
            cancel: Arc::clone(&cancel),
            iterations: Arc::clone(&iterations),
            threads: Vec::with_capacity(workers),
        };

        for id in 0..workers {
            let cancel = Arc::clone(&cancel);
            let iterations = Arc::clone(&iterations);
            let placement = Arc::clone(&placement);
            let spawned = thread::Builder::new()
                .name(format!("corebench-stress-{}", id))
                .spawn(move || stress_loop(id, &*placement, &cancel, &iterations));
            match spawned {
                Ok(thread) => handle.threads.push(thread),
                // Dropping the handle joins whatever already started
                Err(e) => {
                    return Err(BenchError::WorkerFatal(format!(
                        "failed to spawn stress worker {}: {}",
                        id, e
                    )))
                }
            }
        }

        info!(workers, "Stress test started");
        Ok(handle)
    }
}

fn stress_loop(
    id: usize,
    placement: &dyn CorePlacement,
    cancel: &CancellationFlag,
    iterations: &AtomicU64,
) {
    if let Err(e) = placement.apply(id) {
        warn!(worker = id, error = %e, "Failed to apply core placement");
    }

    let mut i = 0u64;
    let mut sink = 0.0f64;
    while !cancel.is_cancelled() {
        for _ in 0..BATCH {
            sink += kernel(i as f64);
            i = i.wrapping_add(1);
        }
        iterations.fetch_add(BATCH, Ordering::Relaxed);
    }
    std::hint::black_box(sink);
    debug!(worker = id, "Stress worker exiting");
}

/// Running stress test
pub struct StressHandle {
    cancel: Arc<CancellationFlag>,
    iterations: Arc<AtomicU64>,
    threads: Vec<JoinHandle<()>>,
}

impl StressHandle {
    /// Kernel iterations completed so far across all workers
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Number of running workers
    pub fn workers(&self) -> usize {
        self.threads.len()
    }

    /// Cancel and join every worker, returning total iterations
    pub fn stop(mut self) -> Result<u64> {
        self.shutdown()?;
        Ok(self.iterations())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        let mut panicked = 0;
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(BenchError::WorkerFatal(format!(
                "{} stress workers panicked",
                panicked
            )));
        }
        Ok(())
    }
}

impl Drop for StressHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Stress test shut down with errors");
        }
    }
}
