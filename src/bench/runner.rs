//! Benchmark entry points
//!
//! A [`Transform`] is the position-dependent operation applied to one
//! claimed chunk. [`BenchmarkRunner`] drives it through a [`WorkerPool`],
//! then hands the transform back for verification outside the timed region.

use std::time::Duration;

use crate::bench::clock::{Clock, MonotonicClock};
use crate::bench::partition::{Claim, PartitionPlan, WorkSpec};
use crate::bench::placement::{CorePlacement, NoPlacement};
use crate::bench::progress::ProgressSink;
use crate::bench::worker::{PoolOptions, PoolReport, WorkerPool};
use crate::models::RunResult;
use crate::{Result, TransformError};

static NO_PLACEMENT: NoPlacement = NoPlacement;
static MONOTONIC: MonotonicClock = MonotonicClock;

/// Operation applied to each claimed chunk
///
/// Implementations must depend only on the chunk's global position, never
/// on which worker runs it or in what order chunks complete.
pub trait Transform: Sync {
    /// Transform one chunk
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError>;

    /// Called on each worker thread before its first claim
    fn attach_worker(&self, _worker: usize) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Called on each worker thread after its last claim
    fn detach_worker(&self, _worker: usize) {}

    /// Check the run's output after every worker has been joined
    fn verify(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<F> Transform for F
where
    F: Fn(&Claim) -> std::result::Result<(), TransformError> + Sync,
{
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        self(claim)
    }
}

/// Runs transforms with a fixed pool configuration
pub struct BenchmarkRunner<'a> {
    options: PoolOptions,
    placement: &'a dyn CorePlacement,
    clock: &'a dyn Clock,
}

impl Default for BenchmarkRunner<'static> {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl BenchmarkRunner<'static> {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            placement: &NO_PLACEMENT,
            clock: &MONOTONIC,
        }
    }
}

impl<'a> BenchmarkRunner<'a> {
    pub fn with_placement<'b>(self, placement: &'b dyn CorePlacement) -> BenchmarkRunner<'b>
    where
        'a: 'b,
    {
        BenchmarkRunner {
            options: self.options,
            placement,
            clock: self.clock,
        }
    }

    pub fn with_clock<'b>(self, clock: &'b dyn Clock) -> BenchmarkRunner<'b>
    where
        'a: 'b,
    {
        BenchmarkRunner {
            options: self.options,
            placement: self.placement,
            clock,
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock
    }

    /// Partition plan the runner's pool uses for `spec`
    pub fn plan(&self, spec: &WorkSpec) -> PartitionPlan {
        self.pool().plan(spec)
    }

    /// Pool configured like this runner
    pub fn pool(&self) -> WorkerPool<'a> {
        WorkerPool::new(self.options)
            .with_placement(self.placement)
            .with_clock(self.clock)
    }

    /// Execute the parallel phase only, leaving verification to the caller
    pub fn execute<T>(&self, spec: &WorkSpec, transform: &T, sink: &dyn ProgressSink) -> Result<PoolReport>
    where
        T: Transform + ?Sized,
    {
        self.pool().run(spec, transform, sink)
    }

    /// Execute and verify, returning the measured parallel-phase duration
    pub fn run<T: Transform>(&self, spec: &WorkSpec, transform: T, sink: &dyn ProgressSink) -> Result<Duration> {
        let report = self.execute(spec, &transform, sink)?;
        transform.verify()?;
        Ok(report.elapsed)
    }
}

/// Run one benchmark and fold its outcome into a [`RunResult`]
pub fn run_benchmark<T: Transform>(
    spec: &WorkSpec,
    transform: T,
    sink: &dyn ProgressSink,
    placement: Option<&dyn CorePlacement>,
) -> RunResult {
    let runner = BenchmarkRunner::default();
    let outcome = match placement {
        Some(placement) => runner.with_placement(placement).run(spec, transform, sink),
        None => runner.run(spec, transform, sink),
    };
    RunResult::from_outcome(outcome)
}
