//! Benchmark worker pool
//!
//! Spawns one OS thread per worker inside a `std::thread::scope`, lets each
//! worker claim chunks until the work or the run is exhausted, and joins all
//! of them before anything is verified. The timed region is exactly
//! spawn → join.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bench::clock::{duration_ms, Clock, MonotonicClock, Stopwatch};
use crate::bench::partition::{ClaimMode, ClaimState, PartitionPlan, WorkSpec, DEFAULT_NUM_TASKS};
use crate::bench::placement::{raise_priority, CorePlacement, NoPlacement};
use crate::bench::progress::{ProgressAggregator, ProgressOptions, ProgressSink};
use crate::bench::runner::Transform;
use crate::{BenchError, Result, TransformError};

static NO_PLACEMENT: NoPlacement = NoPlacement;
static MONOTONIC: MonotonicClock = MonotonicClock;

/// Worker status for tracking individual worker states
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStatus {
    /// Worker is idle and ready to accept work
    Idle,
    /// Worker is currently claiming and transforming chunks
    Running,
    /// Worker ran out of chunks
    Completed,
    /// Worker failed with an error
    Failed(String),
    /// Worker stopped after observing the cancellation flag
    Cancelled,
}

/// Per-worker summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    /// Worker index
    pub id: usize,
    /// Terminal status of the worker
    pub status: WorkerStatus,
    /// Chunks this worker transformed
    pub chunks: u64,
    /// Units this worker transformed
    pub units: u64,
}

impl WorkerReport {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            chunks: 0,
            units: 0,
        }
    }

    /// Check if the worker is active (running)
    pub fn is_active(&self) -> bool {
        matches!(self.status, WorkerStatus::Running)
    }

    /// Check if the worker is completed (success or failure)
    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            WorkerStatus::Completed | WorkerStatus::Failed(_) | WorkerStatus::Cancelled
        )
    }
}

/// Outcome of a successful pool run
#[derive(Debug, Clone)]
pub struct PoolReport {
    /// Time from first spawn to last join
    pub elapsed: Duration,
    /// Number of tasks the work was split into
    pub tasks: usize,
    /// Per-worker summaries, in worker order
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    /// Total units transformed across all workers
    pub fn units(&self) -> u64 {
        self.workers.iter().map(|w| w.units).sum()
    }

    /// Total chunks transformed across all workers
    pub fn chunks(&self) -> u64 {
        self.workers.iter().map(|w| w.chunks).sum()
    }

    /// Check if every worker finished normally
    pub fn all_workers_completed(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.status == WorkerStatus::Completed)
    }
}

/// Run-scoped cancellation token
///
/// Set at most once per run by the first worker that fails; checked by every
/// worker before it claims its next chunk.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Set the flag. Returns `true` for the call that actually set it.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::Release)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pool tuning independent of work size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub claim_mode: ClaimMode,
    pub num_tasks: usize,
    pub elevate_priority: bool,
    pub progress: ProgressOptions,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            claim_mode: ClaimMode::default(),
            num_tasks: DEFAULT_NUM_TASKS,
            elevate_priority: true,
            progress: ProgressOptions::default(),
        }
    }
}

impl PoolOptions {
    pub fn with_claim_mode(mut self, claim_mode: ClaimMode) -> Self {
        self.claim_mode = claim_mode;
        self
    }

    pub fn with_num_tasks(mut self, num_tasks: usize) -> Self {
        self.num_tasks = num_tasks;
        self
    }

    pub fn with_elevate_priority(mut self, elevate: bool) -> Self {
        self.elevate_priority = elevate;
        self
    }

    pub fn with_progress(mut self, progress: ProgressOptions) -> Self {
        self.progress = progress;
        self
    }
}

/// Fixed-size pool of benchmark worker threads
pub struct WorkerPool<'p> {
    options: PoolOptions,
    placement: &'p dyn CorePlacement,
    clock: &'p dyn Clock,
}

impl Default for WorkerPool<'static> {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl WorkerPool<'static> {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            placement: &NO_PLACEMENT,
            clock: &MONOTONIC,
        }
    }
}

impl<'p> WorkerPool<'p> {
    pub fn with_placement<'q>(self, placement: &'q dyn CorePlacement) -> WorkerPool<'q>
    where
        'p: 'q,
    {
        WorkerPool {
            options: self.options,
            placement,
            clock: self.clock,
        }
    }

    pub fn with_clock<'q>(self, clock: &'q dyn Clock) -> WorkerPool<'q>
    where
        'p: 'q,
    {
        WorkerPool {
            options: self.options,
            placement: self.placement,
            clock,
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Partition plan this pool would use for `spec`
    pub fn plan(&self, spec: &WorkSpec) -> PartitionPlan {
        PartitionPlan::for_spec(spec, self.options.num_tasks)
    }

    /// Run `transform` over every chunk of `spec` and join all workers
    ///
    /// Reports the final `1.0` to `sink` on success. The transform's
    /// verification is left to the caller.
    pub fn run<T>(&self, spec: &WorkSpec, transform: &T, sink: &dyn ProgressSink) -> Result<PoolReport>
    where
        T: Transform + ?Sized,
    {
        spec.validate()?;
        let plan = self.plan(spec);
        let progress = ProgressAggregator::new(spec.total_units, self.options.progress, sink);

        if plan.num_tasks() == 0 {
            debug!(total_units = spec.total_units, "Nothing to do, completing trivially");
            progress.finish();
            return Ok(PoolReport {
                elapsed: Duration::ZERO,
                tasks: 0,
                workers: Vec::new(),
            });
        }

        let workers = spec.worker_count;
        let claims = ClaimState::new(plan, self.options.claim_mode, workers);
        let cancel = CancellationFlag::new();

        debug!(
            workers,
            tasks = plan.num_tasks(),
            mode = self.options.claim_mode.description(),
            "Starting worker pool"
        );

        let watch = Stopwatch::start(self.clock);
        let (joined, spawn_error) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut spawn_error = None;

            for id in 0..workers {
                let claims = &claims;
                let progress = &progress;
                let cancel = &cancel;
                let spawned = thread::Builder::new()
                    .name(format!("corebench-worker-{}", id))
                    .spawn_scoped(scope, move || {
                        self.worker_loop(id, claims, transform, progress, cancel)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        cancel.cancel();
                        spawn_error = Some(format!("failed to spawn worker {}: {}", id, e));
                        break;
                    }
                }
            }

            let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
            (joined, spawn_error)
        });
        let elapsed = watch.stop();

        let mut reports = Vec::with_capacity(joined.len());
        let mut fatal = spawn_error;
        let mut transform_error = None;

        for (id, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(WorkerOutcome::Finished(report)) => reports.push(report),
                Ok(WorkerOutcome::TransformFailed(report, err)) => {
                    reports.push(report);
                    transform_error.get_or_insert(err);
                }
                Ok(WorkerOutcome::AttachFailed(report, reason)) | Ok(WorkerOutcome::Panicked(report, reason)) => {
                    reports.push(report);
                    fatal.get_or_insert(reason);
                }
                Err(_) => {
                    let mut report = WorkerReport::new(id);
                    report.status = WorkerStatus::Failed("worker panicked".to_string());
                    reports.push(report);
                    fatal.get_or_insert(format!("worker {} panicked", id));
                }
            }
        }

        if let Some(reason) = fatal {
            return Err(BenchError::WorkerFatal(reason));
        }
        if let Some(err) = transform_error {
            return Err(BenchError::Transform(err));
        }
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        let report = PoolReport {
            elapsed,
            tasks: plan.num_tasks(),
            workers: reports,
        };
        if report.units() != spec.total_units {
            return Err(BenchError::CorrectnessMismatch(format!(
                "workers covered {} of {} units",
                report.units(),
                spec.total_units
            )));
        }

        progress.finish();
        info!(
            workers,
            tasks = report.tasks,
            duration_ms = duration_ms(elapsed),
            "Worker pool finished"
        );
        Ok(report)
    }

    fn worker_loop<T>(
        &self,
        id: usize,
        claims: &ClaimState,
        transform: &T,
        progress: &ProgressAggregator<'_>,
        cancel: &CancellationFlag,
    ) -> WorkerOutcome
    where
        T: Transform + ?Sized,
    {
        let span = tracing::debug_span!("worker", id);
        let _enter = span.enter();
        let mut report = WorkerReport::new(id);

        if let Err(e) = self.placement.apply(id) {
            warn!(error = %e, "Failed to apply core placement");
        }
        if self.options.elevate_priority {
            if let Err(e) = raise_priority() {
                debug!(error = %e, "Failed to raise thread priority");
            }
        }
        if let Err(reason) = transform.attach_worker(id) {
            error!(%reason, "Worker could not attach to its context");
            cancel.cancel();
            report.status = WorkerStatus::Failed(reason.clone());
            return WorkerOutcome::AttachFailed(report, reason);
        }

        report.status = WorkerStatus::Running;
        let mut cursor = claims.cursor(id);
        let outcome = loop {
            if cancel.is_cancelled() {
                report.status = WorkerStatus::Cancelled;
                break None;
            }
            let Some(claim) = cursor.next_claim() else {
                report.status = WorkerStatus::Completed;
                break None;
            };
            let units = claim.chunk().len();
            let task = claim.task();
            match panic::catch_unwind(AssertUnwindSafe(|| transform.apply(&claim))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(task, error = %err, "Chunk transform failed, cancelling run");
                    cancel.cancel();
                    report.status = WorkerStatus::Failed(err.to_string());
                    break Some(Abort::Transform(err));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(task, panic = %message, "Chunk transform panicked, cancelling run");
                    cancel.cancel();
                    report.status = WorkerStatus::Failed("worker panicked".to_string());
                    break Some(Abort::Panic(format!("worker {} panicked on task {}: {}", id, task, message)));
                }
            }
            report.chunks += 1;
            report.units += units;
            progress.record(units);
        };

        transform.detach_worker(id);
        debug!(chunks = report.chunks, units = report.units, "Worker exiting");
        match outcome {
            Some(Abort::Transform(err)) => WorkerOutcome::TransformFailed(report, err),
            Some(Abort::Panic(reason)) => WorkerOutcome::Panicked(report, reason),
            None => WorkerOutcome::Finished(report),
        }
    }
}

enum WorkerOutcome {
    Finished(WorkerReport),
    TransformFailed(WorkerReport, TransformError),
    AttachFailed(WorkerReport, String),
    Panicked(WorkerReport, String),
}

/// Why a worker left its claim loop early
enum Abort {
    Transform(TransformError),
    Panic(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::clock::ManualClock;
    use crate::bench::partition::Claim;
    use crate::bench::progress::NullSink;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    struct CountingTransform {
        units: AtomicU64,
        tasks: Mutex<Vec<usize>>,
    }

    impl CountingTransform {
        fn new() -> Self {
            Self {
                units: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transform for CountingTransform {
        fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
            self.units.fetch_add(claim.chunk().len(), Ordering::Relaxed);
            self.tasks.lock().unwrap().push(claim.task());
            Ok(())
        }
    }

    fn quiet_options() -> PoolOptions {
        PoolOptions::default().with_elevate_priority(false)
    }

    #[test]
    fn test_pool_processes_every_unit_once() {
        for mode in [ClaimMode::Static, ClaimMode::Dynamic] {
            for workers in [1, 3, 8] {
                let transform = CountingTransform::new();
                let pool = WorkerPool::new(quiet_options().with_claim_mode(mode));
                let spec = WorkSpec::new(10_007, 16).with_workers(workers);

                let report = pool.run(&spec, &transform, &NullSink).unwrap();
                assert_eq!(report.units(), 10_007);
                assert_eq!(report.workers.len(), workers);
                assert!(report.all_workers_completed());
                assert_eq!(transform.units.load(Ordering::Relaxed), 10_007);

                let mut tasks = transform.tasks.into_inner().unwrap();
                tasks.sort_unstable();
                assert_eq!(tasks, (0..report.tasks).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_zero_units_completes_trivially() {
        let finals = Mutex::new(Vec::new());
        let sink = |f: f64| finals.lock().unwrap().push(f);
        let pool = WorkerPool::new(quiet_options());
        let report = pool
            .run(&WorkSpec::new(0, 16).with_workers(4), &CountingTransform::new(), &sink)
            .unwrap();
        assert_eq!(report.elapsed, Duration::ZERO);
        assert!(report.workers.is_empty());
        assert_eq!(*finals.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_measured_time_comes_from_clock() {
        struct Slow<'c>(&'c ManualClock);
        impl Transform for Slow<'_> {
            fn apply(&self, _claim: &Claim) -> std::result::Result<(), TransformError> {
                self.0.advance(Duration::from_millis(10));
                Ok(())
            }
        }

        let clock = ManualClock::new();
        let pool = WorkerPool::new(quiet_options().with_num_tasks(5)).with_clock(&clock);
        let report = pool
            .run(&WorkSpec::new(50, 1).with_workers(2), &Slow(&clock), &NullSink)
            .unwrap();
        assert_eq!(report.elapsed, Duration::from_millis(50));
    }

    #[test]
    fn test_transform_failure_cancels_run() {
        struct FailOnTask(usize);
        impl Transform for FailOnTask {
            fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
                if claim.task() == self.0 {
                    Err(TransformError::Other("boom".to_string()))
                } else {
                    Ok(())
                }
            }
        }

        let pool = WorkerPool::new(quiet_options());
        let err = pool
            .run(&WorkSpec::new(1000, 1).with_workers(4), &FailOnTask(3), &NullSink)
            .unwrap_err();
        assert!(matches!(err, BenchError::Transform(TransformError::Other(_))));
    }

    #[test]
    fn test_attach_failure_is_worker_fatal() {
        struct NoContext;
        impl Transform for NoContext {
            fn apply(&self, _claim: &Claim) -> std::result::Result<(), TransformError> {
                Ok(())
            }
            fn attach_worker(&self, worker: usize) -> std::result::Result<(), String> {
                if worker == 1 {
                    Err("no runtime context".to_string())
                } else {
                    Ok(())
                }
            }
        }

        let pool = WorkerPool::new(quiet_options());
        let err = pool
            .run(&WorkSpec::new(1000, 1).with_workers(2), &NoContext, &NullSink)
            .unwrap_err();
        assert!(matches!(err, BenchError::WorkerFatal(_)));
    }

    #[test]
    fn test_panicking_worker_is_worker_fatal() {
        struct Panics;
        impl Transform for Panics {
            fn apply(&self, _claim: &Claim) -> std::result::Result<(), TransformError> {
                panic!("transform panicked");
            }
        }

        let pool = WorkerPool::new(quiet_options());
        let err = pool
            .run(&WorkSpec::new(100, 1).with_workers(2), &Panics, &NullSink)
            .unwrap_err();
        assert!(matches!(err, BenchError::WorkerFatal(_)));
    }

    #[test]
    fn test_invalid_spec_is_rejected_before_spawning() {
        let pool = WorkerPool::new(quiet_options());
        let err = pool
            .run(&WorkSpec::new(100, 0).with_workers(2), &CountingTransform::new(), &NullSink)
            .unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_cancellation_flag_set_once() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.cancel());
        assert!(!flag.cancel());
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_worker_report_states() {
        let mut worker = WorkerReport::new(42);
        assert_eq!(worker.id, 42);
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert!(!worker.is_active());
        assert!(!worker.is_completed());

        worker.status = WorkerStatus::Running;
        assert!(worker.is_active());

        worker.status = WorkerStatus::Failed("test error".to_string());
        assert!(!worker.is_active());
        assert!(worker.is_completed());
    }
}
