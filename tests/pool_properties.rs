use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use corebench::bench::partition::Claim;
use corebench::bench::progress::{NullSink, ProgressOptions, ProgressOrdering};
use corebench::bench::worker::PoolOptions;
use corebench::{run_benchmark, BenchError, BenchmarkRunner, Chunk, ClaimMode, RunStatus, Transform, TransformError, WorkSpec};

fn options(mode: ClaimMode, tasks: usize) -> PoolOptions {
    PoolOptions::default()
        .with_claim_mode(mode)
        .with_num_tasks(tasks)
        .with_elevate_priority(false)
}

/// Records every chunk it is handed
#[derive(Default)]
struct Recorder {
    chunks: Mutex<Vec<Chunk>>,
}

impl Transform for Recorder {
    fn apply(&self, claim: &Claim) -> Result<(), TransformError> {
        self.chunks.lock().unwrap().push(claim.chunk());
        Ok(())
    }
}

fn assert_exact_cover(mut chunks: Vec<Chunk>, total: u64, unit: u64) {
    chunks.sort_by_key(|c| c.start);
    let mut next = 0;
    for chunk in &chunks {
        assert_eq!(chunk.start, next, "gap or overlap at {}", next);
        assert!(!chunk.is_empty());
        assert_eq!(chunk.start % unit, 0, "chunk {:?} not aligned to {}", chunk, unit);
        next = chunk.end;
    }
    assert_eq!(next, total);
}

#[test]
fn test_every_unit_processed_exactly_once() {
    let cases = [
        (1_000_000u64, 16u64),
        (1_000_005, 16),
        (4096 * 37, 4096),
        (10, 1),
        (15, 16),
    ];
    for (total, unit) in cases {
        for mode in [ClaimMode::Static, ClaimMode::Dynamic] {
            for workers in [1, 2, 5, 16] {
                for tasks in [1, 3, 100] {
                    let recorder = Recorder::default();
                    let spec = WorkSpec::new(total, unit).with_workers(workers);
                    let runner = BenchmarkRunner::new(options(mode, tasks));
                    let report = runner.execute(&spec, &recorder, &NullSink).unwrap();
                    assert_eq!(report.units(), total);

                    let chunks = recorder.chunks.into_inner().unwrap();
                    assert_eq!(chunks.len(), report.tasks);
                    assert_exact_cover(chunks, total, unit);
                }
            }
        }
    }
}

#[test]
fn test_zero_units_completes_trivially() {
    let seen = Mutex::new(Vec::new());
    let sink = |fraction: f64| seen.lock().unwrap().push(fraction);
    let applied = AtomicUsize::new(0);
    let transform = |_claim: &Claim| -> Result<(), TransformError> {
        applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };

    let result = run_benchmark(&WorkSpec::new(0, 16).with_workers(8), transform, &sink, None);
    assert_eq!(result.status, RunStatus::Ok);
    assert_eq!(result.duration_ms, 0);
    assert_eq!(result.legacy_code(), 0);
    assert_eq!(applied.load(Ordering::SeqCst), 0);
    assert_eq!(seen.into_inner().unwrap(), vec![1.0]);
}

#[test]
fn test_progress_is_monotonic_and_ends_at_one() {
    for ordering in [ProgressOrdering::Relaxed, ProgressOrdering::SeqCst] {
        for mode in [ClaimMode::Static, ClaimMode::Dynamic] {
            let seen = Mutex::new(Vec::new());
            let sink = |fraction: f64| seen.lock().unwrap().push(fraction);
            let runner = BenchmarkRunner::new(options(mode, 1000).with_progress(ProgressOptions {
                ordering,
                chunk_interval: None,
            }));
            let spec = WorkSpec::new(1_000_000, 16).with_workers(8);
            runner.run(&spec, Recorder::default(), &sink).unwrap();

            let seen = seen.into_inner().unwrap();
            assert!(!seen.is_empty());
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {:?}", seen);
            assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
            assert_eq!(seen.last().copied(), Some(1.0));
            // Throttled to percent steps plus the final report
            assert!(seen.len() <= 102, "{} emissions", seen.len());
        }
    }
}

/// Slow transform that fails on one task and counts chunks started after it
struct FailOnce {
    fail_task: usize,
    failed: AtomicBool,
    started_after_failure: AtomicUsize,
    started: AtomicUsize,
}

impl Transform for FailOnce {
    fn apply(&self, claim: &Claim) -> Result<(), TransformError> {
        if self.failed.load(Ordering::SeqCst) {
            self.started_after_failure.fetch_add(1, Ordering::SeqCst);
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        if claim.task() == self.fail_task {
            self.failed.store(true, Ordering::SeqCst);
            return Err(TransformError::Other("injected failure".to_string()));
        }
        std::thread::sleep(Duration::from_millis(5));
        Ok(())
    }
}

#[test]
fn test_failure_stops_workers_promptly() {
    let workers = 4;
    let transform = FailOnce {
        fail_task: 10,
        failed: AtomicBool::new(false),
        started_after_failure: AtomicUsize::new(0),
        started: AtomicUsize::new(0),
    };
    let runner = BenchmarkRunner::new(options(ClaimMode::Dynamic, 1000));
    let spec = WorkSpec::new(1000, 1).with_workers(workers);

    let err = runner.execute(&spec, &transform, &NullSink).unwrap_err();
    assert!(matches!(err, BenchError::Transform(TransformError::Other(_))));

    // Each surviving worker claims at most one more chunk
    assert!(transform.started_after_failure.load(Ordering::SeqCst) <= workers - 1);
    assert!(transform.started.load(Ordering::SeqCst) < 1000);
}

/// Panics on one task instead of returning an error
struct PanicOnce {
    panic_task: usize,
    panicked: AtomicBool,
    started_after_panic: AtomicUsize,
}

impl Transform for PanicOnce {
    fn apply(&self, claim: &Claim) -> Result<(), TransformError> {
        if self.panicked.load(Ordering::SeqCst) {
            self.started_after_panic.fetch_add(1, Ordering::SeqCst);
        }
        if claim.task() == self.panic_task {
            self.panicked.store(true, Ordering::SeqCst);
            panic!("transform blew up on task {}", claim.task());
        }
        std::thread::sleep(Duration::from_millis(5));
        Ok(())
    }
}

#[test]
fn test_panic_stops_workers_promptly() {
    let workers = 4;
    let transform = PanicOnce {
        panic_task: 0,
        panicked: AtomicBool::new(false),
        started_after_panic: AtomicUsize::new(0),
    };
    let runner = BenchmarkRunner::new(options(ClaimMode::Dynamic, 400));
    let spec = WorkSpec::new(400, 1).with_workers(workers);

    let err = runner.execute(&spec, &transform, &NullSink).unwrap_err();
    match err {
        BenchError::WorkerFatal(reason) => assert!(reason.contains("panicked"), "{}", reason),
        other => panic!("expected a fatal worker error, got {:?}", other),
    }
    assert!(transform.started_after_panic.load(Ordering::SeqCst) <= workers - 1);

    let result = run_benchmark(&spec, transform, &NullSink, None);
    assert_eq!(result.status, RunStatus::WorkerFatalError);
    assert_eq!(result.legacy_code(), -11);
}

#[test]
fn test_failure_is_reported_with_legacy_code() {
    let transform = |claim: &Claim| -> Result<(), TransformError> {
        if claim.task() == 3 {
            Err(TransformError::PrimitiveInit("bad key".to_string()))
        } else {
            Ok(())
        }
    };
    let result = run_benchmark(&WorkSpec::new(10_000, 1).with_workers(4), transform, &NullSink, None);
    assert_eq!(result.status, RunStatus::TransformError);
    assert_eq!(result.duration_ms, 0);
    assert_eq!(result.legacy_code(), -2);
}
