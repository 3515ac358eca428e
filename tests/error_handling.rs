use corebench::config::{BenchmarkConfig, BenchmarkKind};
use corebench::error::user_friendly_message;
use corebench::{BenchError, ClaimMode, RunResult, RunStatus, TransformError};

#[test]
fn test_every_error_maps_to_one_status() {
    let cases = [
        (BenchError::Allocation("oom".into()), RunStatus::AllocationError),
        (BenchError::Config("bad".into()), RunStatus::AllocationError),
        (
            BenchError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
            RunStatus::AllocationError,
        ),
        (
            BenchError::Transform(TransformError::Region {
                start: 0,
                end: 16,
                reason: "region already taken",
            }),
            RunStatus::TransformError,
        ),
        (BenchError::Cancelled, RunStatus::TransformError),
        (BenchError::CorrectnessMismatch("x".into()), RunStatus::CorrectnessMismatch),
        (BenchError::WorkerFatal("panic".into()), RunStatus::WorkerFatalError),
    ];
    for (err, status) in cases {
        assert_eq!(err.status(), status, "{}", err);
        let result = RunResult::from_outcome(Err(err));
        assert_eq!(result.status, status);
        assert_eq!(result.duration_ms, 0);
        assert!(result.legacy_code() < 0);
    }
}

#[test]
fn test_user_friendly_messages() {
    let msg = user_friendly_message(&BenchError::Allocation("x".into()));
    assert!(msg.contains("--size"));
    let msg = user_friendly_message(&BenchError::Config("Worker count must be greater than 0".into()));
    assert!(msg.contains("Worker count"));
    let msg = user_friendly_message(&BenchError::CorrectnessMismatch("x".into()));
    assert!(msg.contains("verification"));
}

#[test]
fn test_transform_error_display_names_the_region() {
    let err = TransformError::Region {
        start: 32,
        end: 48,
        reason: "chunk does not belong to this buffer's plan",
    };
    assert!(err.to_string().contains("32..48"));

    let io = TransformError::Io {
        offset: 4096,
        source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
    };
    assert!(io.to_string().contains("4096"));
    assert!(std::error::Error::source(&io).is_some());
}

#[test]
fn test_bad_names_are_config_errors() {
    assert!(matches!("warp-drive".parse::<BenchmarkKind>(), Err(BenchError::Config(_))));
    assert!(matches!("sometimes".parse::<ClaimMode>(), Err(BenchError::Config(_))));
    assert_eq!("RAM-READ".parse::<BenchmarkKind>().unwrap(), BenchmarkKind::RamRead);
    assert_eq!(" dynamic ".parse::<ClaimMode>().unwrap(), ClaimMode::Dynamic);
}

#[test]
fn test_invalid_config_fails_before_running() {
    let config = BenchmarkConfig::new().with_num_tasks(0);
    let result = corebench::workloads::run(BenchmarkKind::MathSingle, &config, &corebench::bench::NullSink);
    assert_eq!(result.status, RunStatus::AllocationError);
    assert_eq!(result.legacy_code(), -1);
}
