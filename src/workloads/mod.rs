//! Benchmark workloads
//!
//! Each workload owns its buffers or test file, describes its work as a
//! [`WorkSpec`](crate::WorkSpec), and verifies its output after the timed
//! phase. [`run_kind`] maps a [`BenchmarkKind`] onto the right workload.

use std::time::Duration;

use tracing::{info, info_span};

use crate::bench::progress::ProgressSink;
use crate::bench::runner::BenchmarkRunner;
use crate::config::{BenchmarkConfig, BenchmarkKind};
use crate::io::disk::TempFile;
use crate::models::RunResult;
use crate::Result;

pub mod crypto;
pub mod disk;
pub mod math;
pub mod memory;

pub use crypto::CryptoWorkload;
pub use disk::DiskWorkload;
pub use math::MathWorkload;
pub use memory::MemoryWorkload;

/// Run one benchmark kind with `config`, returning the measured duration
pub fn run_kind(kind: BenchmarkKind, config: &BenchmarkConfig, sink: &dyn ProgressSink) -> Result<Duration> {
    config.validate_for(kind)?;

    let workers = config.workers_for(kind);
    let placement = config.placement(kind);
    let runner = BenchmarkRunner::new(config.pool_options(kind)).with_placement(placement.as_ref());

    let span = info_span!("benchmark", kind = %kind, workers);
    let _enter = span.enter();
    info!("Starting benchmark");

    match kind {
        BenchmarkKind::CryptoSingle | BenchmarkKind::CryptoMulti => {
            CryptoWorkload::from_config(&config.crypto).run(&runner, workers, sink)
        }
        BenchmarkKind::MathSingle | BenchmarkKind::MathMulti => {
            MathWorkload::from_config(&config.math).run(&runner, workers, sink)
        }
        BenchmarkKind::RamWrite => MemoryWorkload::from_config(&config.memory).run_write(&runner, workers, sink),
        BenchmarkKind::RamRead => MemoryWorkload::from_config(&config.memory).run_read(&runner, workers, sink),
        BenchmarkKind::DiskSeqWrite
        | BenchmarkKind::DiskSeqRead
        | BenchmarkKind::DiskRandomWrite
        | BenchmarkKind::DiskRandomRead => {
            let workload = DiskWorkload::from_config(&config.disk);
            let mut temp = TempFile::create(&config.disk.dir, kind.name(), workload.file_size())?;
            if config.disk.keep_file {
                temp.keep_on_drop();
            }
            let file = temp.file();
            match kind {
                BenchmarkKind::DiskSeqWrite => workload.seq_write(&runner, file, workers, sink),
                BenchmarkKind::DiskSeqRead => workload.seq_read(&runner, file, workers, sink),
                BenchmarkKind::DiskRandomWrite => workload.random_write(&runner, file, workers, sink),
                _ => workload.random_read(&runner, file, workers, sink),
            }
        }
    }
}

/// Run one benchmark kind and fold the outcome into a [`RunResult`]
pub fn run(kind: BenchmarkKind, config: &BenchmarkConfig, sink: &dyn ProgressSink) -> RunResult {
    RunResult::from_outcome(run_kind(kind, config, sink))
}
