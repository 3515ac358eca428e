//! Floating-point math workload
//!
//! Evaluates a transcendental-heavy kernel over an iteration index range.
//! Each task stores its partial sum; partials are reduced in task order, so
//! the checksum is bit-identical for any worker count or claim order.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::info;

use crate::bench::clock::duration_ms;
use crate::bench::partition::{Claim, PartitionPlan, WorkSpec};
use crate::bench::progress::ProgressSink;
use crate::bench::runner::{BenchmarkRunner, Transform};
use crate::config::MathConfig;
use crate::{BenchError, Result, TransformError};

/// Kernel value at iteration `i`; finite and non-negative for any `i >= 0`
#[inline]
pub fn kernel(i: f64) -> f64 {
    let x = i + 1.0;
    let s = i.sin();
    let c = i.cos();
    let r = x.sqrt();
    let l = x.ln();
    let p = (s + c).abs().powf(std::f64::consts::PI);
    let f = (l * r) % (p + std::f64::consts::E);
    let h = (s * r).hypot(c * l);
    let t = (s * c) / (1.0 + x.tan().abs());
    let value = (t + l + r).abs() + (p * f + h) / (r.floor() + l.ceil() + 1.0);
    value.ln_1p()
}

/// Sum of the kernel over `[start, end)`, evaluated in index order
pub fn partial_sum(start: u64, end: u64) -> f64 {
    let mut acc = 0.0;
    for i in start..end {
        acc += kernel(i as f64);
    }
    acc
}

/// Sequential checksum using the same task boundaries as `plan`
pub fn reference_checksum(plan: &PartitionPlan) -> f64 {
    plan.chunks()
        .map(|chunk| partial_sum(chunk.start, chunk.end))
        .fold(0.0, |acc, partial| acc + partial)
}

/// Kernel evaluation over claimed index ranges
pub struct MathTransform {
    partials: Vec<OnceLock<f64>>,
    expected: Option<f64>,
}

impl MathTransform {
    pub fn new(plan: &PartitionPlan) -> Self {
        Self {
            partials: (0..plan.num_tasks()).map(|_| OnceLock::new()).collect(),
            expected: None,
        }
    }

    /// Also require the checksum to equal `expected` bit for bit
    pub fn with_expected(mut self, expected: f64) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Reduce the task partials in task order
    pub fn into_checksum(self) -> Result<f64> {
        let mut checksum = 0.0;
        for (task, partial) in self.partials.into_iter().enumerate() {
            match partial.into_inner() {
                Some(value) => checksum += value,
                None => {
                    return Err(BenchError::CorrectnessMismatch(format!(
                        "task {} was never computed",
                        task
                    )))
                }
            }
        }
        Ok(checksum)
    }
}

impl Transform for MathTransform {
    fn apply(&self, claim: &Claim) -> std::result::Result<(), TransformError> {
        let chunk = claim.chunk();
        let slot = self.partials.get(claim.task()).ok_or(TransformError::Region {
            start: chunk.start,
            end: chunk.end,
            reason: "task outside plan",
        })?;
        slot.set(partial_sum(chunk.start, chunk.end))
            .map_err(|_| TransformError::Region {
                start: chunk.start,
                end: chunk.end,
                reason: "task computed twice",
            })
    }

    fn verify(self) -> Result<()> {
        let expected = self.expected;
        let checksum = self.into_checksum()?;
        if !checksum.is_finite() {
            return Err(BenchError::CorrectnessMismatch(format!(
                "checksum is not finite: {}",
                checksum
            )));
        }
        match expected {
            Some(expected) if expected.to_bits() != checksum.to_bits() => {
                Err(BenchError::CorrectnessMismatch(format!(
                    "checksum {} != expected {}",
                    checksum, expected
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Floating-point throughput benchmark
#[derive(Debug, Clone, Copy)]
pub struct MathWorkload {
    iterations: u64,
}

impl MathWorkload {
    pub fn new(iterations: u64) -> Self {
        Self { iterations }
    }

    pub fn from_config(config: &MathConfig) -> Self {
        Self::new(config.iterations)
    }

    pub fn run(&self, runner: &BenchmarkRunner<'_>, workers: usize, sink: &dyn ProgressSink) -> Result<Duration> {
        let spec = WorkSpec::new(self.iterations, 1).with_workers(workers);
        let transform = MathTransform::new(&runner.plan(&spec));
        let elapsed = runner.run(&spec, transform, sink)?;
        info!(
            workers,
            iterations = self.iterations,
            duration_ms = duration_ms(elapsed),
            "Math benchmark complete"
        );
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::partition::{ClaimMode, Chunk};
    use crate::bench::progress::NullSink;
    use crate::bench::worker::PoolOptions;

    #[test]
    fn test_kernel_is_finite() {
        for i in (0..200_000u64).step_by(7) {
            let v = kernel(i as f64);
            assert!(v.is_finite() && v >= 0.0, "kernel({}) = {}", i, v);
        }
    }

    #[test]
    fn test_checksum_independent_of_workers_and_mode() {
        let spec = WorkSpec::new(50_000, 1);
        let plan = PartitionPlan::for_spec(&spec, 100);
        let expected = reference_checksum(&plan);

        for mode in [ClaimMode::Static, ClaimMode::Dynamic] {
            for workers in [1, 2, 7] {
                let runner = BenchmarkRunner::new(
                    PoolOptions::default()
                        .with_claim_mode(mode)
                        .with_elevate_priority(false),
                );
                let transform = MathTransform::new(&plan).with_expected(expected);
                runner
                    .run(&spec.with_workers(workers), transform, &NullSink)
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let plan = PartitionPlan::new(10, 1, 2);
        let transform = MathTransform::new(&plan);
        transform.apply(&Claim::for_test(0, Chunk::new(0, 5))).unwrap();
        assert!(transform.apply(&Claim::for_test(0, Chunk::new(0, 5))).is_err());
    }

    #[test]
    fn test_missing_task_is_mismatch() {
        let plan = PartitionPlan::new(10, 1, 2);
        let transform = MathTransform::new(&plan);
        transform.apply(&Claim::for_test(0, Chunk::new(0, 5))).unwrap();
        assert!(matches!(
            transform.verify(),
            Err(BenchError::CorrectnessMismatch(_))
        ));
    }

    #[test]
    fn test_workload_runs() {
        let runner = BenchmarkRunner::new(PoolOptions::default().with_elevate_priority(false));
        MathWorkload::new(10_000).run(&runner, 2, &NullSink).unwrap();
    }
}
