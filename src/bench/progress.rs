//! Progress aggregation and reporting
//!
//! Workers add completed units to one atomic counter. Emission to the sink
//! is throttled to integer-percent changes (or a chunk-count interval) and
//! serialized by a non-blocking guard, so the sink sees a non-decreasing
//! sequence of fractions without any worker ever waiting on a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receiver of progress fractions in `[0, 1]`
///
/// Called from worker threads; calls are serialized by the aggregator.
pub trait ProgressSink: Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _fraction: f64) {}
}

/// Forwards progress over a tokio channel to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<f64>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, fraction: f64) {
        // Receiver gone means nobody is watching; the run carries on
        let _ = self.tx.send(fraction);
    }
}

/// Maps `[0, 1]` onto a sub-range of another sink
///
/// Used to spread several consecutive pool runs over one progress bar.
pub struct ScaledSink<'a> {
    inner: &'a dyn ProgressSink,
    offset: f64,
    span: f64,
}

impl<'a> ScaledSink<'a> {
    /// Sink for step `index` of `steps` equal steps
    pub fn step(inner: &'a dyn ProgressSink, index: usize, steps: usize) -> Self {
        let steps = steps.max(1) as f64;
        Self {
            inner,
            offset: index as f64 / steps,
            span: 1.0 / steps,
        }
    }
}

impl ProgressSink for ScaledSink<'_> {
    fn report(&self, fraction: f64) {
        self.inner
            .report((self.offset + self.span * fraction).clamp(0.0, 1.0));
    }
}

/// Memory ordering of the completed-units counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressOrdering {
    /// Eventually consistent counter; cheapest under contention
    #[default]
    Relaxed,
    /// Sequentially consistent counter updates and reads
    SeqCst,
}

impl ProgressOrdering {
    fn add_ordering(self) -> Ordering {
        match self {
            ProgressOrdering::Relaxed => Ordering::Relaxed,
            ProgressOrdering::SeqCst => Ordering::SeqCst,
        }
    }

    fn load_ordering(self) -> Ordering {
        match self {
            ProgressOrdering::Relaxed => Ordering::Relaxed,
            ProgressOrdering::SeqCst => Ordering::SeqCst,
        }
    }
}

/// Throttling and ordering policy for a [`ProgressAggregator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressOptions {
    pub ordering: ProgressOrdering,
    /// Also emit after this many completed chunks, even without a percent change
    pub chunk_interval: Option<u64>,
}

/// Lock-free completed-units counter feeding a throttled sink
pub struct ProgressAggregator<'a> {
    total: u64,
    completed: AtomicU64,
    chunks: AtomicU64,
    options: ProgressOptions,
    sink: &'a dyn ProgressSink,
    emitting: AtomicBool,
    last_percent: AtomicU64,
    last_chunks: AtomicU64,
    last_completed: AtomicU64,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(total: u64, options: ProgressOptions, sink: &'a dyn ProgressSink) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            options,
            sink,
            emitting: AtomicBool::new(false),
            last_percent: AtomicU64::new(0),
            last_chunks: AtomicU64::new(0),
            last_completed: AtomicU64::new(0),
        }
    }

    /// Record one finished chunk of `units` units
    pub fn record(&self, units: u64) {
        let ordering = self.options.ordering.add_ordering();
        self.completed.fetch_add(units, ordering);
        self.chunks.fetch_add(1, ordering);
        self.try_emit();
    }

    /// Units completed so far
    pub fn completed(&self) -> u64 {
        self.completed.load(self.options.ordering.load_ordering())
    }

    /// Completed fraction, clamped to `[0, 1]`
    pub fn fraction(&self) -> f64 {
        fraction_of(self.completed(), self.total)
    }

    /// Emit the mandatory final `1.0`
    pub fn finish(&self) {
        self.sink.report(1.0);
    }

    fn try_emit(&self) {
        // Whoever loses the race skips this emission instead of waiting
        if self
            .emitting
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let ordering = self.options.ordering.load_ordering();
        let completed = self.completed.load(ordering).min(self.total);
        let chunks = self.chunks.load(ordering);

        let percent = percent_of(completed, self.total);
        let last_completed = self.last_completed.load(Ordering::Relaxed);
        let percent_changed = percent > self.last_percent.load(Ordering::Relaxed);
        let interval_crossed = match self.options.chunk_interval {
            Some(interval) if interval > 0 => {
                chunks.saturating_sub(self.last_chunks.load(Ordering::Relaxed)) >= interval
            }
            _ => false,
        };

        if (percent_changed || interval_crossed) && completed >= last_completed {
            self.last_percent.store(percent, Ordering::Relaxed);
            self.last_chunks.store(chunks, Ordering::Relaxed);
            self.last_completed.store(completed, Ordering::Relaxed);
            self.sink.report(fraction_of(completed, self.total));
        }

        self.emitting.store(false, Ordering::Release);
    }
}

fn fraction_of(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (completed as f64 / total as f64).clamp(0.0, 1.0)
}

fn percent_of(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    ((completed as u128 * 100) / total as u128) as u64
}
