use crate::constants::RATE_SMOOTHING;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cumulative counters for one scheduler, readable from any thread.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    bytes_processed: AtomicU64,
    ops: AtomicU64,
    ticks: AtomicU64,
    idle_waits: AtomicU64,
    deferrals: AtomicU64,
    entities_removed: AtomicU64,
    average_rate: Mutex<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSnapshot {
    pub bytes_processed: u64,
    pub ops: u64,
    pub ticks: u64,
    pub idle_waits: u64,
    pub deferrals: u64,
    pub entities_removed: u64,
    /// Smoothed bytes per second over recent intervals.
    pub average_rate: f64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_ops(&self, ops: usize, bytes: u64) {
        self.ops.fetch_add(ops as u64, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_idle_wait(&self) {
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferral(&self) {
        self.deferrals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self) {
        self.entities_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Closes an interval that moved `bytes` in `elapsed`.
    pub(crate) fn record_interval(&self, bytes: u64, elapsed: Duration) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        let sample = bytes as f64 / secs;
        let mut average = self.average_rate.lock();
        *average += RATE_SMOOTHING * (sample - *average);
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn average_rate(&self) -> f64 {
        *self.average_rate.lock()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            ops: self.ops.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_waits: self.idle_waits.load(Ordering::Relaxed),
            deferrals: self.deferrals.load(Ordering::Relaxed),
            entities_removed: self.entities_removed.load(Ordering::Relaxed),
            average_rate: self.average_rate(),
        }
    }
}
