use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use crate::accumulator::FlushTrigger;

// ─── Configuration ───────────────────────────────────────────────

/// Batch-size histogram range: 1 → 1M records
const BATCH_HIGH: u64 = 1_000_000;

/// Write-latency histogram range: 1 μs → 60 s
const LATENCY_HIGH: u64 = 60_000_000;

const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Result of one sink write, reported by the accumulator after the write
/// task finishes.
#[derive(Debug, Clone, Copy)]
pub struct FlushOutcome {
    pub trigger: FlushTrigger,
    pub records: usize,
    pub elapsed: Duration,
    pub success: bool,
}

/// Thread-safe counters and histograms describing the relay itself.
/// The accumulator writes, `/api/telemetry` reads.
pub struct FlushStats {
    inner: Mutex<Inner>,
}

/// Flush counts broken down by what caused the flush.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerCounts {
    pub immediate: u64,
    pub size: u64,
    pub age: u64,
    pub drain: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlushSnapshot {
    pub records_submitted: u64,
    pub records_flushed: u64,
    pub records_dropped: u64,
    pub flushes_total: u64,
    pub flushes_failed: u64,
    pub triggers: TriggerCounts,

    pub batch_size: PercentileSet,
    pub write_latency_us: PercentileSet,

    pub uptime_secs: f64,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    records_submitted: u64,
    records_flushed: u64,
    records_dropped: u64,
    flushes_total: u64,
    flushes_failed: u64,
    triggers: TriggerCounts,

    batch_hist: Histogram<u64>,
    latency_hist: Histogram<u64>,

    started: Instant,
}

impl FlushStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record_submitted(&self) {
        self.inner.lock().records_submitted += 1;
    }

    pub fn record_flush(&self, outcome: FlushOutcome) {
        self.inner.lock().record_flush(outcome);
    }

    pub fn snapshot(&self) -> FlushSnapshot {
        self.inner.lock().snapshot()
    }
}

impl Default for FlushStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            records_submitted: 0,
            records_flushed: 0,
            records_dropped: 0,
            flushes_total: 0,
            flushes_failed: 0,
            triggers: TriggerCounts::default(),
            // Bounds are constants well inside hdrhistogram's limits.
            batch_hist: Histogram::new_with_bounds(1, BATCH_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            latency_hist: Histogram::new_with_bounds(1, LATENCY_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            started: Instant::now(),
        }
    }

    fn record_flush(&mut self, outcome: FlushOutcome) {
        let records = outcome.records as u64;

        self.flushes_total += 1;
        match outcome.trigger {
            FlushTrigger::Immediate => self.triggers.immediate += 1,
            FlushTrigger::Size => self.triggers.size += 1,
            FlushTrigger::Age => self.triggers.age += 1,
            FlushTrigger::Drain => self.triggers.drain += 1,
        }

        if outcome.success {
            self.records_flushed += records;
        } else {
            self.flushes_failed += 1;
            self.records_dropped += records;
        }

        // Clamp to the histogram ranges; out-of-range samples are not worth an error.
        let _ = self.batch_hist.record(records.clamp(1, BATCH_HIGH));
        let us = u64::try_from(outcome.elapsed.as_micros()).unwrap_or(u64::MAX);
        let _ = self.latency_hist.record(us.clamp(1, LATENCY_HIGH));
    }

    fn snapshot(&self) -> FlushSnapshot {
        FlushSnapshot {
            records_submitted: self.records_submitted,
            records_flushed: self.records_flushed,
            records_dropped: self.records_dropped,
            flushes_total: self.flushes_total,
            flushes_failed: self.flushes_failed,
            triggers: self.triggers.clone(),
            batch_size: PercentileSet::from_histogram(&self.batch_hist),
            write_latency_us: PercentileSet::from_histogram(&self.latency_hist),
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(trigger: FlushTrigger, records: usize, success: bool) -> FlushOutcome {
        FlushOutcome {
            trigger,
            records,
            elapsed: Duration::from_micros(250),
            success,
        }
    }

    #[test]
    fn empty_snapshot_is_zeroed() {
        let snap = FlushStats::new().snapshot();
        assert_eq!(snap.flushes_total, 0);
        assert_eq!(snap.batch_size, PercentileSet::default());
    }

    #[test]
    fn failed_flush_counts_dropped_records() {
        let stats = FlushStats::new();
        stats.record_flush(outcome(FlushTrigger::Size, 10, true));
        stats.record_flush(outcome(FlushTrigger::Age, 4, false));

        let snap = stats.snapshot();
        assert_eq!(snap.flushes_total, 2);
        assert_eq!(snap.flushes_failed, 1);
        assert_eq!(snap.records_flushed, 10);
        assert_eq!(snap.records_dropped, 4);
        assert_eq!(snap.triggers.size, 1);
        assert_eq!(snap.triggers.age, 1);
        assert_eq!(snap.batch_size.max, 10);
        assert_eq!(snap.batch_size.min, 4);
    }

    #[test]
    fn submissions_are_counted() {
        let stats = FlushStats::new();
        for _ in 0..3 {
            stats.record_submitted();
        }
        assert_eq!(stats.snapshot().records_submitted, 3);
    }
}
