//! Batching accumulator.
//!
//! Records are appended to a single buffer guarded by one mutex. A batch
//! leaves the buffer in exactly one way: it is swapped out under that lock
//! (by the size check in `submit`, by the age check in the timer task, or by
//! `shutdown`) and the swapped-out `Vec` is written from its own task. A
//! trigger that arrives after another one already swapped the data out finds
//! an empty buffer and does nothing, so each accumulated batch is flushed
//! once.
//!
//! ```text
//!  submit ──lock──> push ──len >= max_count?──> take ──spawn──> Sink::write
//!                                                 ^
//!  timer (every max_age) ──lock──> non-empty && aged? ┘
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::metrics::{FlushOutcome, FlushStats};
use crate::record::Record;
use crate::sink::Sink;

// ─── Policy ──────────────────────────────────────────────────────

/// When buffered records are written out. A zero field disables that
/// trigger; both zero selects synchronous, unbuffered writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_count: usize,
    pub max_age: Duration,
}

impl FlushPolicy {
    pub fn new(max_count: usize, max_age: Duration) -> Self {
        Self { max_count, max_age }
    }

    pub fn synchronous() -> Self {
        Self::default()
    }

    pub fn is_synchronous(&self) -> bool {
        !self.size_trigger_enabled() && !self.age_trigger_enabled()
    }

    pub fn size_trigger_enabled(&self) -> bool {
        self.max_count > 0
    }

    pub fn age_trigger_enabled(&self) -> bool {
        !self.max_age.is_zero()
    }
}

/// What caused a batch to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Synchronous policy, one record per write.
    Immediate,
    Size,
    Age,
    Drain,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Size => "size",
            Self::Age => "age",
            Self::Drain => "drain",
        }
    }
}

// ─── Accumulator ─────────────────────────────────────────────────

/// Cloneable handle; every clone feeds the same buffer.
#[derive(Clone)]
pub struct Accumulator {
    shared: Arc<Shared>,
}

struct Shared {
    policy: FlushPolicy,
    sink: Arc<dyn Sink>,
    stats: Arc<FlushStats>,
    buffer: Mutex<Buffer>,
    shutdown: watch::Sender<bool>,
}

struct Buffer {
    records: Vec<Record>,
    last_flush: Instant,
    /// Set by `shutdown`; later records bypass the buffer.
    closed: bool,
}

impl Buffer {
    /// Hands the current records to the caller and starts a fresh buffer.
    fn take(&mut self, now: Instant) -> Vec<Record> {
        self.last_flush = now;
        std::mem::take(&mut self.records)
    }
}

impl Accumulator {
    /// Builds an accumulator writing to `sink`.
    ///
    /// Spawns the age-trigger task when `policy.max_age` is non-zero, so this
    /// must run inside a tokio runtime in that case.
    pub fn new(policy: FlushPolicy, sink: Arc<dyn Sink>) -> Self {
        Self::with_stats(policy, sink, Arc::new(FlushStats::new()))
    }

    pub fn with_stats(policy: FlushPolicy, sink: Arc<dyn Sink>, stats: Arc<FlushStats>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let capacity = policy.max_count.min(4_096);

        let shared = Arc::new(Shared {
            policy,
            sink,
            stats,
            buffer: Mutex::new(Buffer {
                records: Vec::with_capacity(capacity),
                last_flush: Instant::now(),
                closed: false,
            }),
            shutdown,
        });

        if policy.age_trigger_enabled() {
            tokio::spawn(age_loop(Arc::downgrade(&shared), policy.max_age, shutdown_rx));
        }

        tracing::debug!(
            max_count = policy.max_count,
            max_age_ms = u64::try_from(policy.max_age.as_millis()).unwrap_or(u64::MAX),
            sink = shared.sink.name(),
            "accumulator started"
        );

        Self { shared }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.shared.policy
    }

    pub fn stats(&self) -> Arc<FlushStats> {
        self.shared.stats.clone()
    }

    /// Number of records waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.shared.buffer.lock().records.len()
    }

    /// Takes ownership of `record`.
    ///
    /// With a synchronous policy the record is written before this returns.
    /// Otherwise it is buffered; if that fills the batch, the write is
    /// spawned and not awaited. After [`shutdown`](Self::shutdown) nothing
    /// flushes by age any more, so each record is written before this
    /// returns. Sink failures are logged, never returned.
    pub async fn submit(&self, record: Record) {
        let shared = &self.shared;
        shared.stats.record_submitted();

        if shared.policy.is_synchronous() {
            shared.write(vec![record], FlushTrigger::Immediate).await;
            return;
        }

        let flush = {
            let mut buf = shared.buffer.lock();
            if buf.closed {
                Some((vec![record], FlushTrigger::Drain))
            } else {
                buf.records.push(record);
                if shared.policy.size_trigger_enabled()
                    && buf.records.len() >= shared.policy.max_count
                {
                    Some((buf.take(Instant::now()), FlushTrigger::Size))
                } else {
                    None
                }
            }
        };

        match flush {
            Some((batch, FlushTrigger::Drain)) => shared.write(batch, FlushTrigger::Drain).await,
            Some((batch, trigger)) => shared.dispatch(batch, trigger),
            None => {}
        }
    }

    /// Stops the age trigger and writes whatever is still buffered, awaiting
    /// that final write. In-flight writes from earlier flushes are not
    /// awaited. Records submitted afterwards are written one by one.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let _ = shared.shutdown.send(true);

        let batch = {
            let mut buf = shared.buffer.lock();
            buf.closed = true;
            buf.take(Instant::now())
        };
        if !batch.is_empty() {
            shared.write(batch, FlushTrigger::Drain).await;
        }
    }
}

impl Shared {
    /// Fire-and-forget write of a swapped-out batch.
    fn dispatch(self: &Arc<Self>, batch: Vec<Record>, trigger: FlushTrigger) {
        let shared = self.clone();
        tokio::spawn(async move {
            shared.write(batch, trigger).await;
        });
    }

    async fn write(&self, batch: Vec<Record>, trigger: FlushTrigger) {
        let records = batch.len();
        let start = Instant::now();
        let result = self.sink.write(batch).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::trace!(
                trigger = trigger.as_str(),
                records,
                elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                "batch written"
            ),
            Err(e) => tracing::warn!(
                trigger = trigger.as_str(),
                records,
                sink = self.sink.name(),
                error = %e,
                "sink write failed, batch dropped"
            ),
        }

        self.stats.record_flush(FlushOutcome {
            trigger,
            records,
            elapsed,
            success: result.is_ok(),
        });
    }

    /// Swaps the buffer out if it holds records older than `max_age`.
    fn take_aged(&self, now: Instant) -> Option<Vec<Record>> {
        let mut buf = self.buffer.lock();
        if buf.records.is_empty() || now.duration_since(buf.last_flush) < self.policy.max_age {
            return None;
        }
        Some(buf.take(now))
    }
}

/// One task per accumulator. Holds only a weak reference so dropping every
/// `Accumulator` handle ends the loop.
async fn age_loop(shared: Weak<Shared>, max_age: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + max_age, max_age);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            now = ticker.tick() => {
                let Some(state) = shared.upgrade() else { break };
                if let Some(batch) = state.take_aged(now) {
                    state.dispatch(batch, FlushTrigger::Age);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("age trigger stopped");
}
