use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single response-time observation built by the timing middleware.
///
/// Once handed to [`Accumulator::submit`](crate::accumulator::Accumulator::submit)
/// the record belongs to the accumulator and is never touched again until it
/// reaches a sink as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Wall time of the wrapped work in microseconds
    pub duration_us: u64,
    /// HTTP status of the produced response
    pub status: u16,
    /// Request URI as received (path + query)
    pub url: String,
    /// HTTP verb, e.g. "GET"
    pub method: String,
    /// Unix epoch milliseconds at the time the record was built
    pub timestamp_ms: i64,
}

impl Record {
    pub fn new(
        elapsed: Duration,
        status: u16,
        url: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            duration_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            status,
            url: url.into(),
            method: method.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Duration truncated to whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration_us / 1_000
    }
}
