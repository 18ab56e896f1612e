//! Response-time relay.
//!
//! An axum middleware times every request and hands a [`record::Record`] to
//! an [`accumulator::Accumulator`], which writes records to a
//! [`sink::Sink`] one by one or in batches bounded by count and age.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod record;
pub mod server;
pub mod sink;

use middleware::Instrumentation;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Timing middleware handle; also the source of relay stats.
    pub telemetry: Instrumentation,
}
