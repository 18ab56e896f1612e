use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::accumulator::{Accumulator, FlushPolicy};
use crate::metrics::FlushStats;
use crate::record::Record;
use crate::sink::Sink;

/// Handle shared by the timing middleware and the telemetry endpoints.
///
/// Without an accumulator it is a null object: requests pass straight
/// through and no record is ever built.
#[derive(Clone)]
pub struct Instrumentation {
    accumulator: Option<Accumulator>,
    stats: Arc<FlushStats>,
}

impl Instrumentation {
    pub fn disabled() -> Self {
        Self {
            accumulator: None,
            stats: Arc::new(FlushStats::new()),
        }
    }

    /// `None` for the sink yields a disabled instance whatever the policy.
    /// Only a buffering policy without a sink is logged as a warning.
    pub fn new(policy: FlushPolicy, sink: Option<Arc<dyn Sink>>) -> Self {
        match sink {
            Some(sink) => Self::from_accumulator(Accumulator::new(policy, sink)),
            None if policy.is_synchronous() => {
                tracing::info!("telemetry disabled, requests will not be recorded");
                Self::disabled()
            }
            None => {
                tracing::warn!(
                    max_count = policy.max_count,
                    "buffering policy set but no telemetry sink configured, requests will not be recorded"
                );
                Self::disabled()
            }
        }
    }

    pub fn from_accumulator(accumulator: Accumulator) -> Self {
        let stats = accumulator.stats();
        Self {
            accumulator: Some(accumulator),
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.accumulator.is_some()
    }

    pub fn accumulator(&self) -> Option<&Accumulator> {
        self.accumulator.as_ref()
    }

    pub fn stats(&self) -> Arc<FlushStats> {
        self.stats.clone()
    }

    /// Runs `work` once and records how long it took.
    ///
    /// For work units that are not axum requests (jobs, RPC calls, ...).
    /// `status_of` maps the output to a status code for the record. The
    /// output is returned untouched.
    pub async fn observe<F, T>(
        &self,
        method: &str,
        url: &str,
        work: F,
        status_of: impl FnOnce(&T) -> u16,
    ) -> T
    where
        F: Future<Output = T>,
    {
        let Some(acc) = &self.accumulator else {
            return work.await;
        };

        let start = Instant::now();
        let out = work.await;
        let record = Record::new(start.elapsed(), status_of(&out), url, method);
        acc.submit(record).await;
        out
    }

    /// Flushes anything still buffered. No-op when disabled.
    pub async fn shutdown(&self) {
        if let Some(acc) = &self.accumulator {
            acc.shutdown().await;
        }
    }
}

/// Axum middleware recording one [`Record`] per request.
///
/// Install with `axum::middleware::from_fn_with_state(instrumentation, instrument)`.
/// The record is built after the inner service has produced its response,
/// and the response is returned unchanged.
pub async fn instrument(
    State(telemetry): State<Instrumentation>,
    req: Request,
    next: Next,
) -> Response {
    let Some(acc) = telemetry.accumulator() else {
        return next.run(req).await;
    };

    let method = req.method().as_str().to_owned();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    tracing::debug!(
        %status,
        %method,
        %url,
        us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "request timed"
    );

    acc.submit(Record::new(elapsed, status, url, method)).await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RelayError, Result};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::StatusCode,
        middleware as axum_mw,
        routing::{get, post},
        Router,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct CaptureSink {
        records: Mutex<Vec<Record>>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Sink for CaptureSink {
        async fn write(&self, batch: Vec<Record>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RelayError::SinkWrite("refused".into()));
            }
            self.records.lock().extend(batch);
            Ok(())
        }
    }

    fn app(telemetry: Instrumentation) -> Router {
        Router::new()
            .route("/", get(|| async { "test" }))
            .route("/items", post(|| async { StatusCode::CREATED }))
            .layer(axum_mw::from_fn_with_state(telemetry, instrument))
    }

    async fn send(app: Router, method: &str, uri: &str) -> StatusCode {
        let req = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn disabled_instrumentation_passes_requests_through() {
        let telemetry = Instrumentation::new(FlushPolicy::new(10, Default::default()), None);
        assert!(!telemetry.is_enabled());

        for _ in 0..50 {
            assert_eq!(send(app(telemetry.clone()), "GET", "/").await, StatusCode::OK);
        }
        assert_eq!(telemetry.stats().snapshot().records_submitted, 0);
    }

    /// Collects formatted log lines from a scoped subscriber.
    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_of(f: impl FnOnce()) -> String {
        let buf = LogBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let out = buf.0.lock().clone();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn intentionally_disabled_telemetry_is_not_a_warning() {
        let logs = logs_of(|| {
            assert!(!Instrumentation::new(FlushPolicy::synchronous(), None).is_enabled());
        });
        assert!(logs.contains("INFO"), "{logs}");
        assert!(!logs.contains("WARN"), "{logs}");
    }

    #[test]
    fn buffering_policy_without_sink_warns() {
        let logs = logs_of(|| {
            let policy = FlushPolicy::new(50, std::time::Duration::ZERO);
            assert!(!Instrumentation::new(policy, None).is_enabled());
        });
        assert!(logs.contains("WARN"), "{logs}");
    }

    #[tokio::test]
    async fn records_status_method_and_uri() {
        let sink = Arc::new(CaptureSink::default());
        let telemetry = Instrumentation::new(FlushPolicy::synchronous(), Some(sink.clone() as Arc<dyn Sink>));

        let status = send(app(telemetry), "POST", "/items?x=1").await;
        assert_eq!(status, StatusCode::CREATED);

        let records = sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 201);
        assert_eq!(records[0].method, "POST");
        assert_eq!(records[0].url, "/items?x=1");
    }

    #[tokio::test]
    async fn sink_failure_never_reaches_the_client() {
        let sink = Arc::new(CaptureSink {
            fail: true,
            ..CaptureSink::default()
        });
        let telemetry = Instrumentation::new(FlushPolicy::synchronous(), Some(sink.clone() as Arc<dyn Sink>));

        assert_eq!(send(app(telemetry.clone()), "GET", "/").await, StatusCode::OK);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(telemetry.stats().snapshot().flushes_failed, 1);
    }

    #[tokio::test]
    async fn observe_returns_work_output_and_records_it() {
        let sink = Arc::new(CaptureSink::default());
        let telemetry = Instrumentation::new(FlushPolicy::synchronous(), Some(sink.clone() as Arc<dyn Sink>));

        let out = telemetry
            .observe("JOB", "reindex", async { 42u32 }, |_| 200)
            .await;
        assert_eq!(out, 42);

        let records = sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "JOB");
        assert_eq!(records[0].url, "reindex");
    }
}
