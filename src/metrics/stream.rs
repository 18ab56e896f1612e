//! HTTP exposure of [`FlushStats`](super::FlushStats): a one-shot JSON
//! endpoint and a Server-Sent Events feed for dashboards that keep a
//! connection open.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use super::collector::FlushSnapshot;
use super::FlushStats;
use crate::AppState;

const PUSH_EVERY: Duration = Duration::from_millis(500);
const KEEP_ALIVE_EVERY: Duration = Duration::from_secs(15);

/// Serializes one snapshot into an SSE frame. An encoding failure yields an
/// empty frame so the feed keeps going.
fn snapshot_event(stats: &FlushStats) -> Event {
    let payload = serde_json::to_string(&stats.snapshot()).unwrap_or_default();
    Event::default().event("flush_stats").data(payload)
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<FlushSnapshot> {
    Json(state.telemetry.stats().snapshot())
}

/// Pushes a `flush_stats` event every [`PUSH_EVERY`] until the client leaves.
pub async fn stats_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stats = state.telemetry.stats();
    let ticks = IntervalStream::new(tokio::time::interval(PUSH_EVERY));
    let events = ticks.map(move |_| Ok(snapshot_event(&stats)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_EVERY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::FlushTrigger;
    use crate::metrics::FlushOutcome;
    use crate::middleware::Instrumentation;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn json_endpoint_reports_current_counters() {
        let telemetry = Instrumentation::disabled();
        telemetry.stats().record_flush(FlushOutcome {
            trigger: FlushTrigger::Age,
            records: 3,
            elapsed: Duration::from_micros(40),
            success: true,
        });

        let app = Router::new()
            .route("/stats", get(get_stats))
            .with_state(Arc::new(AppState { telemetry }));
        let res = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["records_flushed"], 3);
        assert_eq!(v["triggers"]["age"], 1);
    }
}
