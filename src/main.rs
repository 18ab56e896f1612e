use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use resp_time_relay::middleware::Instrumentation;
use resp_time_relay::sink::{RedisSink, Sink};
use resp_time_relay::{config, server, AppState};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 1. Config ────────────────────────────────────────────────
    let cfg = config::load_from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "config load failed");
        std::process::exit(1);
    });
    let listen = cfg.listen_addr().expect("validated by load");
    let policy = cfg.flush_policy();

    // ── 2. Sink (optional) ───────────────────────────────────────
    let sink: Option<Arc<dyn Sink>> = match &cfg.redis_url {
        Some(url) => {
            tracing::info!(%url, series = %cfg.series, "connecting to redis");
            match RedisSink::connect(url, cfg.series.clone(), cfg.max_list_len).await {
                Ok(sink) => Some(Arc::new(sink) as Arc<dyn Sink>),
                Err(e) => {
                    tracing::error!(error = %e, "cannot connect to redis, is redis-server running?");
                    std::process::exit(1);
                }
            }
        }
        None => None,
    };

    // ── 3. Shared state ──────────────────────────────────────────
    let telemetry = Instrumentation::new(policy, sink);
    let state = Arc::new(AppState {
        telemetry: telemetry.clone(),
    });
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .expect("failed to bind listen address");

    tracing::info!(
        %listen,
        max_count = policy.max_count,
        max_age_ms = u64::try_from(policy.max_age.as_millis()).unwrap_or(u64::MAX),
        synchronous = policy.is_synchronous(),
        enabled = telemetry.is_enabled(),
        "resp-time-relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server exited with error");

    // ── 5. Drain whatever is still buffered ──────────────────────
    telemetry.shutdown().await;
    tracing::info!("stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed, shutting down");
    }
}
