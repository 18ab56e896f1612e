use axum::{extract::Path, http::StatusCode, Json};
use serde::Serialize;
use std::time::Duration;

use super::AppError;

/// Upper bound for `/api/sleep/:ms` so a typo can't park a worker for hours.
const MAX_SLEEP_MS: u64 = 10_000;

#[derive(Debug, Serialize)]
pub struct Slept {
    pub slept_ms: u64,
}

// ─── GET / ───────────────────────────────────────────────────────

pub async fn root() -> &'static str {
    "test"
}

// ─── GET /api/status/:code ───────────────────────────────────────

pub async fn status(Path(code): Path<u16>) -> Result<StatusCode, AppError> {
    StatusCode::from_u16(code)
        .map_err(|_| AppError::BadRequest(format!("'{code}' is not a valid status code")))
}

// ─── GET /api/sleep/:ms ──────────────────────────────────────────

pub async fn sleep(Path(ms): Path<u64>) -> Result<Json<Slept>, AppError> {
    if ms > MAX_SLEEP_MS {
        return Err(AppError::BadRequest(format!(
            "ms must be at most {MAX_SLEEP_MS}"
        )));
    }
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(Json(Slept { slept_ms: ms }))
}
