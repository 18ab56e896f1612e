//! Error type shared by the relay, its sinks and its config loader.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The backing write failed (backend rejected it, connection lost, ...).
    #[error("sink write failed: {0}")]
    SinkWrite(String),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
