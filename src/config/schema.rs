use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::accumulator::FlushPolicy;
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Series name; also the Redis list key records are pushed to.
    #[serde(default = "default_series")]
    pub series: String,
    /// Absent means telemetry is disabled and requests pass straight through.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Cap on the Redis list length (newest entries kept).
    #[serde(default)]
    pub max_list_len: Option<usize>,
    #[serde(default)]
    pub flush: FlushConfig,
}

/// Both zero means every record is written on its own, synchronously.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlushConfig {
    #[serde(default)]
    pub max_count: usize,
    #[serde(default)]
    pub max_age_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}
fn default_series() -> String {
    "resp_time".into()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            series: default_series(),
            redis_url: None,
            max_list_len: None,
            flush: FlushConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if self.series.trim().is_empty() {
            return Err(RelayError::Config("series must not be empty".into()));
        }
        if matches!(&self.redis_url, Some(url) if url.trim().is_empty()) {
            return Err(RelayError::Config("redis_url must not be empty when set".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| RelayError::Config(format!("listen '{}': {e}", self.listen)))
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::new(
            self.flush.max_count,
            Duration::from_millis(self.flush.max_age_ms),
        )
    }
}
