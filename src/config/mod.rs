//! Relay config loader (strict YAML parsing).

pub mod schema;

use std::fs;

use crate::error::{RelayError, Result};

pub use schema::{FlushConfig, RelayConfig};

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "RESP_TIME_RELAY_CONFIG";

pub fn load_from_file(path: &str) -> Result<RelayConfig> {
    let s = fs::read_to_string(path)?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RelayConfig> {
    let cfg: RelayConfig =
        serde_yaml::from_str(s).map_err(|e| RelayError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Reads the file named by [`CONFIG_ENV`], or returns the defaults when the
/// variable is unset.
pub fn load_from_env() -> Result<RelayConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => load_from_file(&path),
        Err(_) => {
            let cfg = RelayConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}
