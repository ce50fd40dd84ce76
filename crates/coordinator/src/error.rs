//! Coordinator error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("target_fps must be between 1 and 240, got {0}")]
    InvalidFps(u32),

    #[error("hide_settle_delay_ms ({delay_ms}) must be shorter than the tick period ({period_ms} ms)")]
    SettleDelayTooLong { delay_ms: u64, period_ms: u64 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
