//! Coordinator configuration

use capture::CaptureConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

pub const MAX_TARGET_FPS: u32 = 240;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Capture ticks per second
    pub target_fps: u32,
    /// Compositor settle time between hiding our windows and grabbing
    pub hide_settle_delay_ms: u64,
    /// Ticks between stats log lines, 0 disables them
    pub stats_interval: u64,
    /// Backend selection and discovery
    pub capture: CaptureConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            hide_settle_delay_ms: 20,
            stats_interval: 300,
            capture: CaptureConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(ConfigError::InvalidFps(self.target_fps));
        }
        if self.hide_settle_delay() >= self.tick_period() {
            return Err(ConfigError::SettleDelayTooLong {
                delay_ms: self.hide_settle_delay_ms,
                period_ms: self.tick_period().as_millis() as u64,
            });
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn hide_settle_delay(&self) -> Duration {
        Duration::from_millis(self.hide_settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::{BackendKind, DiscoveryMode};

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.hide_settle_delay(), Duration::from_millis(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = CoordinatorConfig::from_json_str(
            r#"{
                "target_fps": 20,
                "capture": { "discovery": "background", "force_backend": "full-composite" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.target_fps, 20);
        assert_eq!(config.hide_settle_delay_ms, 20);
        assert_eq!(config.capture.discovery, DiscoveryMode::Background);
        assert_eq!(config.capture.refresh_interval, 300);
        assert_eq!(
            config.capture.force_backend,
            Some(BackendKind::FullComposite)
        );
    }

    #[test]
    fn test_rejects_fps_out_of_range() {
        for fps in [0, 241] {
            let err = CoordinatorConfig::from_json_str(&format!(r#"{{"target_fps": {}}}"#, fps))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidFps(f) if f == fps));
        }
    }

    #[test]
    fn test_rejects_settle_delay_longer_than_tick() {
        let config = CoordinatorConfig {
            target_fps: 30,
            hide_settle_delay_ms: 40,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SettleDelayTooLong { delay_ms: 40, .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = CoordinatorConfig::from_json_str("{ target_fps: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = CoordinatorConfig::from_file("/nonexistent/overlay-capture.json").unwrap_err();
        assert!(err.to_string().contains("overlay-capture.json"));
    }
}
