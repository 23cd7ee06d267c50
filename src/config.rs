//! Core configuration loading from environment variables or TOML.
//!
//! Environment values come from `CAPCORE_*` variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CAPCORE_LOG_LEVEL` | info | Tracing filter directive |
//! | `CAPCORE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `CAPCORE_LOG_PATH` | (stderr) | File to write logs to |
//! | `CAPCORE_ANALYTICS_LIFECYCLE` | true | Send lifecycle events to analytics sinks |
//! | `CAPCORE_PUBLIC_PROGRESS` | true | Send load progress events to public sinks |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventDestination;
use crate::lifecycle::LifecycleDestinations;
use crate::telemetry::{LogConfig, LogFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub log: LogConfig,
    /// Lifecycle transitions also go to analytics sinks.
    pub analytics_lifecycle: bool,
    /// Load progress goes to public sinks.
    pub public_progress: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            analytics_lifecycle: true,
            public_progress: true,
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_path: Option<PathBuf>,
    pub lifecycle_destination_bits: u8,
    pub progress_destination_bits: u8,
}

impl CoreConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Destinations used by the lifecycle tracker.
    pub fn lifecycle_destinations(&self) -> LifecycleDestinations {
        let transitions = if self.analytics_lifecycle {
            EventDestination::ALL
        } else {
            EventDestination::PUBLIC
        };
        let progress = if self.public_progress {
            EventDestination::PUBLIC
        } else {
            EventDestination::NONE
        };
        LifecycleDestinations { transitions, progress }
    }

    pub fn effective_config(&self) -> EffectiveConfig {
        let destinations = self.lifecycle_destinations();
        EffectiveConfig {
            log_level: self.log.level.clone(),
            log_format: self.log.format,
            log_path: self.log.output_path.clone(),
            lifecycle_destination_bits: destinations.transitions.bits(),
            progress_destination_bits: destinations.progress.bits(),
        }
    }
}

/// Parse a boolean env var, returning `default` on missing or invalid.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("CAPCORE_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = std::env::var("CAPCORE_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(defaults.format);
    let output_path = std::env::var("CAPCORE_LOG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> CoreConfig {
    CoreConfig {
        log: load_log_config(),
        analytics_lifecycle: parse_bool("CAPCORE_ANALYTICS_LIFECYCLE", true),
        public_progress: parse_bool("CAPCORE_PUBLIC_PROGRESS", true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "CAPCORE_LOG_LEVEL",
        "CAPCORE_LOG_FORMAT",
        "CAPCORE_LOG_PATH",
        "CAPCORE_ANALYTICS_LIFECYCLE",
        "CAPCORE_PUBLIC_PROGRESS",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg, CoreConfig::default());
        let d = cfg.lifecycle_destinations();
        assert_eq!(d.transitions, EventDestination::ALL);
        assert_eq!(d.progress, EventDestination::PUBLIC);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CAPCORE_LOG_LEVEL", "capcore=debug");
        std::env::set_var("CAPCORE_LOG_FORMAT", "pretty");
        std::env::set_var("CAPCORE_LOG_PATH", "/tmp/capcore.log");
        std::env::set_var("CAPCORE_ANALYTICS_LIFECYCLE", "false");
        let cfg = load();
        assert_eq!(cfg.log.level, "capcore=debug");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.output_path, Some(PathBuf::from("/tmp/capcore.log")));
        assert_eq!(cfg.lifecycle_destinations().transitions, EventDestination::PUBLIC);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CAPCORE_LOG_FORMAT", "xml");
        std::env::set_var("CAPCORE_ANALYTICS_LIFECYCLE", "maybe");
        std::env::set_var("CAPCORE_LOG_LEVEL", "   ");
        let cfg = load();
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.analytics_lifecycle);
        clear_env_vars();
    }

    #[test]
    fn test_from_toml() {
        let cfg = CoreConfig::from_toml_str(
            r#"
            public_progress = false

            [log]
            level = "warn"
            format = "pretty"
            "#,
        )
        .unwrap();
        assert!(cfg.analytics_lifecycle);
        assert_eq!(cfg.log.level, "warn");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.lifecycle_destinations().progress, EventDestination::NONE);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            CoreConfig::from_toml_str("log = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_effective_config_reflects_destinations() {
        let eff = CoreConfig::default().effective_config();
        assert_eq!(eff.lifecycle_destination_bits, EventDestination::ALL.bits());
        assert_eq!(eff.progress_destination_bits, EventDestination::PUBLIC.bits());
        assert_eq!(eff.log_level, "info");
    }
}
