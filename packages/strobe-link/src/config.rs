use crate::correlator::DEFAULT_TOLERANCE_SECS;
use crate::discovery::{ImagePattern, DEFAULT_IMAGE_PATTERN};
use crate::error::{ConfigError, DiscoveryError};
use crate::protocol::{DEFAULT_EXPOSURE_COMMAND, DEFAULT_EXPOSURE_PREFIX};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "192.168.2.70";
pub const DEFAULT_PORT: u16 = 9000;

/// Link and correlation settings, loaded from environment variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Controller address
    pub host: String,
    pub port: u16,
    /// Directory the capture software writes images into
    pub image_dir: PathBuf,
    /// Directory receiving the per-run correlation logs
    pub log_dir: PathBuf,
    /// Maximum |image time - exposure time| for a pair, in seconds
    pub tolerance_secs: f64,
    pub poll_interval_ms: u64,
    pub scan_interval_ms: u64,
    pub connect_timeout_ms: u64,
    /// Prefix of the device's exposure-count report line
    pub exposure_prefix: String,
    /// Command that asks the device for its exposure count
    pub exposure_command: String,
    /// Sent when a run starts; empty to send nothing
    pub start_command: String,
    /// Sent when a run stops; empty to send nothing
    pub stop_command: String,
    /// Case-insensitive regex qualifying image file names
    pub image_pattern: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            image_dir: PathBuf::from("."),
            log_dir: PathBuf::from("."),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            poll_interval_ms: 500,
            scan_interval_ms: 300,
            connect_timeout_ms: 3000,
            exposure_prefix: DEFAULT_EXPOSURE_PREFIX.to_string(),
            exposure_command: DEFAULT_EXPOSURE_COMMAND.to_string(),
            start_command: "START".to_string(),
            stop_command: "STOP".to_string(),
            image_pattern: DEFAULT_IMAGE_PATTERN.to_string(),
        }
    }
}

impl LinkConfig {
    /// Load configuration from `STROBE_*` environment variables (and `.env`),
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            host: lookup("STROBE_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "STROBE_PORT", defaults.port)?,
            image_dir: lookup("STROBE_IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_dir),
            log_dir: lookup("STROBE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            tolerance_secs: parsed(&lookup, "STROBE_TOLERANCE_SECS", defaults.tolerance_secs)?,
            poll_interval_ms: parsed(&lookup, "STROBE_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            scan_interval_ms: parsed(&lookup, "STROBE_SCAN_INTERVAL_MS", defaults.scan_interval_ms)?,
            connect_timeout_ms: parsed(
                &lookup,
                "STROBE_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout_ms,
            )?,
            exposure_prefix: lookup("STROBE_EXPOSURE_PREFIX").unwrap_or(defaults.exposure_prefix),
            exposure_command: lookup("STROBE_EXPOSURE_COMMAND").unwrap_or(defaults.exposure_command),
            start_command: lookup("STROBE_START_COMMAND").unwrap_or(defaults.start_command),
            stop_command: lookup("STROBE_STOP_COMMAND").unwrap_or(defaults.stop_command),
            image_pattern: lookup("STROBE_IMAGE_PATTERN").unwrap_or(defaults.image_pattern),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if !self.tolerance_secs.is_finite() || self.tolerance_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be a positive number of seconds, got {}",
                self.tolerance_secs
            )));
        }
        if self.poll_interval_ms == 0 || self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll and scan intervals must be non-zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        if self.exposure_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "exposure prefix must not be empty".to_string(),
            ));
        }
        self.pattern()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn pattern(&self) -> Result<ImagePattern, DiscoveryError> {
        ImagePattern::new(&self.image_pattern)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LinkConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.host, "192.168.2.70");
        assert_eq!(config.port, 9000);
        assert_eq!(config.tolerance_secs, 2.0);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.scan_interval(), Duration::from_millis(300));
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = LinkConfig::from_lookup(lookup_from(&[
            ("STROBE_HOST", "10.0.0.5"),
            ("STROBE_PORT", "9100"),
            ("STROBE_TOLERANCE_SECS", "0.75"),
            ("STROBE_IMAGE_DIR", "/captures"),
        ]))
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9100);
        assert_eq!(config.tolerance_secs, 0.75);
        assert_eq!(config.image_dir, PathBuf::from("/captures"));
    }

    #[test]
    fn test_invalid_port() {
        let err = LinkConfig::from_lookup(lookup_from(&[("STROBE_PORT", "ninety")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(LinkConfig::from_lookup(lookup_from(&[("STROBE_PORT", "0")])).is_err());
    }

    #[test]
    fn test_invalid_tolerance() {
        assert!(LinkConfig::from_lookup(lookup_from(&[("STROBE_TOLERANCE_SECS", "-1")])).is_err());
        assert!(LinkConfig::from_lookup(lookup_from(&[("STROBE_TOLERANCE_SECS", "NaN")])).is_err());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = LinkConfig::from_lookup(lookup_from(&[("STROBE_IMAGE_PATTERN", "(")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
