//! Process configuration: worker pool sizes, timeouts and the probe
//! file path, loaded from TOML.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for a Cortex process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub scan: ScanConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {path:?}: {e}")))?;
        Self::load_from_str(&contents)
    }

    /// Loads configuration from a TOML string.
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("failed to write config file {path:?}: {e}")))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "scan.connect_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.scan.connect_workers == 0 {
            return Err(Error::Config(
                "scan.connect_workers must be greater than 0".into(),
            ));
        }
        if self.scan.udp_workers == 0 {
            return Err(Error::Config(
                "scan.udp_workers must be greater than 0".into(),
            ));
        }
        if self.queue.consumer_count == 0 {
            return Err(Error::Config(
                "queue.consumer_count must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Scan timing/concurrency knobs. Defaults match the behavior described
/// in the component design: 100 workers for connect, 50 for SYN/UDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Path to the nmap-service-probes-format catalogue file.
    #[serde(default)]
    pub probe_file: Option<String>,
    #[serde(default = "default_connect_workers")]
    pub connect_workers: usize,
    #[serde(default = "default_syn_workers")]
    pub syn_workers: usize,
    #[serde(default = "default_udp_workers")]
    pub udp_workers: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_job_channel_capacity")]
    pub job_channel_capacity: usize,
}

fn default_connect_workers() -> usize {
    100
}
fn default_syn_workers() -> usize {
    50
}
fn default_udp_workers() -> usize {
    50
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_job_channel_capacity() -> usize {
    1_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_file: None,
            connect_workers: default_connect_workers(),
            syn_workers: default_syn_workers(),
            udp_workers: default_udp_workers(),
            connect_timeout_ms: default_connect_timeout_ms(),
            job_channel_capacity: default_job_channel_capacity(),
        }
    }
}

/// Task-queue driver concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of long-lived consumer loops draining the task queue.
    #[serde(default = "default_consumer_count")]
    pub consumer_count: usize,
}

fn default_consumer_count() -> usize {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            consumer_count: default_consumer_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.connect_workers, 100);
        assert_eq!(config.scan.udp_workers, 50);
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = Config::default();
        config.scan.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = Config::default();
        config.scan.connect_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let toml_str = r#"
            [scan]
            probe_file = "probes.txt"
            connect_workers = 10
            syn_workers = 5
            udp_workers = 5
            connect_timeout_ms = 2000
            job_channel_capacity = 1000

            [queue]
            consumer_count = 3
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.scan.probe_file.as_deref(), Some("probes.txt"));
        assert_eq!(config.scan.connect_workers, 10);
        assert_eq!(config.queue.consumer_count, 3);
    }

    #[test]
    fn invalid_toml_fails_validation() {
        let toml_str = r#"
            [scan]
            connect_timeout_ms = 0

            [queue]
            consumer_count = 1
        "#;
        assert!(Config::load_from_str(toml_str).is_err());
    }
}
