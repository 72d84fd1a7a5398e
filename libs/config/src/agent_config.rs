//! Agent Configuration Module
//!
//! Provides configuration loading for the center agent. Supports a plain TOML
//! file, or a layered load (TOML file + prefixed environment overrides).

use crate::defaults;
use anyhow::{ensure, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Main agent configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Report queue capacity; a full queue makes `report` wait or fail
    pub queue_size: u32,

    /// Center connect timeout, reused as the backoff after a failed connect
    pub connect_timeout_ms: u64,

    /// Idle period after which a heartbeat is queued
    pub heartbeat_interval_ms: u64,

    /// Largest inbound payload accepted before the connection is dropped
    pub max_frame_size: usize,

    /// Socket read size per receive call
    pub recv_chunk_size: usize,

    /// Initial center, may also be set at runtime
    pub center: Option<CenterSettings>,
}

/// Center target: a DNS name or a comma-separated IP list, plus the port
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CenterSettings {
    pub target: String,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            queue_size: defaults::QUEUE_SIZE,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            heartbeat_interval_ms: defaults::HEARTBEAT_INTERVAL_MS,
            max_frame_size: defaults::MAX_FRAME_SIZE,
            recv_chunk_size: defaults::RECV_CHUNK_SIZE,
            center: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment overrides
    ///
    /// Sources, lowest priority first: built-in defaults, the optional TOML
    /// file, then variables named `<PREFIX>__<FIELD>` (nested with `__`, e.g.
    /// `AGENT__CENTER__TARGET`).
    pub fn load(path: Option<&Path>, env_prefix: Option<&str>) -> Result<Self> {
        let prefix = env_prefix.unwrap_or(defaults::ENV_PREFIX);
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading agent config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        config.validate()?;
        debug!(?config, "Agent configuration loaded");
        Ok(config)
    }

    /// Expand environment variables in the center target
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(center) = &mut self.center {
            let expanded = shellexpand::env(&center.target)
                .context("Failed to expand center target")?;
            center.target = expanded.trim().to_string();
        }
        Ok(())
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.queue_size > 0, "queue_size must be greater than zero");
        ensure!(self.connect_timeout_ms > 0, "connect_timeout_ms must be greater than zero");
        ensure!(
            self.heartbeat_interval_ms > 0,
            "heartbeat_interval_ms must be greater than zero"
        );
        ensure!(self.recv_chunk_size > 0, "recv_chunk_size must be greater than zero");
        ensure!(
            self.max_frame_size <= u32::MAX as usize,
            "max_frame_size {} does not fit the 32-bit size field",
            self.max_frame_size
        );

        if let Some(center) = &self.center {
            ensure!(!center.target.trim().is_empty(), "center.target must not be empty");
            ensure!(center.port != 0, "center.port must not be zero");
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Convenience function to load configuration with the default prefix
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    AgentConfig::load(path, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_size, 100);
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert!(config.center.is_none());
    }

    #[test]
    fn test_from_file_fills_missing_fields_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");

        let config_content = r#"
queue_size = 8
heartbeat_interval_ms = 500

[center]
target = "10.0.0.1,10.0.0.2"
port = 10000
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = AgentConfig::from_file(&config_path).unwrap();

        assert_eq!(config.queue_size, 8);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.connect_timeout_ms, defaults::CONNECT_TIMEOUT_MS);
        assert_eq!(
            config.center,
            Some(CenterSettings {
                target: "10.0.0.1,10.0.0.2".to_string(),
                port: 10000,
            })
        );
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");
        fs::write(&config_path, "queue_size = 8\n").unwrap();

        std::env::set_var("AGENT_CFG_TEST__QUEUE_SIZE", "32");
        std::env::set_var("AGENT_CFG_TEST__CONNECT_TIMEOUT_MS", "750");
        let config = AgentConfig::load(Some(&config_path), Some("AGENT_CFG_TEST")).unwrap();
        std::env::remove_var("AGENT_CFG_TEST__QUEUE_SIZE");
        std::env::remove_var("AGENT_CFG_TEST__CONNECT_TIMEOUT_MS");

        assert_eq!(config.queue_size, 32);
        assert_eq!(config.connect_timeout_ms, 750);
    }

    #[test]
    fn test_center_target_env_expansion() {
        std::env::set_var("AGENT_CFG_TEST_CENTER_HOSTS", "192.168.1.10, 192.168.1.11");
        let mut config = AgentConfig {
            center: Some(CenterSettings {
                target: "${AGENT_CFG_TEST_CENTER_HOSTS}".to_string(),
                port: 9000,
            }),
            ..Default::default()
        };

        config.expand_env_vars().unwrap();
        std::env::remove_var("AGENT_CFG_TEST_CENTER_HOSTS");

        assert_eq!(config.center.unwrap().target, "192.168.1.10, 192.168.1.11");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_frame_limit_bounded_by_size_field() {
        let at_limit = AgentConfig {
            max_frame_size: u32::MAX as usize,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        // a payload limit below the header size is still a valid payload limit
        let tiny = AgentConfig {
            max_frame_size: 0,
            ..Default::default()
        };
        assert!(tiny.validate().is_ok());

        let too_large = AgentConfig {
            max_frame_size: u32::MAX as usize + 1,
            ..Default::default()
        };
        assert!(too_large.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_queue = AgentConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());

        let empty_center = AgentConfig {
            center: Some(CenterSettings {
                target: "  ".to_string(),
                port: 9000,
            }),
            ..Default::default()
        };
        assert!(empty_center.validate().is_err());

        let zero_port = AgentConfig {
            center: Some(CenterSettings {
                target: "127.0.0.1".to_string(),
                port: 0,
            }),
            ..Default::default()
        };
        assert!(zero_port.validate().is_err());
    }
}
