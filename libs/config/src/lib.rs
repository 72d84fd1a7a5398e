//! # Center Agent Configuration
//!
//! This crate provides the configuration knobs and their defaults for the
//! center agent: report queue capacity, connect timeout, idle heartbeat
//! interval, receive limits, and the optional initial center target.
//!
//! ## Usage
//!
//! ```no_run
//! use agent_config::AgentConfig;
//!
//! let config = AgentConfig::load(Some(std::path::Path::new("config/agent.toml")), None)?;
//! assert!(config.queue_size > 0);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod agent_config;
pub mod defaults;

// Re-export commonly used types
pub use agent_config::{load_config, AgentConfig, CenterSettings};
