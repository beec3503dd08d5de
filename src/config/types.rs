/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Configuration structure definitions
//!
//! Defines the schema for dnsflow configuration files (YAML format).

use serde::Deserialize;
use serde_yml::Value;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Runtime worker_threads must be greater than zero")]
    ZeroWorkerThreads,
}

/// Main server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration (level, file output)
    #[serde(default)]
    pub log: LogConfig,

    /// Tokio runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// List of plugins to load and their configurations
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl Config {
    /// Validate configuration
    ///
    /// Only structural checks happen here. Entries with an empty tag or type
    /// are kept: the registry treats them as disabled. Plugin-specific
    /// arguments are validated by each PluginFactory during construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_log_level(&self.log.level) {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }

        if self.runtime.worker_threads == 0 {
            return Err(ConfigError::ZeroWorkerThreads);
        }

        Ok(())
    }
}

/// Check whether a level string is accepted by the logger
pub fn is_valid_log_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "off" | "trace" | "debug" | "info" | "warn" | "error"
    )
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level: off, trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,

    /// Optional file path for log output (in addition to console)
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> LogConfig {
        LogConfig {
            level: default_level(),
            file: None,
        }
    }
}

/// Default log level
fn default_level() -> String {
    "info".to_string()
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Number of tokio worker threads
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_worker_threads() -> usize {
    8
}

/// Plugin configuration entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginConfig {
    /// Unique identifier for this plugin instance
    #[serde(default)]
    pub tag: String,

    /// Plugin type (e.g., "udp_server", "sequence")
    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Plugin-specific arguments (parsed by plugin factory)
    pub args: Option<Value>,
}

impl PluginConfig {
    /// Entries missing a tag or a type are disabled, not erroneous
    pub fn is_enabled(&self) -> bool {
        !self.tag.is_empty() && !self.plugin_type.is_empty()
    }
}
