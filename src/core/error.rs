/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Unified error handling module for dnsflow
//!
//! Provides a centralized error type covering configuration loading, plugin
//! construction, chain execution and lifecycle coordination.

use crate::config::types::ConfigError;
use thiserror::Error;

/// Main error type for dnsflow
///
/// Construction errors carry enough context (declaration index, tag, type)
/// to locate the offending entry in the configuration file.
#[derive(Debug, Error)]
pub enum DnsError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plugin construction or execution error
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Tokio runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// DNS wire format error raised by hickory
    #[error("DNS Hickory protocol error: {0}")]
    HickoryProtocol(#[from] hickory_proto::ProtoError),

    /// No factory registered for the plugin type
    #[error("unknown plugin type: {0}")]
    UnknownPluginType(String),

    /// A user declaration reuses a tag that is already loaded
    #[error("duplicated plugin tag #{index} {tag}")]
    DuplicateTag { index: usize, tag: String },

    /// Two presets share the same reserved tag
    #[error("duplicated preset plugin tag {0}")]
    DuplicatePresetTag(String),

    /// A user declared plugin failed to initialize
    #[error("failed to init plugin #{index} {tag} (type: {plugin_type}): {source}")]
    PluginInit {
        index: usize,
        tag: String,
        plugin_type: String,
        #[source]
        source: Box<DnsError>,
    },

    /// A preset plugin failed to initialize
    #[error("failed to init preset plugin {tag}: {source}")]
    PresetInit {
        tag: String,
        #[source]
        source: Box<DnsError>,
    },

    /// The lifecycle coordinator no longer accepts new activities
    #[error("lifecycle is closing")]
    Closing,
}

impl DnsError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DnsError::Config(msg.into())
    }

    /// Create a plugin error
    pub fn plugin<S: Into<String>>(msg: S) -> Self {
        DnsError::Plugin(msg.into())
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        DnsError::Runtime(msg.into())
    }
}

/// Allow conversion from ConfigError to DnsError
impl From<ConfigError> for DnsError {
    fn from(e: ConfigError) -> Self {
        DnsError::Config(e.to_string())
    }
}

/// Convenient type alias for Results using DnsError
pub type Result<T> = std::result::Result<T, DnsError>;
