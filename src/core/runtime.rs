/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Runtime configuration and command-line argument parsing

use crate::config::types::{ConfigError, is_valid_log_level};
use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

/// Core runtime container holding parsed command-line options
pub struct Runtime {
    pub options: Options,
    /// Log worker guard to ensure logs are flushed on shutdown
    pub log_guard: Option<WorkerGuard>,
}

/// Command-line options for the dnsflow server
///
/// Supports:
/// - Configuration file path (default: config.yaml)
/// - Log level override (overrides config file setting)
#[derive(Parser, Clone, Debug)]
#[clap(version, author = "Sven Shi <isvenshi@gmail.com>")]
pub struct Options {
    /// Path to configuration file
    #[clap(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log level (overrides config file): off, trace, debug, info, warn, error
    #[clap(short, long)]
    pub log_level: Option<String>,
}

impl Options {
    /// Reject a log level override the filter would misread as a target
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.log_level {
            Some(level) if !is_valid_log_level(level) => {
                Err(ConfigError::InvalidLogLevel(level.clone()))
            }
            _ => Ok(()),
        }
    }
}
