/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Core building blocks: query context, errors, lifecycle coordination,
//! logging and command-line runtime.

use crate::config::types::LogConfig;
use crate::core::log::DnsLogFormatter;
use crate::core::runtime::{Options, Runtime};
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

pub mod context;
pub mod dns_utils;
pub mod error;
pub mod lifecycle;
mod log;
pub mod runtime;

/// Parse command-line options into a fresh runtime container
pub fn init() -> Runtime {
    Runtime {
        options: Options::parse(),
        log_guard: None,
    }
}

/// Initialize the global tracing subscriber
///
/// Logs always go to stdout; when `log.file` is set they are also written to
/// that file through a non-blocking appender. The returned guard must be
/// kept alive until exit so buffered lines get flushed.
pub fn init_log(log: LogConfig) -> WorkerGuard {
    let (file_writer, guard) = match log.file.as_deref().and_then(split_log_path) {
        Some((dir, name)) => {
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(non_blocking), guard)
        }
        None => {
            // Without a file we still hand back a guard, backed by a sink
            let (_, guard) = tracing_appender::non_blocking(std::io::sink());
            (None, guard)
        }
    };

    let console_layer = fmt::layer()
        .event_format(DnsLogFormatter::default())
        .with_writer(std::io::stdout);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .event_format(DnsLogFormatter::with_thread_names(true))
            .with_writer(writer)
            .with_ansi(false)
    });

    let filter = EnvFilter::try_new(log.level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

fn split_log_path(file: &str) -> Option<(&Path, &std::ffi::OsStr)> {
    let path = Path::new(file);
    let name = path.file_name()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path("/var/log/dnsflow.log").unwrap();
        assert_eq!(dir, Path::new("/var/log"));
        assert_eq!(name, "dnsflow.log");

        let (dir, name) = split_log_path("dnsflow.log").unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "dnsflow.log");
    }
}
