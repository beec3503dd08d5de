/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! dnsflow - pluggable DNS request pipeline
//!
//! This is the main entry point, which:
//! - Loads the configuration and sets up logging
//! - Builds every configured plugin, starting the listeners
//! - Waits for a shutdown request (signal or fatal listener error)
//! - Closes plugins and drains attached activities before exiting

use dnsflow::config;
use dnsflow::config::types::Config;
use dnsflow::core;
use dnsflow::core::error::{DnsError, Result};
use dnsflow::core::lifecycle::Lifecycle;
use dnsflow::core::runtime::Runtime;
use dnsflow::plugin;
use tokio::{runtime, signal};
use tracing::{error, info, warn};

/// Application entry point
fn main() {
    let runtime = core::init();

    if let Err(e) = runtime.options.validate() {
        eprintln!("Invalid command line: {}", e);
        std::process::exit(1);
    }

    let config = match config::init(&runtime.options.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!(
                "Configuration initialization failed ({}): {}",
                runtime.options.config.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let code = match init_runtime(runtime, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };
    std::process::exit(code);
}

/// Build the multi-threaded Tokio runtime sized from the configuration
fn init_runtime(runtime: Runtime, config: Config) -> Result<i32> {
    let mut tokio_runtime = runtime::Builder::new_multi_thread();
    tokio_runtime
        .enable_all()
        .thread_name("dnsflow-worker")
        .worker_threads(config.runtime.worker_threads);
    let tokio_runtime = tokio_runtime
        .build()
        .map_err(|err| DnsError::runtime(format!("Failed to initialize Tokio runtime: {err}")))?;
    Ok(tokio_runtime.block_on(run_async_main(runtime, config)))
}

/// Main async flow, returns the process exit status
async fn run_async_main(mut runtime: Runtime, config: Config) -> i32 {
    // Override log level from command line if provided
    let mut log_config = config.log.clone();
    if let Some(level) = runtime.options.log_level.clone() {
        log_config.level = level;
    }

    // Keep the guard alive so buffered log lines get flushed on exit
    runtime.log_guard = Some(core::init_log(log_config));
    info!(
        "dnsflow initializing, configuration: {}",
        runtime.options.config.display()
    );

    let lifecycle = Lifecycle::new();
    if let Err(e) = lifecycle.attach(|done, mut close| {
        let lifecycle = lifecycle.clone();
        async move {
            tokio::select! {
                _ = close.recv() => {}
                _ = shutdown_signal() => {
                    info!("Received shutdown signal, initiating graceful shutdown");
                    lifecycle.request_close(None);
                }
            }
            done.done();
        }
    }) {
        error!("Failed to install signal handler: {}", e);
        return 1;
    }

    let registry = match plugin::init(config, lifecycle.clone()).await {
        Ok(registry) => {
            info!(
                "dnsflow started successfully ({} plugins)",
                registry.plugin_count()
            );
            registry
        }
        Err(e) => {
            error!("Plugin initialization failed: {}", e);
            // Listeners started before the failure stop on the close signal
            lifecycle.request_close(None);
            lifecycle.done();
            lifecycle.close_wait().await;
            return 1;
        }
    };

    lifecycle.wait_close_requested().await;
    lifecycle.done();
    registry.close_plugins().await;
    lifecycle.close_wait().await;

    match lifecycle.err() {
        Some(e) => {
            error!("dnsflow exited with error: {}", e);
            1
        }
        None => {
            info!("Graceful shutdown complete");
            0
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
