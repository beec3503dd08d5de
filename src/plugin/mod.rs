/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Plugin system for dnsflow
//!
//! Provides a capability-based plugin architecture:
//! - Executor plugins run as chain steps on a per-query context
//! - Server plugins are listeners attached to the process lifecycle
//! - Any plugin may additionally expose a [`Closer`] for shutdown
//!
//! Plugins are built by type-named factories, either from a structured
//! config entry or from a compact quick-setup directive.

use crate::config::types::{Config, PluginConfig};
use crate::core::error::{DnsError, Result};
use crate::core::lifecycle::Lifecycle;
use crate::plugin::executor::Executor;
use crate::plugin::executor::debug_print::DebugPrintFactory;
use crate::plugin::executor::drop_resp::DropRespFactory;
use crate::plugin::executor::query_summary::QuerySummaryFactory;
use crate::plugin::executor::sequence::SequenceFactory;
use crate::plugin::executor::sleep::SleepFactory;
use crate::plugin::server::Server;
use crate::plugin::server::udp::UdpServerFactory;
use async_trait::async_trait;
use serde_yml::Value;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tracing::info;

pub mod executor;
pub mod registry;
pub mod server;

pub use registry::PluginRegistry;

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Debug + Send + Sync + 'static {
    /// Get the plugin's unique tag
    fn tag(&self) -> &str;

    /// Initialize the plugin (called once, right after construction)
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Closing capability, `None` when the plugin is inert at shutdown
    fn as_closer(&self) -> Option<&dyn Closer> {
        None
    }
}

/// Optional shutdown capability
#[async_trait]
pub trait Closer: Send + Sync {
    async fn close(&self) -> Result<()>;
}

/// Plugin category
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PluginType {
    Executor,
    Server,
}

impl Display for PluginType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginType::Executor => write!(f, "Executor"),
            PluginType::Server => write!(f, "Server"),
        }
    }
}

/// A freshly constructed plugin that has not run `init` yet
#[derive(Debug)]
pub enum UninitializedPlugin {
    Executor(Box<dyn Executor>),
    Server(Box<dyn Server>),
}

impl UninitializedPlugin {
    /// Run `init` and freeze the plugin behind an `Arc`
    pub async fn init_and_wrap(self) -> Result<PluginHolder> {
        match self {
            UninitializedPlugin::Executor(mut plugin) => {
                plugin.init().await?;
                Ok(PluginHolder::Executor(Arc::from(plugin)))
            }
            UninitializedPlugin::Server(mut plugin) => {
                plugin.init().await?;
                Ok(PluginHolder::Server(Arc::from(plugin)))
            }
        }
    }
}

/// An initialized, shareable plugin
#[derive(Debug, Clone)]
pub enum PluginHolder {
    Executor(Arc<dyn Executor>),
    Server(Arc<dyn Server>),
}

impl PluginHolder {
    pub fn tag(&self) -> &str {
        match self {
            PluginHolder::Executor(plugin) => plugin.tag(),
            PluginHolder::Server(plugin) => plugin.tag(),
        }
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            PluginHolder::Executor(_) => PluginType::Executor,
            PluginHolder::Server(_) => PluginType::Server,
        }
    }

    pub fn to_executor(&self) -> Option<Arc<dyn Executor>> {
        match self {
            PluginHolder::Executor(plugin) => Some(plugin.clone()),
            PluginHolder::Server(_) => None,
        }
    }

    pub fn as_closer(&self) -> Option<&dyn Closer> {
        match self {
            PluginHolder::Executor(plugin) => plugin.as_closer(),
            PluginHolder::Server(plugin) => plugin.as_closer(),
        }
    }
}

/// Registry entry: tag, type name and the plugin instance
#[derive(Debug)]
pub struct PluginInfo {
    /// Plugin instance tag (unique identifier)
    pub tag: String,

    /// Factory type name this plugin was built from
    pub type_name: String,

    /// Plugin category
    pub plugin_type: PluginType,

    /// Plugin-specific configuration arguments
    pub args: Option<Value>,

    /// The actual plugin implementation
    pub plugin_holder: PluginHolder,
}

impl PluginInfo {
    pub fn to_executor(&self) -> Option<Arc<dyn Executor>> {
        self.plugin_holder.to_executor()
    }
}

/// Plugin factory trait for creating plugin instances
///
/// `registry` is a read-only view of every plugin loaded so far, so a
/// factory can resolve references to previously declared tags.
#[async_trait]
pub trait PluginFactory: Debug + Send + Sync + 'static {
    /// Create a new plugin instance from a structured config entry
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin>;

    /// Create a new plugin instance from a quick-setup directive parameter
    async fn quick_setup(
        &self,
        tag: &str,
        _param: Option<String>,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        Err(DnsError::plugin(format!(
            "plugin {} does not support quick setup",
            tag
        )))
    }
}

/// Built-in plugin loaded before any user declaration
#[derive(Debug, Clone, Copy)]
pub struct PresetPlugin {
    pub tag: &'static str,
    pub plugin_type: &'static str,
    pub param: Option<&'static str>,
}

/// Presets live in the same tag namespace as user plugins
pub const PRESET_PLUGINS: &[PresetPlugin] = &[
    PresetPlugin {
        tag: "_drop_resp",
        plugin_type: "drop_resp",
        param: None,
    },
    PresetPlugin {
        tag: "_query_summary",
        plugin_type: "query_summary",
        param: None,
    },
    PresetPlugin {
        tag: "_debug_print",
        plugin_type: "debug_print",
        param: None,
    },
];

/// Every factory shipped with dnsflow, keyed by type name
pub fn default_factories() -> Vec<(&'static str, Arc<dyn PluginFactory>)> {
    vec![
        ("sequence", Arc::new(SequenceFactory) as Arc<dyn PluginFactory>),
        ("query_summary", Arc::new(QuerySummaryFactory) as Arc<dyn PluginFactory>),
        ("debug_print", Arc::new(DebugPrintFactory) as Arc<dyn PluginFactory>),
        ("drop_resp", Arc::new(DropRespFactory) as Arc<dyn PluginFactory>),
        ("sleep", Arc::new(SleepFactory) as Arc<dyn PluginFactory>),
        ("udp_server", Arc::new(UdpServerFactory) as Arc<dyn PluginFactory>),
    ]
}

/// Build the process plugin registry
///
/// Presets are loaded first, then the configured plugins in declaration
/// order. Construction stops at the first failure.
pub async fn init(config: Config, lifecycle: Lifecycle) -> Result<Arc<PluginRegistry>> {
    info!(
        "Starting plugin initialization ({} plugins)",
        config.plugins.len()
    );

    let mut registry = PluginRegistry::with_default_factories(lifecycle);
    registry.load_presets(PRESET_PLUGINS).await?;
    registry.load_plugins(config.plugins).await?;
    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_loads_presets_and_plugins() {
        let config = crate::config::parse(
            "plugins:\n  - tag: main\n    type: sequence\n    args:\n      - $_query_summary\n      - accept\n",
        )
        .unwrap();

        let registry = init(config, Lifecycle::new()).await.unwrap();
        for preset in PRESET_PLUGINS {
            assert!(registry.get_plugin(preset.tag).is_some());
        }
        assert!(registry.get_executor("main").is_some());
        assert_eq!(registry.plugin_count(), PRESET_PLUGINS.len() + 1);
    }

    #[tokio::test]
    async fn test_init_rejects_user_tag_colliding_with_preset() {
        let config =
            crate::config::parse("plugins:\n  - tag: _drop_resp\n    type: drop_resp\n").unwrap();

        let err = init(config, Lifecycle::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DnsError::DuplicateTag { index: 0, ref tag } if tag == "_drop_resp"
        ));
    }
}
