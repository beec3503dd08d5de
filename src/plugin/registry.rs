/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Plugin registry for managing plugin factories and instances
//!
//! The registry is an explicitly owned object: it is filled once during
//! startup (single writer, `&mut self`) and read-only afterwards, so lookups
//! need no locking.

use crate::config::types::PluginConfig;
use crate::core::error::{DnsError, Result};
use crate::core::lifecycle::Lifecycle;
use crate::plugin::executor::Executor;
use crate::plugin::{
    PluginFactory, PluginHolder, PluginInfo, PresetPlugin, UninitializedPlugin,
    default_factories,
};
use ahash::AHashMap;
use serde_yml::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plugin registry that manages plugin factories and instances
#[derive(Debug)]
pub struct PluginRegistry {
    /// Map of plugin type names to their factory implementations
    factories: AHashMap<String, Arc<dyn PluginFactory>>,

    /// Map of plugin tags to their runtime instances
    plugins: AHashMap<String, Arc<PluginInfo>>,

    /// Initialization order of plugins (for deterministic shutdown)
    init_order: Vec<String>,

    /// Shared shutdown coordinator handed to server plugins
    lifecycle: Lifecycle,
}

impl PluginRegistry {
    /// Create a new registry without any factory
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            factories: AHashMap::new(),
            plugins: AHashMap::new(),
            init_order: Vec::new(),
            lifecycle,
        }
    }

    /// Create a registry knowing every built-in plugin type
    pub fn with_default_factories(lifecycle: Lifecycle) -> Self {
        let mut registry = Self::new(lifecycle);
        for (plugin_type, factory) in default_factories() {
            registry.register_factory(plugin_type, factory);
        }
        registry
    }

    /// Build a registry straight from initialized plugins
    ///
    /// Bypasses configuration entirely, mostly useful for tests.
    pub fn from_plugins(
        plugins: impl IntoIterator<Item = PluginHolder>,
        lifecycle: Lifecycle,
    ) -> Self {
        let mut registry = Self::new(lifecycle);
        for holder in plugins {
            let tag = holder.tag().to_string();
            registry.insert(tag, "prebuilt".to_string(), None, holder);
        }
        registry
    }

    /// Register a plugin factory
    ///
    /// # Arguments
    /// * `plugin_type` - The type name for this plugin (e.g., "sequence", "udp_server")
    /// * `factory` - The factory implementation for creating plugin instances
    pub fn register_factory(&mut self, plugin_type: &str, factory: Arc<dyn PluginFactory>) {
        self.factories.insert(plugin_type.to_string(), factory);
    }

    pub fn factory(&self, plugin_type: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.get(plugin_type).cloned()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Instantiate preset plugins through their quick-setup path
    ///
    /// Presets share the tag namespace with user plugins and must be loaded
    /// first; any collision aborts construction.
    pub async fn load_presets(&mut self, presets: &[PresetPlugin]) -> Result<()> {
        for preset in presets {
            if self.plugins.contains_key(preset.tag) {
                return Err(DnsError::DuplicatePresetTag(preset.tag.to_string()));
            }

            debug!(
                "Loading preset plugin: {} (type: {})",
                preset.tag, preset.plugin_type
            );
            self.load_preset(preset)
                .await
                .map_err(|e| DnsError::PresetInit {
                    tag: preset.tag.to_string(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    async fn load_preset(&mut self, preset: &PresetPlugin) -> Result<()> {
        let factory = self
            .factory(preset.plugin_type)
            .ok_or_else(|| DnsError::UnknownPluginType(preset.plugin_type.to_string()))?;
        let uninitialized = factory
            .quick_setup(preset.tag, preset.param.map(str::to_string), self)
            .await?;
        self.install(preset.tag, preset.plugin_type, None, uninitialized)
            .await
    }

    /// Instantiate user declared plugins in declaration order
    ///
    /// Entries with an empty tag or type are skipped. Construction is
    /// fail-fast: the first duplicate tag or factory failure is returned with
    /// its zero-based declaration index, and plugins loaded before it stay
    /// in the registry.
    pub async fn load_plugins(&mut self, configs: Vec<PluginConfig>) -> Result<()> {
        for (index, plugin_config) in configs.iter().enumerate() {
            if !plugin_config.is_enabled() {
                debug!(
                    "Skipping disabled plugin #{} (tag: '{}', type: '{}')",
                    index, plugin_config.tag, plugin_config.plugin_type
                );
                continue;
            }

            if self.plugins.contains_key(&plugin_config.tag) {
                return Err(DnsError::DuplicateTag {
                    index,
                    tag: plugin_config.tag.clone(),
                });
            }

            info!(
                "  [{}/{}] Loading plugin: {} (type: {})",
                index + 1,
                configs.len(),
                plugin_config.tag,
                plugin_config.plugin_type
            );
            debug!("Plugin config: {:?}", plugin_config);

            self.load_plugin(plugin_config)
                .await
                .map_err(|e| DnsError::PluginInit {
                    index,
                    tag: plugin_config.tag.clone(),
                    plugin_type: plugin_config.plugin_type.clone(),
                    source: Box::new(e),
                })?;
        }

        info!("All plugins are loaded");
        Ok(())
    }

    async fn load_plugin(&mut self, plugin_config: &PluginConfig) -> Result<()> {
        let factory = self
            .factory(&plugin_config.plugin_type)
            .ok_or_else(|| DnsError::UnknownPluginType(plugin_config.plugin_type.clone()))?;
        let uninitialized = factory.create(plugin_config, self).await?;
        self.install(
            &plugin_config.tag,
            &plugin_config.plugin_type,
            plugin_config.args.clone(),
            uninitialized,
        )
        .await
    }

    /// Initialize a constructed plugin, start it if it is a server, then
    /// make it visible to later lookups
    async fn install(
        &mut self,
        tag: &str,
        type_name: &str,
        args: Option<Value>,
        uninitialized: UninitializedPlugin,
    ) -> Result<()> {
        let holder = uninitialized.init_and_wrap().await?;
        if let PluginHolder::Server(server) = &holder {
            server.clone().start(&self.lifecycle)?;
        }
        self.insert(tag.to_string(), type_name.to_string(), args, holder);
        Ok(())
    }

    fn insert(&mut self, tag: String, type_name: String, args: Option<Value>, holder: PluginHolder) {
        let info = PluginInfo {
            tag: tag.clone(),
            type_name,
            plugin_type: holder.plugin_type(),
            args,
            plugin_holder: holder,
        };
        self.plugins.insert(tag.clone(), Arc::new(info));
        self.init_order.push(tag);
    }

    /// Get a plugin instance by tag
    pub fn get_plugin(&self, tag: &str) -> Option<Arc<PluginInfo>> {
        self.plugins.get(tag).cloned()
    }

    /// Get an executable plugin by tag
    ///
    /// `None` when the tag is unknown or the plugin is not executable.
    pub fn get_executor(&self, tag: &str) -> Option<Arc<dyn Executor>> {
        self.plugins.get(tag).and_then(|info| info.to_executor())
    }

    /// Get all registered plugin tags in initialization order
    pub fn plugin_tags(&self) -> Vec<String> {
        self.init_order.clone()
    }

    /// Get the number of registered plugins
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Close every closable plugin in reverse init order
    ///
    /// A close failure is logged and does not stop the remaining plugins.
    pub async fn close_plugins(&self) {
        info!("Closing plugins");

        for tag in self.init_order.iter().rev() {
            let Some(info) = self.plugins.get(tag) else {
                continue;
            };
            let Some(closer) = info.plugin_holder.as_closer() else {
                continue;
            };

            info!("closing plugin {}", tag);
            if let Err(e) = closer.close().await {
                warn!("Failed to close plugin {}: {}", tag, e);
            }
        }

        info!("All plugins closed");
    }
}
