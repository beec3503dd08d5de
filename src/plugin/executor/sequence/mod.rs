/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! `sequence` executor plugin.
//!
//! Assembles an ordered chain from `exec` rules. Used as a step (`$tag` or
//! `jump $tag`) a sequence runs its own chain and then resumes the caller.

pub mod chain;
pub mod control_flow;

use crate::config::types::PluginConfig;
use crate::core::context::DnsContext;
use crate::core::error::{DnsError, Result};
use crate::plugin::executor::sequence::chain::{Chain, ChainBuilder, ChainWalker};
use crate::plugin::executor::{ExecResult, Executor};
use crate::plugin::{Closer, Plugin, PluginFactory, PluginHolder, PluginRegistry, UninitializedPlugin};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    exec: String,
}

/// A rule is either a bare exec string or `{ exec: ... }`
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RuleConfig {
    Exec(String),
    Rule(Rule),
}

impl RuleConfig {
    fn exec(&self) -> &str {
        match self {
            RuleConfig::Exec(exec) => exec,
            RuleConfig::Rule(rule) => &rule.exec,
        }
    }
}

#[derive(Debug)]
pub struct Sequence {
    tag: String,
    chain: Arc<Chain>,
    /// Plugins created from quick-setup rules, owned by this sequence
    inline_plugins: Vec<PluginHolder>,
}

#[async_trait]
impl Plugin for Sequence {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn as_closer(&self) -> Option<&dyn Closer> {
        if self.inline_plugins.iter().any(|p| p.as_closer().is_some()) {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl Closer for Sequence {
    async fn close(&self) -> Result<()> {
        let mut last_err = None;
        for plugin in self.inline_plugins.iter().rev() {
            let Some(closer) = plugin.as_closer() else {
                continue;
            };
            if let Err(e) = closer.close().await {
                warn!("sequence {}: failed to close {}: {}", self.tag, plugin.tag(), e);
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Executor for Sequence {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        ChainWalker::new(self.chain.clone(), Some(next))
            .exec_next(context)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct SequenceFactory;

#[async_trait]
impl PluginFactory for SequenceFactory {
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        let rules = match plugin_config.args.clone() {
            Some(args) => serde_yml::from_value::<Vec<RuleConfig>>(args).map_err(|e| {
                DnsError::plugin(format!("Failed to parse sequence config: {}", e))
            })?,
            None => Vec::new(),
        };

        let mut builder = ChainBuilder::new(&plugin_config.tag, registry);
        for rule in &rules {
            builder.append_node(rule.exec()).await?;
        }
        let (chain, inline_plugins) = builder.build();
        debug!(
            "sequence {} built with {} node(s)",
            plugin_config.tag,
            chain.len()
        );

        Ok(UninitializedPlugin::Executor(Box::new(Sequence {
            tag: plugin_config.tag.clone(),
            chain,
            inline_plugins,
        })))
    }
}
