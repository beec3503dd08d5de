/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! `drop_resp` executor plugin.
//!
//! Clears the current response from [`DnsContext`].

use crate::config::types::PluginConfig;
use crate::core::context::DnsContext;
use crate::core::error::Result;
use crate::plugin::executor::{ChainWalker, ExecResult, Executor};
use crate::plugin::{Plugin, PluginFactory, PluginRegistry, UninitializedPlugin};
use async_trait::async_trait;

#[derive(Debug)]
struct DropResp {
    tag: String,
}

#[async_trait]
impl Plugin for DropResp {
    fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl Executor for DropResp {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        context.set_response(None);
        next.exec_next(context).await
    }
}

#[derive(Debug, Clone)]
pub struct DropRespFactory;

#[async_trait]
impl PluginFactory for DropRespFactory {
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        Ok(UninitializedPlugin::Executor(Box::new(DropResp {
            tag: plugin_config.tag.clone(),
        })))
    }

    async fn quick_setup(
        &self,
        tag: &str,
        _param: Option<String>,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        Ok(UninitializedPlugin::Executor(Box::new(DropResp {
            tag: tag.to_string(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::Lifecycle;
    use crate::plugin::executor::sequence::chain::ChainBuilder;
    use hickory_proto::op::Message;

    #[tokio::test]
    async fn test_clears_response_and_continues() {
        let registry = PluginRegistry::with_default_factories(Lifecycle::new());
        let mut builder = ChainBuilder::new("main", &registry);
        builder.append_node("reject").await.unwrap();
        let (reject_only, _) = builder.build();

        let mut builder = ChainBuilder::new("main", &registry);
        builder.append_node("drop_resp").await.unwrap();
        builder.append_node("drop_resp").await.unwrap();
        let (chain, _) = builder.build();

        let mut context = DnsContext::new(Message::new());
        reject_only.execute(&mut context).await.unwrap();
        assert!(context.response().is_some());

        chain.execute(&mut context).await.unwrap();
        assert!(context.response().is_none());
    }
}
