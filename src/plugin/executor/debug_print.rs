/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! `debug_print` executor plugin.
//!
//! This plugin logs request/response objects at info level for debugging,
//! then continues the chain.

use crate::config::types::PluginConfig;
use crate::core::context::DnsContext;
use crate::core::error::{DnsError, Result};
use crate::plugin::executor::{ChainWalker, ExecResult, Executor};
use crate::plugin::{Plugin, PluginFactory, PluginRegistry, UninitializedPlugin};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

const DEFAULT_MSG: &str = "debug print";

#[derive(Debug, Clone, Deserialize, Default)]
struct DebugPrintConfig {
    /// Optional log message title.
    msg: Option<String>,
}

#[derive(Debug)]
pub struct DebugPrint {
    tag: String,
    msg: String,
}

#[async_trait]
impl Plugin for DebugPrint {
    fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl Executor for DebugPrint {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        info!(
            plugin = %self.tag,
            uqid = context.id(),
            query = ?context.request(),
            response = ?context.response(),
            "{}",
            self.msg
        );
        next.exec_next(context).await
    }
}

#[derive(Debug, Clone)]
pub struct DebugPrintFactory;

#[async_trait]
impl PluginFactory for DebugPrintFactory {
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        let msg = match plugin_config.args.clone() {
            Some(args) if args.is_string() => args.as_str().map(str::to_string),
            Some(args) => {
                serde_yml::from_value::<DebugPrintConfig>(args)
                    .map_err(|e| {
                        DnsError::plugin(format!("failed to parse debug_print config: {}", e))
                    })?
                    .msg
            }
            None => None,
        };

        Ok(UninitializedPlugin::Executor(Box::new(DebugPrint {
            tag: plugin_config.tag.clone(),
            msg: non_empty_or_default(msg),
        })))
    }

    async fn quick_setup(
        &self,
        tag: &str,
        param: Option<String>,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        Ok(UninitializedPlugin::Executor(Box::new(DebugPrint {
            tag: tag.to_string(),
            msg: non_empty_or_default(param),
        })))
    }
}

fn non_empty_or_default(msg: Option<String>) -> String {
    msg.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MSG.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::Lifecycle;
    use crate::plugin::executor::sequence::chain::tests::{Trace, entries, step};
    use crate::plugin::executor::{Chain, ChainNode};
    use hickory_proto::op::Message;
    use std::sync::Arc;

    #[test]
    fn test_default_msg() {
        assert_eq!(non_empty_or_default(None), DEFAULT_MSG);
        assert_eq!(non_empty_or_default(Some("  ".to_string())), DEFAULT_MSG);
        assert_eq!(non_empty_or_default(Some(" dump ".to_string())), "dump");
    }

    #[tokio::test]
    async fn test_continues_chain() {
        let registry = PluginRegistry::new(Lifecycle::new());
        let holder = DebugPrintFactory
            .quick_setup("main/0", None, &registry)
            .await
            .unwrap()
            .init_and_wrap()
            .await
            .unwrap();

        let trace = Trace::default();
        let chain = Arc::new(Chain::new(vec![
            ChainNode::new("main/0", holder.to_executor().unwrap()),
            step("after", &trace),
        ]));
        chain
            .execute(&mut DnsContext::new(Message::new()))
            .await
            .unwrap();
        assert_eq!(entries(&trace), vec!["after"]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_args() {
        let registry = PluginRegistry::new(Lifecycle::new());
        let config = PluginConfig {
            tag: "dbg".to_string(),
            plugin_type: "debug_print".to_string(),
            args: Some(serde_yml::from_str("msg: [1, 2]").unwrap()),
        };
        assert!(DebugPrintFactory.create(&config, &registry).await.is_err());
    }
}
