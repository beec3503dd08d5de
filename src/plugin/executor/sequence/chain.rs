/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Chain execution engine.
//!
//! A [`Chain`] is an immutable, ordered list of executors. Running it means
//! handing step 0 a [`ChainWalker`] positioned on step 1; each step decides
//! whether to advance by calling [`ChainWalker::exec_next`].

use crate::core::context::DnsContext;
use crate::core::error::{DnsError, Result};
use crate::plugin::executor::sequence::control_flow;
use crate::plugin::executor::{ExecResult, Executor};
use crate::plugin::{PluginHolder, PluginRegistry};
use futures::future::BoxFuture;
use std::sync::{Arc, LazyLock};
use tracing::{Level, event_enabled, trace};

static EMPTY_CHAIN: LazyLock<Arc<Chain>> = LazyLock::new(|| Arc::new(Chain::default()));

#[derive(Debug)]
pub struct ChainNode {
    tag: String,
    executor: Arc<dyn Executor>,
}

impl ChainNode {
    pub fn new(tag: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        ChainNode {
            tag: tag.into(),
            executor,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Ordered chain steps, never mutated once built
#[derive(Debug, Default)]
pub struct Chain {
    nodes: Vec<ChainNode>,
}

impl Chain {
    pub fn new(nodes: Vec<ChainNode>) -> Self {
        Chain { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(ChainNode::tag)
    }

    /// Entry continuation of this chain
    pub fn walker(self: &Arc<Self>) -> ChainWalker {
        ChainWalker::new(self.clone(), None)
    }

    /// Run the chain on `context` from its first step
    pub async fn execute(self: &Arc<Self>, context: &mut DnsContext) -> ExecResult {
        self.walker().exec_next(context).await
    }
}

/// Cursor over a chain: "the rest of the chain" handed to each step
///
/// `jump_back` is the continuation to resume once this chain is exhausted,
/// which is how a nested chain returns into its caller.
#[derive(Debug, Clone)]
pub struct ChainWalker {
    chain: Arc<Chain>,
    pc: usize,
    jump_back: Option<Box<ChainWalker>>,
}

impl ChainWalker {
    pub fn new(chain: Arc<Chain>, jump_back: Option<ChainWalker>) -> Self {
        ChainWalker {
            chain,
            pc: 0,
            jump_back: jump_back.map(Box::new),
        }
    }

    /// A continuation with nothing left to run
    pub fn terminal() -> Self {
        Self::new(EMPTY_CHAIN.clone(), None)
    }

    /// True when neither this chain nor any caller has steps left
    pub fn is_exhausted(&self) -> bool {
        self.pc >= self.chain.len()
            && self
                .jump_back
                .as_ref()
                .is_none_or(|caller| caller.is_exhausted())
    }

    /// Run the next step, handing it a walker bound to the step after it
    ///
    /// Past the last step this resumes the caller's continuation if there is
    /// one, otherwise it succeeds without doing anything.
    pub fn exec_next(self, context: &mut DnsContext) -> BoxFuture<'_, ExecResult> {
        Box::pin(async move {
            if self.pc >= self.chain.len() {
                return self.return_to_caller(context).await;
            }

            let node = &self.chain.nodes[self.pc];
            let executor = node.executor.clone();
            if event_enabled!(Level::TRACE) {
                trace!(uqid = context.id(), step = %node.tag, pc = self.pc, "exec chain step");
            }

            let next = ChainWalker {
                pc: self.pc + 1,
                ..self
            };
            executor.execute(context, next).await
        })
    }

    /// Abandon the remaining steps of this chain and resume the caller
    pub fn return_to_caller(self, context: &mut DnsContext) -> BoxFuture<'_, ExecResult> {
        match self.jump_back {
            Some(caller) => caller.exec_next(context),
            None => Box::pin(std::future::ready(Ok(()))),
        }
    }
}

/// Resolves sequence rules into chain nodes
///
/// Each rule is either a `$tag` reference to a previously loaded executor, a
/// control flow builtin, or a `<type> [param]` quick-setup directive.
/// Quick-setup plugins are owned by the chain's builder, not the registry.
pub struct ChainBuilder<'a> {
    owner: String,
    registry: &'a PluginRegistry,
    nodes: Vec<ChainNode>,
    inline_plugins: Vec<PluginHolder>,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(owner: &str, registry: &'a PluginRegistry) -> Self {
        ChainBuilder {
            owner: owner.to_string(),
            registry,
            nodes: Vec::new(),
            inline_plugins: Vec::new(),
        }
    }

    pub async fn append_node(&mut self, exec: &str) -> Result<()> {
        let expr = exec.trim();
        if expr.is_empty() {
            return Err(DnsError::plugin(format!(
                "{}: rule #{} is empty",
                self.owner,
                self.nodes.len()
            )));
        }

        if let Some(tag) = expr.strip_prefix('$') {
            let executor = resolve_executor(tag, self.registry)?;
            self.nodes.push(ChainNode::new(tag, executor));
            return Ok(());
        }

        if let Some(builtin) = control_flow::parse_builtin(expr, self.registry)? {
            self.nodes.push(ChainNode::new(expr, builtin));
            return Ok(());
        }

        let (plugin_type, param) = split_directive(expr);
        let factory = self
            .registry
            .factory(plugin_type)
            .ok_or_else(|| DnsError::UnknownPluginType(plugin_type.to_string()))?;
        let tag = format!("{}/{}", self.owner, self.nodes.len());
        let holder = factory
            .quick_setup(&tag, param.map(str::to_string), self.registry)
            .await?
            .init_and_wrap()
            .await?;
        let executor = holder.to_executor().ok_or_else(|| {
            DnsError::plugin(format!(
                "{}: quick setup type {} is not executable",
                self.owner, plugin_type
            ))
        })?;

        self.nodes.push(ChainNode::new(tag, executor));
        self.inline_plugins.push(holder);
        Ok(())
    }

    /// Freeze the chain, returning it with the plugins it owns
    pub fn build(self) -> (Arc<Chain>, Vec<PluginHolder>) {
        (Arc::new(Chain::new(self.nodes)), self.inline_plugins)
    }
}

/// Look up an executor that must already be loaded
pub fn resolve_executor(tag: &str, registry: &PluginRegistry) -> Result<Arc<dyn Executor>> {
    let tag = tag.trim();
    let plugin = registry
        .get_plugin(tag)
        .ok_or_else(|| DnsError::plugin(format!("plugin does not exist for {}", tag)))?;
    plugin
        .to_executor()
        .ok_or_else(|| DnsError::plugin(format!("plugin {} is not executable", tag)))
}

/// Split `<type> [param]` on the first whitespace
fn split_directive(expr: &str) -> (&str, Option<&str>) {
    let mut split = expr.trim().splitn(2, char::is_whitespace);
    let op = split.next().unwrap_or_default();
    let arg = split.next().map(str::trim).filter(|s| !s.is_empty());
    (op, arg)
}
