/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Built-in control flow steps usable inside a sequence.
//!
//! - `accept`: stop, keeping whatever response is set
//! - `reject [rcode]`: answer with `rcode` (REFUSED by default) and stop
//! - `return`: leave the current sequence and resume its caller
//! - `jump $tag`: run the target, then come back here
//! - `goto $tag`: run the target and never come back

use crate::core::context::DnsContext;
use crate::core::dns_utils::{build_response_from_request, parse_named_response_code};
use crate::core::error::{DnsError, Result};
use crate::plugin::executor::sequence::chain::{ChainWalker, resolve_executor};
use crate::plugin::executor::{ExecResult, Executor};
use crate::plugin::{Plugin, PluginRegistry};
use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use std::sync::Arc;

#[derive(Debug)]
pub struct AcceptControl;

#[async_trait]
impl Plugin for AcceptControl {
    fn tag(&self) -> &str {
        "accept"
    }
}

#[async_trait]
impl Executor for AcceptControl {
    async fn execute(&self, _context: &mut DnsContext, _next: ChainWalker) -> ExecResult {
        Ok(())
    }
}

#[derive(Debug)]
pub struct ReturnControl;

#[async_trait]
impl Plugin for ReturnControl {
    fn tag(&self) -> &str {
        "return"
    }
}

#[async_trait]
impl Executor for ReturnControl {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        next.return_to_caller(context).await
    }
}

#[derive(Debug)]
pub struct RejectControl {
    rcode: ResponseCode,
}

impl RejectControl {
    pub fn new(rcode: ResponseCode) -> Self {
        Self { rcode }
    }
}

#[async_trait]
impl Plugin for RejectControl {
    fn tag(&self) -> &str {
        "reject"
    }
}

#[async_trait]
impl Executor for RejectControl {
    async fn execute(&self, context: &mut DnsContext, _next: ChainWalker) -> ExecResult {
        let response = build_response_from_request(context.request(), self.rcode);
        context.set_response(Some(response));
        Ok(())
    }
}

#[derive(Debug)]
pub struct JumpControl {
    executor: Arc<dyn Executor>,
}

impl JumpControl {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Plugin for JumpControl {
    fn tag(&self) -> &str {
        "jump"
    }
}

#[async_trait]
impl Executor for JumpControl {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        self.executor.execute(context, next).await
    }
}

#[derive(Debug)]
pub struct GotoControl {
    executor: Arc<dyn Executor>,
}

impl GotoControl {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Plugin for GotoControl {
    fn tag(&self) -> &str {
        "goto"
    }
}

#[async_trait]
impl Executor for GotoControl {
    async fn execute(&self, context: &mut DnsContext, _next: ChainWalker) -> ExecResult {
        self.executor.execute(context, ChainWalker::terminal()).await
    }
}

/// Parse a builtin, `Ok(None)` when `expr` is not one
pub fn parse_builtin(
    expr: &str,
    registry: &PluginRegistry,
) -> Result<Option<Arc<dyn Executor>>> {
    let mut split = expr.trim().splitn(2, char::is_whitespace);
    let op = split.next().unwrap_or_default();
    let arg = split.next().map(str::trim).filter(|s| !s.is_empty());

    match op {
        "accept" => Ok(Some(Arc::new(AcceptControl))),
        "return" => Ok(Some(Arc::new(ReturnControl))),
        "reject" => Ok(Some(Arc::new(RejectControl::new(parse_reject_rcode(arg)?)))),
        "jump" => Ok(Some(Arc::new(JumpControl::new(
            resolve_jump_or_goto_executor("jump", arg, registry)?,
        )))),
        "goto" => Ok(Some(Arc::new(GotoControl::new(
            resolve_jump_or_goto_executor("goto", arg, registry)?,
        )))),
        _ => Ok(None),
    }
}

fn resolve_jump_or_goto_executor(
    op: &str,
    arg: Option<&str>,
    registry: &PluginRegistry,
) -> Result<Arc<dyn Executor>> {
    let raw =
        arg.ok_or_else(|| DnsError::plugin(format!("{} requires sequence tag argument", op)))?;
    let tag = raw.strip_prefix('$').ok_or_else(|| {
        DnsError::plugin(format!(
            "{} target must be plugin tag reference ($tag), got {}",
            op, raw
        ))
    })?;
    resolve_executor(tag, registry)
}

fn parse_reject_rcode(arg: Option<&str>) -> Result<ResponseCode> {
    let Some(rcode_raw) = arg else {
        return Ok(ResponseCode::Refused);
    };

    parse_named_response_code(rcode_raw).ok_or_else(|| {
        DnsError::plugin(format!("invalid reject rcode argument: {}", rcode_raw))
    })
}
