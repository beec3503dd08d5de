/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Executable plugins and the chain execution engine.

use crate::core::context::DnsContext;
use crate::core::error::Result;
use crate::plugin::Plugin;
use async_trait::async_trait;

pub mod debug_print;
pub mod drop_resp;
pub mod query_summary;
pub mod sequence;
pub mod sleep;

pub use sequence::chain::{Chain, ChainNode, ChainWalker};

pub type ExecResult = Result<()>;

/// A chain step
///
/// `next` is the continuation bound to the following step. An executor may
/// call `next.exec_next` once (pass-through), not at all (short-circuit), or
/// run a different chain instead. Errors are returned to the caller as-is.
#[async_trait]
pub trait Executor: Plugin {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult;
}
