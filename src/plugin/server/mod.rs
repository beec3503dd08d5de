/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Listener plugins.
//!
//! A server owns a socket and turns each decoded query into a chain run on
//! its entry executor. Its receive loop is attached to the process
//! [`Lifecycle`] so shutdown can drain it.

use crate::core::context::DnsContext;
use crate::core::dns_utils::build_response_from_request;
use crate::core::error::Result;
use crate::core::lifecycle::Lifecycle;
use crate::plugin::Plugin;
use crate::plugin::executor::{ChainWalker, Executor};
use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, debug, event_enabled, warn};

pub mod udp;

pub trait Server: Plugin {
    /// Start serving, attaching the receive loop to `lifecycle`
    fn start(self: Arc<Self>, lifecycle: &Lifecycle) -> Result<()>;

    /// Bound address, `None` before `init`
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Runs queries through the entry executor of a server
#[derive(Debug)]
pub struct RequestHandle {
    pub server_tag: String,
    pub entry_executor: Arc<dyn Executor>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequestExit {
    /// The chain set a response
    Responded,
    /// The chain finished without a response, an empty reply was built
    NoResponse,
    /// The chain failed, a SERVFAIL reply was built
    Failed,
}

#[derive(Debug)]
pub struct RequestResult {
    pub response: Message,
    pub exit: RequestExit,
}

impl RequestHandle {
    pub fn new(server_tag: impl Into<String>, entry_executor: Arc<dyn Executor>) -> Self {
        Self {
            server_tag: server_tag.into(),
            entry_executor,
        }
    }

    pub async fn handle_request(&self, msg: Message, src_addr: SocketAddr) -> RequestResult {
        let mut context = DnsContext::with_src_addr(msg, src_addr);
        context.set_attr(DnsContext::ATTR_SERVER_TAG, self.server_tag.clone());

        if event_enabled!(Level::DEBUG) {
            debug!(
                "DNS request from {}, uqid: {}, queries: {:?}",
                src_addr,
                context.id(),
                context.request().queries()
            );
        }

        let exec_outcome = self
            .entry_executor
            .execute(&mut context, ChainWalker::terminal())
            .await;
        let (response, exit) = match exec_outcome {
            Ok(()) => match context.take_response() {
                Some(response) => (response, RequestExit::Responded),
                None => (
                    build_response_from_request(context.request(), ResponseCode::NoError),
                    RequestExit::NoResponse,
                ),
            },
            Err(e) => {
                warn!(
                    "Entry executor '{}' failed for source {} id {}: {}",
                    self.entry_executor.tag(),
                    src_addr,
                    context.request().id(),
                    e
                );
                (
                    build_response_from_request(context.request(), ResponseCode::ServFail),
                    RequestExit::Failed,
                )
            }
        };

        if event_enabled!(Level::DEBUG) {
            debug!(
                "Sending response to {}, uqid: {}, exit: {:?}, rcode: {}",
                src_addr,
                context.id(),
                exit,
                response.response_code()
            );
        }

        RequestResult { response, exit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DnsError;
    use crate::plugin::executor::ExecResult;
    use crate::plugin::executor::sequence::control_flow::RejectControl;
    use async_trait::async_trait;
    use hickory_proto::op::{MessageType, Query};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    #[derive(Debug)]
    struct Pass;

    #[async_trait]
    impl Plugin for Pass {
        fn tag(&self) -> &str {
            "pass"
        }
    }

    #[async_trait]
    impl Executor for Pass {
        async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
            next.exec_next(context).await
        }
    }

    #[derive(Debug)]
    struct Fail;

    #[async_trait]
    impl Plugin for Fail {
        fn tag(&self) -> &str {
            "fail"
        }
    }

    #[async_trait]
    impl Executor for Fail {
        async fn execute(&self, _context: &mut DnsContext, _next: ChainWalker) -> ExecResult {
            Err(DnsError::plugin("boom"))
        }
    }

    fn query() -> Message {
        let mut msg = Message::new();
        msg.set_id(4242);
        msg.add_query(Query::query(Name::from_str("example.com.").unwrap(), RecordType::A));
        msg
    }

    fn src() -> SocketAddr {
        "127.0.0.1:5353".parse().unwrap()
    }

    #[tokio::test]
    async fn test_response_from_chain() {
        let handle = RequestHandle::new("udp", Arc::new(RejectControl::new(ResponseCode::NXDomain)));
        let result = handle.handle_request(query(), src()).await;
        assert_eq!(result.exit, RequestExit::Responded);
        assert_eq!(result.response.response_code(), ResponseCode::NXDomain);
        assert_eq!(result.response.id(), 4242);
    }

    #[tokio::test]
    async fn test_empty_noerror_without_response() {
        let handle = RequestHandle::new("udp", Arc::new(Pass));
        let result = handle.handle_request(query(), src()).await;
        assert_eq!(result.exit, RequestExit::NoResponse);
        assert_eq!(result.response.response_code(), ResponseCode::NoError);
        assert_eq!(result.response.message_type(), MessageType::Response);
        assert!(result.response.answers().is_empty());
        assert_eq!(result.response.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_servfail_on_error() {
        let handle = RequestHandle::new("udp", Arc::new(Fail));
        let result = handle.handle_request(query(), src()).await;
        assert_eq!(result.exit, RequestExit::Failed);
        assert_eq!(result.response.response_code(), ResponseCode::ServFail);
        assert_eq!(result.response.id(), 4242);
    }
}
