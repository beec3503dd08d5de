/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! `query_summary` executor plugin.
//!
//! Logs compact query summary after downstream execution.

use crate::config::types::PluginConfig;
use crate::core::context::DnsContext;
use crate::core::error::{DnsError, Result};
use crate::plugin::executor::{ChainWalker, ExecResult, Executor};
use crate::plugin::{Plugin, PluginFactory, PluginRegistry, UninitializedPlugin};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use tracing::field::display;

const DEFAULT_MSG: &str = "query summary";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct QuerySummaryConfig {
    msg: Option<String>,
}

#[derive(Debug)]
struct QuerySummary {
    tag: String,
    msg: String,
}

/// The single question of a request, `None` when there is not exactly one
#[derive(Debug, PartialEq, Eq)]
struct QuestionSummary {
    qname: String,
    qtype: String,
    qclass: String,
}

fn question_summary(context: &DnsContext) -> Option<QuestionSummary> {
    let queries = context.request().queries();
    if queries.len() != 1 {
        return None;
    }
    let q = &queries[0];
    Some(QuestionSummary {
        qname: q.name().to_utf8(),
        qtype: q.query_type().to_string(),
        qclass: q.query_class().to_string(),
    })
}

#[async_trait]
impl Plugin for QuerySummary {
    fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl Executor for QuerySummary {
    async fn execute(&self, context: &mut DnsContext, next: ChainWalker) -> ExecResult {
        let result = next.exec_next(context).await;

        let client = context.src_addr().map(display);
        let server = context
            .get_attr::<String>(DnsContext::ATTR_SERVER_TAG)
            .map(String::as_str);
        let rcode = context.response().map(|r| u16::from(r.response_code()));
        let elapsed_ms = context.elapsed().as_millis() as u64;
        let error = result.as_ref().err().map(ToString::to_string);

        match question_summary(context) {
            Some(q) => info!(
                uqid = context.id(),
                client,
                server,
                qname = %q.qname,
                qtype = %q.qtype,
                qclass = %q.qclass,
                rcode,
                elapsed_ms,
                error = error.as_deref(),
                "{}",
                self.msg
            ),
            None => info!(
                uqid = context.id(),
                client,
                server,
                odd_question = true,
                rcode,
                elapsed_ms,
                error = error.as_deref(),
                "{}",
                self.msg
            ),
        }

        result
    }
}

#[derive(Debug, Clone)]
pub struct QuerySummaryFactory;

#[async_trait]
impl PluginFactory for QuerySummaryFactory {
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        let msg = parse_msg(plugin_config.args.clone())?.unwrap_or_else(|| DEFAULT_MSG.to_string());

        Ok(UninitializedPlugin::Executor(Box::new(QuerySummary {
            tag: plugin_config.tag.clone(),
            msg,
        })))
    }

    async fn quick_setup(
        &self,
        tag: &str,
        param: Option<String>,
        _registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        let msg = param
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MSG.to_string());

        Ok(UninitializedPlugin::Executor(Box::new(QuerySummary {
            tag: tag.to_string(),
            msg,
        })))
    }
}

/// Accepts a bare string or `{ msg: ... }`
fn parse_msg(args: Option<serde_yml::Value>) -> Result<Option<String>> {
    let Some(args) = args else {
        return Ok(None);
    };

    let msg = match args.as_str() {
        Some(s) => Some(s.to_string()),
        None => {
            serde_yml::from_value::<QuerySummaryConfig>(args)
                .map_err(|e| {
                    DnsError::plugin(format!("failed to parse query_summary config: {}", e))
                })?
                .msg
        }
    };
    Ok(msg.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::Lifecycle;
    use crate::plugin::executor::Chain;
    use crate::plugin::executor::sequence::chain::ChainNode;
    use hickory_proto::op::{Message, Query, ResponseCode};
    use hickory_proto::rr::{Name, RecordType};
    use std::io::Write;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

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
            Err(DnsError::plugin("upstream down"))
        }
    }

    fn summary(msg: &str) -> Arc<dyn Executor> {
        Arc::new(QuerySummary {
            tag: "summary".to_string(),
            msg: msg.to_string(),
        })
    }

    fn request(name: &str) -> Message {
        let mut message = Message::new();
        message.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
        message
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn take(&self) -> String {
            let mut buf = self.0.lock().unwrap();
            String::from_utf8(std::mem::take(&mut *buf)).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (Captured, tracing::subscriber::DefaultGuard) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        (captured, tracing::subscriber::set_default(subscriber))
    }

    #[test]
    fn test_parse_msg() {
        assert_eq!(parse_msg(None).unwrap(), None);
        let value = serde_yml::from_str(" hello ").unwrap();
        assert_eq!(parse_msg(Some(value)).unwrap().as_deref(), Some("hello"));
        let value = serde_yml::from_str("msg: lookup").unwrap();
        assert_eq!(parse_msg(Some(value)).unwrap().as_deref(), Some("lookup"));
        let value = serde_yml::from_str("title: lookup").unwrap();
        assert!(parse_msg(Some(value)).is_err());
    }

    #[test]
    fn test_question_summary() {
        let context = DnsContext::new(request("example.com."));
        assert_eq!(
            question_summary(&context),
            Some(QuestionSummary {
                qname: "example.com.".to_string(),
                qtype: "A".to_string(),
                qclass: "IN".to_string(),
            })
        );

        let context = DnsContext::new(Message::new());
        assert_eq!(question_summary(&context), None);

        let mut message = request("a.example.");
        message.add_query(Query::query(Name::from_str("b.example.").unwrap(), RecordType::AAAA));
        assert_eq!(question_summary(&DnsContext::new(message)), None);
    }

    #[tokio::test]
    async fn test_returns_chain_error_unchanged() {
        let chain = Arc::new(Chain::new(vec![
            ChainNode::new("summary", summary("q")),
            ChainNode::new("fail", Arc::new(Fail)),
        ]));

        let mut context = DnsContext::new(request("example.com."));
        let err = chain.execute(&mut context).await.unwrap_err();
        assert_eq!(err.to_string(), "Plugin error: upstream down");
    }

    #[tokio::test]
    async fn test_passes_through_on_success() {
        let registry = PluginRegistry::with_default_factories(Lifecycle::new());
        let mut builder = crate::plugin::executor::sequence::chain::ChainBuilder::new("main", &registry);
        builder.append_node("query_summary custom title").await.unwrap();
        builder.append_node("reject nxdomain").await.unwrap();
        let (chain, _) = builder.build();

        let mut context = DnsContext::new(Message::new());
        chain.execute(&mut context).await.unwrap();
        assert_eq!(
            context.response().map(|r| r.response_code()),
            Some(ResponseCode::NXDomain)
        );
    }

    #[tokio::test]
    async fn test_logs_error_and_client() {
        let (captured, _guard) = capture_logs();
        let chain = Arc::new(Chain::new(vec![
            ChainNode::new("summary", summary("lookup done")),
            ChainNode::new("fail", Arc::new(Fail)),
        ]));

        let src = "192.0.2.7:5353".parse().unwrap();
        let mut context = DnsContext::with_src_addr(request("example.com."), src);
        context.set_attr(DnsContext::ATTR_SERVER_TAG, "udp_main".to_string());
        assert!(chain.execute(&mut context).await.is_err());

        let logs = captured.take();
        let line = logs
            .lines()
            .find(|l| l.contains("lookup done"))
            .expect("summary line");
        assert!(line.contains(&format!("uqid={}", context.id())));
        assert!(line.contains("client=192.0.2.7:5353"));
        assert!(line.contains("server=\"udp_main\""));
        assert!(line.contains("qname=example.com."));
        assert!(line.contains("error="));
        assert!(line.contains("upstream down"));
        assert!(!line.contains("odd_question"));
        assert!(!line.contains("rcode="));
    }

    #[tokio::test]
    async fn test_logs_odd_question_at_info() {
        let (captured, _guard) = capture_logs();
        let registry = PluginRegistry::with_default_factories(Lifecycle::new());
        let mut builder = crate::plugin::executor::sequence::chain::ChainBuilder::new("main", &registry);
        builder.append_node("query_summary").await.unwrap();
        builder.append_node("reject nxdomain").await.unwrap();
        let (chain, _) = builder.build();

        let mut context = DnsContext::new(Message::new());
        chain.execute(&mut context).await.unwrap();

        let logs = captured.take();
        let line = logs
            .lines()
            .find(|l| l.contains(DEFAULT_MSG))
            .expect("summary line");
        assert!(line.contains(" INFO "));
        assert!(line.contains("odd_question=true"));
        assert!(line.contains("rcode=3"));
        assert!(!line.contains("error="));
        assert!(!line.contains("client="));
        assert!(!line.contains("server="));
    }
}
