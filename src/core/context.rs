/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! DNS request/response context management
//!
//! Provides a container for DNS queries as they flow through the plugin pipeline.
//! Each context carries the request, response, metadata, and custom attributes.

use hickory_proto::op::Message;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Process-wide query id source, wraps on overflow
static NEXT_QUERY_ID: AtomicU32 = AtomicU32::new(0);

/// Context object for a DNS request/response lifecycle
///
/// One context exists per in-flight query. It is owned by the chain run
/// processing that query and passed by mutable reference to every step,
/// so no locking is needed.
pub struct DnsContext {
    /// Unique query id
    id: u32,

    /// Creation time, used for elapsed time reporting
    start_time: Instant,

    /// Client's socket address, filled in by the transport
    src_addr: Option<SocketAddr>,

    /// DNS request message from the client
    request: Message,

    /// DNS response message (populated by plugins)
    response: Option<Message>,

    /// Custom attributes for inter-plugin and transport metadata
    attributes: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl DnsContext {
    /// Tag of the listener that received the query (`String`)
    pub const ATTR_SERVER_TAG: &'static str = "server_tag";

    pub fn new(request: Message) -> Self {
        Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            start_time: Instant::now(),
            src_addr: None,
            request,
            response: None,
            attributes: HashMap::new(),
        }
    }

    /// Create a context already bound to a client address
    pub fn with_src_addr(request: Message, src_addr: SocketAddr) -> Self {
        let mut context = Self::new(request);
        context.src_addr = Some(src_addr);
        context
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time since the context was created, measured at the call site
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// The original question. It is never mutated by the engine.
    #[inline]
    pub fn request(&self) -> &Message {
        &self.request
    }

    #[inline]
    pub fn response(&self) -> Option<&Message> {
        self.response.as_ref()
    }

    #[inline]
    pub fn response_mut(&mut self) -> Option<&mut Message> {
        self.response.as_mut()
    }

    #[inline]
    pub fn set_response(&mut self, response: Option<Message>) {
        self.response = response;
    }

    #[inline]
    pub fn take_response(&mut self) -> Option<Message> {
        self.response.take()
    }

    #[inline]
    pub fn src_addr(&self) -> Option<SocketAddr> {
        self.src_addr
    }

    #[inline]
    pub fn set_src_addr(&mut self, src_addr: SocketAddr) {
        self.src_addr = Some(src_addr);
    }

    /// Set a custom attribute in the context
    ///
    /// Allows plugins and transports to store typed data for later retrieval
    pub fn set_attr<T>(&mut self, name: &'static str, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.attributes.insert(name, Box::new(value));
    }

    /// Get a reference to a custom attribute
    ///
    /// Returns None if the attribute doesn't exist or has a different type
    pub fn get_attr<T>(&self, name: &str) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.attributes.get(name).and_then(|a| a.downcast_ref())
    }

    /// Remove a custom attribute from the context
    pub fn remove_attr(&mut self, name: &str) {
        self.attributes.remove(name);
    }
}

impl std::fmt::Debug for DnsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsContext")
            .field("id", &self.id)
            .field("src_addr", &self.src_addr)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::ResponseCode;

    #[test]
    fn test_ids_are_unique() {
        let first = DnsContext::new(Message::new());
        let second = DnsContext::new(Message::new());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_response_slot() {
        let mut context = DnsContext::new(Message::new());
        assert!(context.response().is_none());

        let mut response = Message::new();
        response.set_response_code(ResponseCode::NXDomain);
        context.set_response(Some(response));
        assert_eq!(
            context.response().map(|r| r.response_code()),
            Some(ResponseCode::NXDomain)
        );

        assert!(context.take_response().is_some());
        assert!(context.response().is_none());
    }

    #[test]
    fn test_attributes() {
        let mut context = DnsContext::new(Message::new());
        context.set_attr(DnsContext::ATTR_SERVER_TAG, "udp_main".to_string());

        assert_eq!(
            context
                .get_attr::<String>(DnsContext::ATTR_SERVER_TAG)
                .map(String::as_str),
            Some("udp_main")
        );
        assert!(context.get_attr::<u32>(DnsContext::ATTR_SERVER_TAG).is_none());

        context.remove_attr(DnsContext::ATTR_SERVER_TAG);
        assert!(context.get_attr::<String>(DnsContext::ATTR_SERVER_TAG).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_is_computed_on_read() {
        let context = DnsContext::new(Message::new());
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(context.elapsed() >= Duration::from_millis(250));
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(context.elapsed() >= Duration::from_millis(500));
    }
}
