/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! UDP DNS server plugin
//!
//! Binds its socket during `init`, so a bad or busy address fails plugin
//! construction. Each datagram is handled on its own task; the receive loop
//! stops on the lifecycle close signal or on [`Closer::close`].

use crate::config::types::PluginConfig;
use crate::core::error::{DnsError, Result};
use crate::core::lifecycle::{CloseSignal, DoneHandle, Lifecycle};
use crate::plugin::executor::sequence::chain::resolve_executor;
use crate::plugin::server::{RequestHandle, Server};
use crate::plugin::{Closer, Plugin, PluginFactory, PluginRegistry, UninitializedPlugin};
use async_trait::async_trait;
use hickory_proto::op::Message;
use serde::Deserialize;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Largest datagram accepted, the UDP payload limit
const MAX_DATAGRAM_SIZE: usize = 65535;

/// UDP server configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpServerConfig {
    /// Entry executor plugin tag to process incoming requests
    pub entry: String,

    /// UDP listen address (e.g., "0.0.0.0:53")
    pub listen: String,
}

/// UDP DNS server plugin
#[derive(Debug)]
pub struct UdpServer {
    tag: String,
    listen: SocketAddr,
    socket: Option<Arc<UdpSocket>>,
    request_handle: Arc<RequestHandle>,
    stop_tx: watch::Sender<bool>,
}

#[async_trait]
impl Plugin for UdpServer {
    fn tag(&self) -> &str {
        self.tag.as_str()
    }

    async fn init(&mut self) -> Result<()> {
        let socket = build_udp_socket(self.listen).map_err(|e| {
            DnsError::plugin(format!("failed to bind UDP socket to {}: {}", self.listen, e))
        })?;
        self.socket = Some(Arc::new(socket));
        Ok(())
    }

    fn as_closer(&self) -> Option<&dyn Closer> {
        Some(self)
    }
}

#[async_trait]
impl Closer for UdpServer {
    async fn close(&self) -> Result<()> {
        self.stop_tx.send_replace(true);
        Ok(())
    }
}

impl Server for UdpServer {
    fn start(self: Arc<Self>, lifecycle: &Lifecycle) -> Result<()> {
        let socket = self
            .socket
            .clone()
            .ok_or_else(|| DnsError::plugin(format!("UDP server {} is not bound", self.tag)))?;
        let local_addr = socket.local_addr()?;
        let handler = self.request_handle.clone();
        let stop = self.stop_tx.subscribe();
        let closer = lifecycle.clone();

        lifecycle.attach(move |done, close| run_server(socket, handler, stop, close, closer, done))?;
        info!("UDP server {} listening on {}", self.tag, local_addr);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

/// Main UDP receive loop
///
/// Spawns one task per datagram on a JoinSet. Queries still running when the
/// loop stops are aborted before the lifecycle is acknowledged.
async fn run_server(
    socket: Arc<UdpSocket>,
    handler: Arc<RequestHandle>,
    mut stop: watch::Receiver<bool>,
    mut close: CloseSignal,
    lifecycle: Lifecycle,
    done: DoneHandle,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = close.recv() => break,
            _ = stop.wait_for(|stopped| *stopped) => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src_addr)) => {
                    let packet = buf[..len].to_vec();
                    let socket = socket.clone();
                    let handler = handler.clone();
                    tasks.spawn(async move {
                        handle_datagram(packet, src_addr, socket, handler).await;
                    });
                    reap_tasks(&mut tasks);
                }
                Err(e) if is_transient(&e) => {
                    debug!(%e, "transient error on UDP socket");
                }
                Err(e) => {
                    error!("UDP socket failed: {}", e);
                    lifecycle.request_close(Some(DnsError::Io(e)));
                    break;
                }
            }
        }
    }

    // In-flight queries are aborted so a stuck step cannot hold the drain
    reap_tasks(&mut tasks);
    if !tasks.is_empty() {
        debug!("Aborting {} in-flight UDP queries", tasks.len());
    }
    tasks.shutdown().await;
    debug!("UDP receive loop stopped");
    done.done();
}

async fn handle_datagram(
    packet: Vec<u8>,
    src_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    handler: Arc<RequestHandle>,
) {
    let msg = match Message::from_vec(&packet) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Dropping malformed query from {}: {}", src_addr, e);
            return;
        }
    };

    let result = handler.handle_request(msg, src_addr).await;
    match result.response.to_vec() {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, src_addr).await {
                warn!("Failed to send response to {}: {}", src_addr, e);
            }
        }
        Err(e) => warn!("Failed to serialize response for {}: {}", src_addr, e),
    }
}

/// Errors a single bad peer can cause, the socket stays usable
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

fn reap_tasks(join_set: &mut JoinSet<()>) {
    while join_set.try_join_next().is_some() {}
}

/// Build a non-blocking UDP socket, v6 sockets are v6-only
pub fn build_udp_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let sock = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        sock.set_only_v6(true)?;
    }
    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;

    UdpSocket::from_std(sock.into())
}

/// Factory for creating UDP server plugin instances
#[derive(Debug)]
pub struct UdpServerFactory;

#[async_trait]
impl PluginFactory for UdpServerFactory {
    async fn create(
        &self,
        plugin_config: &PluginConfig,
        registry: &PluginRegistry,
    ) -> Result<UninitializedPlugin> {
        let udp_config = serde_yml::from_value::<UdpServerConfig>(
            plugin_config
                .args
                .clone()
                .ok_or_else(|| DnsError::plugin("UDP Server requires configuration arguments"))?,
        )
        .map_err(|e| DnsError::plugin(format!("Failed to parse UDP Server config: {}", e)))?;

        let listen = SocketAddr::from_str(udp_config.listen.trim()).map_err(|e| {
            DnsError::plugin(format!("invalid listen address {}: {}", udp_config.listen, e))
        })?;
        let entry = resolve_executor(&udp_config.entry, registry).map_err(|e| {
            DnsError::plugin(format!(
                "UDP Server [{}] entry plugin [{}] unavailable: {}",
                plugin_config.tag, udp_config.entry, e
            ))
        })?;

        let (stop_tx, _) = watch::channel(false);
        Ok(UninitializedPlugin::Server(Box::new(UdpServer {
            tag: plugin_config.tag.clone(),
            listen,
            socket: None,
            request_handle: Arc::new(RequestHandle::new(&plugin_config.tag, entry)),
            stop_tx,
        })))
    }
}
