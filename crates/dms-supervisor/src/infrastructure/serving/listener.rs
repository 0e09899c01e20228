//! Built-in serving component: a TCP listener with client network filtering.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address when an instance is
//!    built (so a port conflict surfaces as an init failure).
//! 2. Accepting incoming connections until the instance is closed.
//! 3. Dropping connections from peers outside the allowed networks.
//! 4. Handing every other connection to a [`ConnectionHandler`].
//!
//! The media protocol itself (HTTP content directory, SSDP announcements)
//! plugs in through the handler.  The default handler logs the peer and
//! closes the connection.
//!
//! # Shutdown
//!
//! `close` cancels a per-instance [`CancellationToken`].  The accept loop
//! selects on it, so `run` returns promptly even when no client is
//! connecting, and a close that happens before `run` starts is not lost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dms_core::{is_allowed, AllowedNet, InterfaceSet};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ServeError, ServerFactory, ServingInstance};

/// Pause after a failed `accept` so a persistent error (e.g. too many open
/// files) does not turn the loop into a busy spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Callback receiving every accepted, allowed connection.
pub type ConnectionHandler = Arc<dyn Fn(TcpStream, SocketAddr) + Send + Sync>;

/// The default [`ConnectionHandler`]: logs the peer and drops the stream.
pub fn log_and_close() -> ConnectionHandler {
    Arc::new(|_stream, peer| {
        debug!("accepted connection from {peer}; no protocol handler installed, closing");
    })
}

// ── Instance ──────────────────────────────────────────────────────────────────

/// A [`ServingInstance`] that owns one bound TCP listener.
pub struct ListenerServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    interfaces: InterfaceSet,
    allowed_nets: Vec<AllowedNet>,
    handler: ConnectionHandler,
    shutdown: CancellationToken,
}

impl ListenerServer {
    /// Binds `addr` and returns an instance ready for `init`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Bind`] if the address is in use or not
    /// available on this host.
    pub async fn bind(
        addr: SocketAddr,
        interfaces: InterfaceSet,
        allowed_nets: Vec<AllowedNet>,
        handler: ConnectionHandler,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            interfaces,
            allowed_nets,
            handler,
            shutdown: CancellationToken::new(),
        })
    }

    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if is_allowed(&self.allowed_nets, peer.ip()) {
            (self.handler)(stream, peer);
        } else {
            warn!("rejected connection from {peer}: not in an allowed network");
        }
    }
}

#[async_trait]
impl ServingInstance for ListenerServer {
    fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    async fn init(&self) -> Result<(), ServeError> {
        if self.interfaces.is_empty() {
            warn!("no usable network interfaces; serving on {} anyway", self.local_addr);
        }
        info!(
            "media server listening on {} for interfaces [{}]",
            self.local_addr,
            self.interfaces.names().join(", ")
        );
        Ok(())
    }

    async fn run(&self) -> Result<(), ServeError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("listener on {} closed", self.local_addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        error!("accept error on {}: {e}", self.local_addr);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    async fn close(&self) -> Result<(), ServeError> {
        if self.shutdown.is_cancelled() {
            debug!("listener on {} already closed", self.local_addr);
        }
        self.shutdown.cancel();
        Ok(())
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Builds a [`ListenerServer`] per interface set, all on the same address.
pub struct ListenerServerFactory {
    bind_addr: SocketAddr,
    allowed_nets: Vec<AllowedNet>,
    handler: ConnectionHandler,
}

impl ListenerServerFactory {
    /// Creates a factory using the [`log_and_close`] handler.
    pub fn new(bind_addr: SocketAddr, allowed_nets: Vec<AllowedNet>) -> Self {
        Self::with_handler(bind_addr, allowed_nets, log_and_close())
    }

    /// Creates a factory whose instances pass connections to `handler`.
    pub fn with_handler(
        bind_addr: SocketAddr,
        allowed_nets: Vec<AllowedNet>,
        handler: ConnectionHandler,
    ) -> Self {
        Self {
            bind_addr,
            allowed_nets,
            handler,
        }
    }
}

#[async_trait]
impl ServerFactory for ListenerServerFactory {
    async fn build(
        &self,
        interfaces: InterfaceSet,
    ) -> Result<Arc<dyn ServingInstance>, ServeError> {
        let server = ListenerServer::bind(
            self.bind_addr,
            interfaces,
            self.allowed_nets.clone(),
            Arc::clone(&self.handler),
        )
        .await?;
        Ok(Arc::new(server))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
