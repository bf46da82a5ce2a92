//! MLLP TCP listener
//!
//! One accept loop per listener, one task and one [`Reassembler`] per
//! accepted connection. Connection state never crosses connections: a
//! partial frame left behind when a peer disconnects is dropped with the
//! reassembler.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hermes_protocol::{Delimiters, Message, Reassembler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Read buffer capacity per connection
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct MllpServerConfig {
    /// Name used in log output, usually the owning channel's id
    pub name: String,
    /// Bind host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Framing bytes for this listener
    pub delimiters: Delimiters,
}

impl MllpServerConfig {
    /// Listener on `host:port` with default framing.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            delimiters: Delimiters::default(),
        }
    }

    /// Set the framing bytes.
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// The socket address to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Receives each complete inbound payload.
///
/// The payload is the unframed message text exactly as it arrived. The
/// returned message, if any, is framed with the listener's delimiters and
/// written back on the same connection. Returning `None` keeps the
/// connection open without replying.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Bytes, peer: SocketAddr) -> Option<Message>;
}

/// MLLP TCP listener.
///
/// Accepts connections and spawns one handler task each. Runs until the
/// cancellation token fires or the listener socket fails.
pub struct MllpServer {
    config: MllpServerConfig,
    handler: Arc<dyn MessageHandler>,
}

impl MllpServer {
    /// New listener over the given handler.
    pub fn new(config: MllpServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self { config, handler }
    }

    /// Bind and run the accept loop.
    ///
    /// Returns once cancelled. Per-connection errors are logged and do not
    /// stop the listener; a bind failure is fatal.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        // Port 0 binds an ephemeral port; report the real one.
        let local_addr = listener.local_addr()?;
        tracing::info!(
            name = %self.config.name,
            address = %local_addr,
            "listener started"
        );

        self.accept_loop(listener, cancel).await
    }

    /// Bind and run, reporting the bound address through `bound`.
    ///
    /// Same contract as [`run`](Self::run); used when the caller binds port
    /// 0 and needs the ephemeral port back.
    pub async fn run_with_bound_addr(
        self,
        cancel: CancellationToken,
        bound: tokio::sync::oneshot::Sender<SocketAddr>,
    ) -> Result<()> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            name = %self.config.name,
            address = %local_addr,
            "listener started"
        );
        let _ = bound.send(local_addr);

        self.accept_loop(listener, cancel).await
    }

    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let name = self.config.name.clone();
        let delimiters = self.config.delimiters;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!(name = %name, peer = %peer, "connection opened");
                            let handler = Arc::clone(&self.handler);
                            let conn_cancel = cancel.clone();
                            let conn_name = name.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, peer, delimiters, handler, conn_cancel)
                                        .await
                                {
                                    tracing::debug!(
                                        name = %conn_name,
                                        peer = %peer,
                                        error = %e,
                                        "connection error"
                                    );
                                }
                                tracing::debug!(name = %conn_name, peer = %peer, "connection closed");
                            });
                        }
                        Err(e) => {
                            // Transient accept errors, log and keep serving
                            tracing::warn!(name = %name, error = %e, "accept error");
                        }
                    }
                }
            }
        }

        tracing::info!(name = %self.config.name, "listener stopped");
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    delimiters: Delimiters,
    handler: Arc<dyn MessageHandler>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut reassembler = Reassembler::new(delimiters);
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_buf(&mut buf) => {
                match read {
                    Ok(0) => {
                        // Peer closed; any partial frame dies with the
                        // reassembler, without an error.
                        if reassembler.has_partial() {
                            tracing::debug!(peer = %peer, "connection closed with partial frame pending");
                        }
                        return Ok(());
                    }
                    Ok(_) => {
                        let chunk = buf.split();
                        let feed = reassembler.feed(&chunk);
                        if feed.lost_partial {
                            tracing::error!(
                                peer = %peer,
                                "new frame started before the previous one completed, partial message lost"
                            );
                        }
                        if let Some(payload) = feed.message {
                            if let Some(reply) = handler.handle(payload, peer).await {
                                let framed = delimiters.frame(&reply.to_string());
                                stream.write_all(&framed).await?;
                            }
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}
