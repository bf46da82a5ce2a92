//! Outbound MLLP client
//!
//! Connects to a downstream endpoint, writes one framed message, and
//! reassembles the framed reply. Each exchange is bounded by a response
//! deadline so a silent peer cannot stall the caller.

use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use hermes_protocol::{Delimiters, Message, Reassembler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Result, TransportError};

/// Read buffer capacity for replies
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// One outbound MLLP connection.
pub struct MllpClient {
    stream: TcpStream,
    address: String,
    delimiters: Delimiters,
}

impl fmt::Debug for MllpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MllpClient")
            .field("address", &self.address)
            .field("delimiters", &self.delimiters)
            .finish_non_exhaustive()
    }
}

impl MllpClient {
    /// Connect to `address` with the given framing bytes.
    pub async fn connect(address: impl Into<String>, delimiters: Delimiters) -> Result<Self> {
        let address = address.into();
        let stream =
            TcpStream::connect(&address)
                .await
                .map_err(|e| TransportError::Connect {
                    address: address.clone(),
                    source: e,
                })?;
        tracing::debug!(address = %address, "connected");
        Ok(Self {
            stream,
            address,
            delimiters,
        })
    }

    /// The remote address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one message and wait up to `response_timeout` for the reply.
    pub async fn send(&mut self, message: &Message, response_timeout: Duration) -> Result<Message> {
        let framed = self.delimiters.frame(&message.to_string());
        self.stream.write_all(&framed).await?;

        match timeout(response_timeout, self.read_reply()).await {
            Ok(reply) => reply,
            Err(_) => Err(TransportError::ResponseTimeout {
                address: self.address.clone(),
                timeout_ms: response_timeout.as_millis() as u64,
            }),
        }
    }

    async fn read_reply(&mut self) -> Result<Message> {
        let mut reassembler = Reassembler::new(self.delimiters);
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            let n = self.stream.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed {
                    address: self.address.clone(),
                });
            }
            let chunk = buf.split();
            if let Some(payload) = reassembler.feed(&chunk).message {
                let text = String::from_utf8_lossy(&payload);
                return Ok(Message::parse(&text)?);
            }
        }
    }
}
