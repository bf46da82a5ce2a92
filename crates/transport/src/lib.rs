//! Hermes Transport
//!
//! MLLP over TCP, both directions:
//!
//! - [`MllpServer`] binds a listener and runs one reassembly loop per
//!   accepted connection, handing each complete unframed payload to a
//!   [`MessageHandler`] and writing the handler's reply back framed;
//! - [`MllpClient`] connects outbound, writes one framed message, and
//!   reassembles the reply with a deadline.
//!
//! Framing bytes are configurable per endpoint via
//! [`hermes_protocol::Delimiters`].

mod client;
mod error;
mod server;

pub use client::MllpClient;
pub use error::{Result, TransportError};
pub use server::{MessageHandler, MllpServer, MllpServerConfig};

#[cfg(test)]
mod server_test;
