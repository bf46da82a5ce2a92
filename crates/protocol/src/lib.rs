//! Hermes Protocol
//!
//! The wire-level building blocks of the engine:
//!
//! - [`Message`]: a pipe-delimited, segment/field addressable HL7-style
//!   message value with a `get(path)`/`set(path, value)` accessor language
//!   and a parse/render round trip.
//! - [`Delimiters`] and [`Reassembler`]: MLLP framing, where each message travels
//!   as `SoM <text> EoM CR` with no length prefix, so inbound byte streams
//!   are reassembled per connection from trailer-delimited chunks.
//! - [`build_ack`]: constructs a protocol-correct acknowledgment for an
//!   inbound message and ack policy.
//!
//! # Framing
//!
//! ```text
//! [0x0B][MSH|^~\&|...\nPID|...][0x1C][0x0D]
//!  SoM   message text            EoM   CR
//! ```
//!
//! All three delimiter bytes are configurable per connection endpoint.

mod ack;
mod error;
mod message;
mod mllp;

pub use ack::{build_ack, AckConfig, AckMutator};
pub use error::{ProtocolError, Result};
pub use message::{FieldPath, Message};
pub use mllp::{Delimiters, Feed, Reassembler};

#[cfg(test)]
mod message_test;
