//! MLLP framing and per-connection reassembly
//!
//! Messages travel as `SoM <text> EoM CR` with no length prefix, so the only
//! way to find a message boundary is the two-byte trailer. Each connection
//! owns one [`Reassembler`] that accumulates partial chunks until a trailer
//! arrives.
//!
//! A chunk that ends mid-trailer is not an error; it is simply more data
//! coming. The one loss path is a fresh start-of-message byte arriving while
//! a partial buffer exists: the stale partial is discarded and reported via
//! [`Feed::lost_partial`].

use bytes::{Bytes, BytesMut};

/// Default start-of-message byte (vertical tab)
pub const DEFAULT_START: u8 = 0x0B;

/// Default end-of-message byte (file separator)
pub const DEFAULT_END: u8 = 0x1C;

/// Default trailer carriage-return byte
pub const DEFAULT_CR: u8 = 0x0D;

/// The three framing bytes for one connection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Start-of-message byte
    pub start: u8,
    /// End-of-message byte
    pub end: u8,
    /// Carriage-return byte completing the trailer
    pub cr: u8,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            end: DEFAULT_END,
            cr: DEFAULT_CR,
        }
    }
}

impl Delimiters {
    /// Wrap message text in a frame: `SoM <text> EoM CR`.
    pub fn frame(&self, text: &str) -> Bytes {
        let mut buf = BytesMut::with_capacity(text.len() + 3);
        buf.extend_from_slice(&[self.start]);
        buf.extend_from_slice(text.as_bytes());
        buf.extend_from_slice(&[self.end, self.cr]);
        buf.freeze()
    }
}

/// Outcome of feeding one chunk to a [`Reassembler`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feed {
    /// A completed, unframed message, if the chunk closed one.
    pub message: Option<Bytes>,
    /// True when a new start byte forced a stale partial buffer to be
    /// discarded (a message-loss event the caller should report).
    pub lost_partial: bool,
}

/// Per-connection frame reassembly state.
///
/// One instance per accepted connection; state never crosses connections.
/// Dropping the reassembler on connection close silently discards any
/// remaining partial data.
#[derive(Debug, Default)]
pub struct Reassembler {
    delimiters: Delimiters,
    partial: Option<BytesMut>,
}

impl Reassembler {
    /// Create a reassembler for the given framing bytes.
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            partial: None,
        }
    }

    /// True while an incomplete message is buffered.
    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one received chunk.
    ///
    /// At most one complete message is produced per chunk, matching a
    /// sender that writes one framed message per burst. A chunk without the
    /// trailing `EoM CR` is buffered until the trailer arrives: the trailer
    /// itself may be split across chunks.
    pub fn feed(&mut self, chunk: &[u8]) -> Feed {
        if chunk.is_empty() {
            return Feed::default();
        }

        let d = self.delimiters;
        let starts = chunk.first() == Some(&d.start);

        // A fresh start while a partial exists means the previous message
        // was truncated in flight. Drop it and resynchronize on this chunk.
        let lost_partial = starts && self.partial.take().is_some();

        let body = if starts { &chunk[1..] } else { chunk };
        let buf = self.partial.get_or_insert_with(BytesMut::new);
        buf.extend_from_slice(body);

        let complete =
            buf.len() >= 2 && buf[buf.len() - 1] == d.cr && buf[buf.len() - 2] == d.end;
        if !complete {
            return Feed {
                message: None,
                lost_partial,
            };
        }

        buf.truncate(buf.len() - 2);
        Feed {
            message: self.partial.take().map(BytesMut::freeze),
            lost_partial,
        }
    }
}
