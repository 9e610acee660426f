//! Protocol error types.

use thiserror::Error;

/// Errors from parsing the wire format.
///
/// `Incomplete` is internal back-pressure — the public parse functions
/// translate it to `Ok(None)` so callers can read more bytes and retry.
/// Everything else is a protocol violation and closes the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer does not yet hold a complete frame.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// A frame declared a body larger than the per-message limit.
    #[error("message of {0} bytes exceeds the maximum size")]
    MessageSize(u32),

    /// An argument length overruns its frame.
    #[error("malformed message body")]
    BadMessage,

    /// A reply carried an unknown type tag.
    #[error("invalid reply tag: {0:#04x}")]
    InvalidTag(u8),
}
