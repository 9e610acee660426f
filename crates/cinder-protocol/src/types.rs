//! Reply values and protocol constants.

use bytes::Bytes;

/// Largest allowed request body (the length-prefixed argument list).
pub const MAX_MSG_SIZE: usize = 4096;

/// Command-level error codes carried in [`Reply::Error`].
pub const ERR_ARG: i32 = -1;
pub const ERR_UNKNOWN: i32 = -2;
pub const ERR_TYPE: i32 = -3;

/// Reply type tags, the first byte of every serialized value.
pub(crate) const TAG_NIL: u8 = 0;
pub(crate) const TAG_ERROR: u8 = 1;
pub(crate) const TAG_STRING: u8 = 2;
pub(crate) const TAG_INTEGER: u8 = 3;
pub(crate) const TAG_DOUBLE: u8 = 4;
pub(crate) const TAG_ARRAY: u8 = 5;

/// A typed server reply.
///
/// On the wire, each value is a one-byte tag followed by a
/// little-endian payload; the whole reply is prefixed with its u32
/// length. `Bytes` keeps string payloads cheap to move between the db
/// task and the connection's write buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Absence of a value (missing key, SET acknowledgement).
    Nil,

    /// A command error: numeric code plus a short message.
    Error { code: i32, message: String },

    /// Binary-safe string value.
    String(Bytes),

    /// 64-bit signed integer.
    Integer(i64),

    /// IEEE-754 double (sorted set scores).
    Double(f64),

    /// Ordered sequence of replies (ZQUERY pairs, KEYS).
    Array(Vec<Reply>),
}

impl Reply {
    /// Builds an error reply.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}
