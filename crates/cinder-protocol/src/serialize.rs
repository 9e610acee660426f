//! Direct-to-buffer serialization.
//!
//! Writes requests and replies straight into a `BytesMut` with no
//! intermediate allocations. The outer u32 length prefix is reserved
//! up front and backfilled once the body size is known.
//!
//! All multi-byte integers are little-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{
    Reply, TAG_ARRAY, TAG_DOUBLE, TAG_ERROR, TAG_INTEGER, TAG_NIL, TAG_STRING,
};

impl Reply {
    /// Serializes this value (tag + payload, no length prefix).
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Reply::Nil => {
                dst.put_u8(TAG_NIL);
            }
            Reply::Error { code, message } => {
                dst.put_u8(TAG_ERROR);
                dst.put_i32_le(*code);
                dst.put_u32_le(message.len() as u32);
                dst.put_slice(message.as_bytes());
            }
            Reply::String(data) => {
                dst.put_u8(TAG_STRING);
                dst.put_u32_le(data.len() as u32);
                dst.put_slice(data);
            }
            Reply::Integer(value) => {
                dst.put_u8(TAG_INTEGER);
                dst.put_i64_le(*value);
            }
            Reply::Double(value) => {
                dst.put_u8(TAG_DOUBLE);
                dst.put_f64_le(*value);
            }
            Reply::Array(items) => {
                dst.put_u8(TAG_ARRAY);
                dst.put_u32_le(items.len() as u32);
                for item in items {
                    item.serialize(dst);
                }
            }
        }
    }
}

/// Writes a complete response frame: u32 length prefix plus the value.
pub fn write_response(dst: &mut BytesMut, reply: &Reply) {
    let start = dst.len();
    dst.put_u32_le(0);
    reply.serialize(dst);
    let body_len = (dst.len() - start - 4) as u32;
    dst[start..start + 4].copy_from_slice(&body_len.to_le_bytes());
}

/// Writes a complete request frame: u32 total length, then each
/// argument as (u32 length, bytes).
pub fn write_request(dst: &mut BytesMut, args: &[Bytes]) {
    let body_len: usize = args.iter().map(|arg| 4 + arg.len()).sum();
    dst.put_u32_le(body_len as u32);
    for arg in args {
        dst.put_u32_le(arg.len() as u32);
        dst.put_slice(arg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(reply: &Reply) -> Vec<u8> {
        let mut buf = BytesMut::new();
        reply.serialize(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn nil() {
        assert_eq!(serialize(&Reply::Nil), [0]);
    }

    #[test]
    fn error() {
        let bytes = serialize(&Reply::error(-1, "no"));
        assert_eq!(bytes[0], 1);
        assert_eq!(i32::from_le_bytes(bytes[1..5].try_into().unwrap()), -1);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 2);
        assert_eq!(&bytes[9..], b"no");
    }

    #[test]
    fn string() {
        let bytes = serialize(&Reply::String(Bytes::from_static(b"hello")));
        assert_eq!(bytes[0], 2);
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 5);
        assert_eq!(&bytes[5..], b"hello");
    }

    #[test]
    fn integer() {
        let bytes = serialize(&Reply::Integer(-7));
        assert_eq!(bytes[0], 3);
        assert_eq!(i64::from_le_bytes(bytes[1..9].try_into().unwrap()), -7);
    }

    #[test]
    fn double() {
        let bytes = serialize(&Reply::Double(1.5));
        assert_eq!(bytes[0], 4);
        assert_eq!(f64::from_le_bytes(bytes[1..9].try_into().unwrap()), 1.5);
    }

    #[test]
    fn nested_array() {
        let reply = Reply::Array(vec![Reply::Nil, Reply::Integer(1)]);
        let bytes = serialize(&reply);
        assert_eq!(bytes[0], 5);
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 2);
        assert_eq!(bytes[5], 0); // nil element
        assert_eq!(bytes[6], 3); // integer element
    }

    #[test]
    fn response_length_prefix() {
        let mut buf = BytesMut::new();
        write_response(&mut buf, &Reply::Integer(9));
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 9);
        assert_eq!(buf.len(), 4 + 9);
    }

    #[test]
    fn request_framing() {
        let mut buf = BytesMut::new();
        write_request(
            &mut buf,
            &[Bytes::from_static(b"get"), Bytes::from_static(b"key")],
        );
        // body: (4 + 3) * 2 = 14
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 14);
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[8..11], b"get");
        assert_eq!(&buf[15..18], b"key");
    }
}
