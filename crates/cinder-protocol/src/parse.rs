//! Incremental wire-format parsing.
//!
//! Both parsers operate on a caller-owned buffer and never consume it
//! themselves: a complete frame comes back with the number of bytes it
//! occupied, an incomplete one as `Ok(None)` so the caller can read
//! more and retry. Malformed input is an error and the connection
//! should be closed.
//!
//! Request frames: `u32 total_len`, then `total_len` bytes of repeated
//! `(u32 arg_len, arg)`. The body may not exceed [`MAX_MSG_SIZE`]; an
//! argument running past the body end is `bad_message`.
//!
//! Reply frames (decoded by the client and the round-trip tests):
//! `u32 total_len`, then one tagged value.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::{
    Reply, MAX_MSG_SIZE, TAG_ARRAY, TAG_DOUBLE, TAG_ERROR, TAG_INTEGER, TAG_NIL, TAG_STRING,
};

/// Parses one request frame into its argument list.
///
/// Returns `Ok(Some((args, consumed)))` for a complete frame,
/// `Ok(None)` when more data is needed, or an error for a frame that
/// can never become valid.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Vec<Bytes>, usize)>, ProtocolError> {
    let Some(total_len) = read_u32(buf, 0) else {
        return Ok(None);
    };
    if total_len as usize > MAX_MSG_SIZE {
        return Err(ProtocolError::MessageSize(total_len));
    }
    let frame_end = 4 + total_len as usize;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let mut args = Vec::new();
    let mut pos = 4;
    while pos < frame_end {
        let arg_len = match read_u32(buf, pos) {
            Some(len) if pos + 4 <= frame_end => len as usize,
            _ => return Err(ProtocolError::BadMessage),
        };
        pos += 4;
        if pos + arg_len > frame_end {
            return Err(ProtocolError::BadMessage);
        }
        args.push(Bytes::copy_from_slice(&buf[pos..pos + arg_len]));
        pos += arg_len;
    }

    Ok(Some((args, frame_end)))
}

/// Parses one length-prefixed reply frame.
pub fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
    let Some(total_len) = read_u32(buf, 0) else {
        return Ok(None);
    };
    let frame_end = 4 + total_len as usize;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let body = &buf[4..frame_end];
    let mut pos = 0;
    match decode_value(body, &mut pos) {
        Ok(reply) => {
            if pos != body.len() {
                // trailing garbage inside the declared frame
                return Err(ProtocolError::BadMessage);
            }
            Ok(Some((reply, frame_end)))
        }
        // the frame was complete per its prefix, so a truncated value
        // inside it can never be finished by reading more
        Err(ProtocolError::Incomplete) => Err(ProtocolError::BadMessage),
        Err(e) => Err(e),
    }
}

/// Decodes one tagged value at `*pos`, advancing it.
fn decode_value(body: &[u8], pos: &mut usize) -> Result<Reply, ProtocolError> {
    let tag = *body.get(*pos).ok_or(ProtocolError::Incomplete)?;
    *pos += 1;

    match tag {
        TAG_NIL => Ok(Reply::Nil),
        TAG_ERROR => {
            let code = read_i32(body, pos)?;
            let len = read_u32_at(body, pos)? as usize;
            let raw = take(body, pos, len)?;
            let message = String::from_utf8(raw.to_vec())
                .map_err(|_| ProtocolError::BadMessage)?;
            Ok(Reply::Error { code, message })
        }
        TAG_STRING => {
            let len = read_u32_at(body, pos)? as usize;
            let raw = take(body, pos, len)?;
            Ok(Reply::String(Bytes::copy_from_slice(raw)))
        }
        TAG_INTEGER => {
            let raw = take(body, pos, 8)?;
            Ok(Reply::Integer(i64::from_le_bytes(
                raw.try_into().map_err(|_| ProtocolError::Incomplete)?,
            )))
        }
        TAG_DOUBLE => {
            let raw = take(body, pos, 8)?;
            Ok(Reply::Double(f64::from_le_bytes(
                raw.try_into().map_err(|_| ProtocolError::Incomplete)?,
            )))
        }
        TAG_ARRAY => {
            let count = read_u32_at(body, pos)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_value(body, pos)?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(ProtocolError::InvalidTag(other)),
    }
}

// -- low-level readers --

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let raw = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

fn read_u32_at(body: &[u8], pos: &mut usize) -> Result<u32, ProtocolError> {
    let raw = take(body, pos, 4)?;
    raw.try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| ProtocolError::Incomplete)
}

fn read_i32(body: &[u8], pos: &mut usize) -> Result<i32, ProtocolError> {
    let raw = take(body, pos, 4)?;
    raw.try_into()
        .map(i32::from_le_bytes)
        .map_err(|_| ProtocolError::Incomplete)
}

fn take<'a>(body: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], ProtocolError> {
    let raw = body
        .get(*pos..*pos + len)
        .ok_or(ProtocolError::Incomplete)?;
    *pos += len;
    Ok(raw)
}
