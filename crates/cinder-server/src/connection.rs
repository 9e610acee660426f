//! Per-connection handler.
//!
//! Reads length-prefixed request frames from a TCP stream, routes the
//! parsed commands through the db task, and writes typed replies back.
//! Multiple frames arriving in one read are all processed before the
//! combined responses are flushed (client-side pipelining).
//!
//! Command errors (bad arity, unknown verb, wrong type) are replied to
//! and the connection stays open. Protocol errors — oversize frames,
//! argument lengths overrunning the body — close it, as does five
//! seconds without any traffic.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use cinder_core::{DbHandle, DbRequest, DbResponse, TtlResult};
use cinder_protocol::{
    parse_request, write_response, Command, Reply, ERR_TYPE, ERR_UNKNOWN, MAX_MSG_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Initial buffer capacity; one maximum-size frame plus its length
/// prefix fits without growth. The parser rejects bodies above
/// [`MAX_MSG_SIZE`] outright, so buffered-but-unparsable input is
/// bounded by one partial frame.
const BUF_CAPACITY: usize = 4 + MAX_MSG_SIZE;

/// Connections with no traffic for this long are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

const WRONG_TYPE_MSG: &str = "Key holds wrong type";

/// Drives one client connection to completion. Returns `Ok` on any
/// orderly close (peer disconnect, idle timeout, protocol violation).
pub async fn handle(mut stream: TcpStream, db: DbHandle) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => return Ok(()), // clean disconnect
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!("closing idle connection");
                return Ok(());
            }
        }

        // drain every complete frame in the buffer before writing,
        // batching pipelined responses into one flush
        out.clear();
        loop {
            match parse_request(&buf) {
                Ok(Some((args, consumed))) => {
                    let _ = buf.split_to(consumed);
                    let reply = dispatch(&args, &db).await;
                    write_response(&mut out, &reply);
                }
                Ok(None) => break, // partial frame, read more
                Err(e) => {
                    debug!("protocol error, closing: {e}");
                    if !out.is_empty() {
                        let _ = stream.write_all(&out).await;
                    }
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}

/// Validates the argument list and executes it against the db task.
async fn dispatch(args: &[Bytes], db: &DbHandle) -> Reply {
    match Command::from_args(args) {
        Ok(cmd) => execute(cmd, db).await,
        Err(e) => Reply::error(e.code, e.message),
    }
}

/// Maps a command onto a db request and its response onto a reply.
async fn execute(cmd: Command, db: &DbHandle) -> Reply {
    let request = match cmd {
        Command::Get { key } => DbRequest::Get { key },
        Command::Set { key, value } => DbRequest::Set { key, value },
        Command::Del { key } => DbRequest::Del { key },
        Command::Keys => DbRequest::Keys,
        Command::ZAdd { key, score, member } => DbRequest::ZAdd { key, score, member },
        Command::ZRem { key, member } => DbRequest::ZRem { key, member },
        Command::ZScore { key, member } => DbRequest::ZScore { key, member },
        Command::ZQuery {
            key,
            min_score,
            min_member,
            offset,
            limit,
        } => DbRequest::ZQuery {
            key,
            min_score,
            min_member,
            offset,
            limit,
        },
        Command::PExpire { key, ttl_ms } => DbRequest::PExpire { key, ttl_ms },
        Command::PTtl { key } => DbRequest::PTtl { key },
    };

    match db.send(request).await {
        Ok(response) => render(response),
        Err(e) => Reply::error(ERR_UNKNOWN, format!("server error: {e}")),
    }
}

fn render(response: DbResponse) -> Reply {
    match response {
        DbResponse::Unit => Reply::Nil,
        DbResponse::Bool(flag) => Reply::Integer(i64::from(flag)),
        DbResponse::Value(Some(data)) => Reply::String(data),
        DbResponse::Value(None) => Reply::Nil,
        DbResponse::Score(Some(score)) => Reply::Double(score),
        DbResponse::Score(None) => Reply::Nil,
        DbResponse::Pairs(pairs) => Reply::Array(
            pairs
                .into_iter()
                .flat_map(|(name, score)| [Reply::String(name), Reply::Double(score)])
                .collect(),
        ),
        DbResponse::Ttl(TtlResult::Milliseconds(ms)) => Reply::Integer(ms as i64),
        DbResponse::Ttl(TtlResult::NoExpiry) => Reply::Integer(-1),
        DbResponse::Ttl(TtlResult::NotFound) => Reply::Integer(-2),
        DbResponse::Keys(keys) => Reply::Array(keys.into_iter().map(Reply::String).collect()),
        DbResponse::WrongType => Reply::error(ERR_TYPE, WRONG_TYPE_MSG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_maps_ttl_sentinels() {
        assert_eq!(
            render(DbResponse::Ttl(TtlResult::NoExpiry)),
            Reply::Integer(-1)
        );
        assert_eq!(
            render(DbResponse::Ttl(TtlResult::NotFound)),
            Reply::Integer(-2)
        );
        assert_eq!(
            render(DbResponse::Ttl(TtlResult::Milliseconds(250))),
            Reply::Integer(250)
        );
    }

    #[test]
    fn render_interleaves_zquery_pairs() {
        let reply = render(DbResponse::Pairs(vec![
            (Bytes::from("a"), 1.0),
            (Bytes::from("b"), 2.0),
        ]));
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::String(Bytes::from("a")),
                Reply::Double(1.0),
                Reply::String(Bytes::from("b")),
                Reply::Double(2.0),
            ])
        );
    }

    #[test]
    fn render_wrong_type() {
        assert_eq!(
            render(DbResponse::WrongType),
            Reply::error(ERR_TYPE, "Key holds wrong type")
        );
    }
}
