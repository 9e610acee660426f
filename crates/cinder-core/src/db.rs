//! The database task: cinder's event loop.
//!
//! One tokio task exclusively owns the [`Keyspace`] and its TTL heap.
//! Connections talk to it over a bounded mpsc channel, each request
//! carrying a oneshot reply sender, so every mutation executes serially
//! with no locks and every caller waits only on its own response.
//!
//! The loop sleeps until either a request arrives or the earliest TTL
//! deadline passes (capped at 24h when the heap is empty). After every
//! wake-up it collects due keys, bounded per tick so a burst of
//! simultaneous expirations cannot stall command processing. Bursts of
//! pipelined requests are drained with `try_recv()` before re-entering
//! the select, amortizing scheduler wake-ups.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::dropper::DropHandle;
use crate::error::DbError;
use crate::keyspace::{Keyspace, TtlResult};
use crate::time;

/// Upper bound on keys expired per event-loop tick.
const MAX_EXPIRE_PER_TICK: usize = 2000;

/// Timer cap when no TTL is armed.
const IDLE_TICK: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// A protocol-agnostic request for the db task.
#[derive(Debug)]
pub enum DbRequest {
    Get { key: Bytes },
    Set { key: Bytes, value: Bytes },
    Del { key: Bytes },
    Keys,
    ZAdd { key: Bytes, score: f64, member: Bytes },
    ZRem { key: Bytes, member: Bytes },
    ZScore { key: Bytes, member: Bytes },
    ZQuery {
        key: Bytes,
        min_score: f64,
        min_member: Bytes,
        offset: i64,
        limit: usize,
    },
    PExpire { key: Bytes, ttl_ms: i64 },
    PTtl { key: Bytes },
}

/// The db task's answer to a [`DbRequest`].
#[derive(Debug, PartialEq)]
pub enum DbResponse {
    Unit,
    Bool(bool),
    Value(Option<Bytes>),
    Score(Option<f64>),
    Pairs(Vec<(Bytes, f64)>),
    Ttl(TtlResult),
    Keys(Vec<Bytes>),
    /// The key holds a value of the wrong kind for this request.
    WrongType,
}

struct DbMessage {
    request: DbRequest,
    reply: oneshot::Sender<DbResponse>,
}

/// Cloneable handle for sending requests to the db task.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::Sender<DbMessage>,
}

impl DbHandle {
    /// Sends a request and waits for the response.
    pub async fn send(&self, request: DbRequest) -> Result<DbResponse, DbError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = DbMessage {
            request,
            reply: reply_tx,
        };
        self.tx.send(msg).await.map_err(|_| DbError::Unavailable)?;
        reply_rx.await.map_err(|_| DbError::Unavailable)
    }
}

/// Spawns the db task. `buffer` bounds the request channel — when the
/// task falls behind, senders wait instead of growing an unbounded
/// queue. The loop exits when every handle is dropped.
pub fn spawn_db(buffer: usize, drop_handle: Option<DropHandle>) -> DbHandle {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(run_db(rx, drop_handle));
    DbHandle { tx }
}

async fn run_db(mut rx: mpsc::Receiver<DbMessage>, drop_handle: Option<DropHandle>) {
    let mut keyspace = Keyspace::new();
    if let Some(handle) = drop_handle {
        keyspace.set_drop_handle(handle);
    }

    loop {
        let deadline = next_deadline(&keyspace);
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        process_message(msg, &mut keyspace);
                        // drain pipelined bursts before selecting again
                        while let Ok(msg) = rx.try_recv() {
                            process_message(msg, &mut keyspace);
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }
        keyspace.expire_due(MAX_EXPIRE_PER_TICK);
    }

    debug!(keys = keyspace.len(), "db task shutting down");
}

/// The next wake-up: the soonest TTL deadline, or a 24h idle tick.
fn next_deadline(keyspace: &Keyspace) -> tokio::time::Instant {
    let fallback = tokio::time::Instant::now() + IDLE_TICK;
    match keyspace.next_expiry() {
        Some(us) => tokio::time::Instant::from_std(time::instant_at(us)).min(fallback),
        None => fallback,
    }
}

fn process_message(msg: DbMessage, keyspace: &mut Keyspace) {
    let response = execute(msg.request, keyspace);
    // a dropped receiver just means the connection went away mid-request
    let _ = msg.reply.send(response);
}

fn execute(request: DbRequest, ks: &mut Keyspace) -> DbResponse {
    match request {
        DbRequest::Get { key } => match ks.get(&key) {
            Ok(value) => DbResponse::Value(value),
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::Set { key, value } => match ks.set(key, value) {
            Ok(()) => DbResponse::Unit,
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::Del { key } => DbResponse::Bool(ks.del(&key)),
        DbRequest::Keys => DbResponse::Keys(ks.keys()),
        DbRequest::ZAdd { key, score, member } => match ks.zadd(&key, member, score) {
            Ok(added) => DbResponse::Bool(added),
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::ZRem { key, member } => match ks.zrem(&key, &member) {
            Ok(removed) => DbResponse::Bool(removed),
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::ZScore { key, member } => match ks.zscore(&key, &member) {
            Ok(score) => DbResponse::Score(score),
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::ZQuery {
            key,
            min_score,
            min_member,
            offset,
            limit,
        } => match ks.zquery(&key, min_score, min_member, offset, limit) {
            Ok(pairs) => DbResponse::Pairs(pairs),
            Err(_) => DbResponse::WrongType,
        },
        DbRequest::PExpire { key, ttl_ms } => DbResponse::Bool(ks.pexpire(&key, ttl_ms)),
        DbRequest::PTtl { key } => DbResponse::Ttl(ks.pttl(&key)),
    }
}
