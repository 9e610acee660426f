//! The keyspace: key → entry storage with TTL bookkeeping.
//!
//! A `Keyspace` owns the top-level [`Dict`] of entries and the TTL
//! [`ExpiryHeap`]. Each entry holds either a string or a sorted set,
//! plus the index of its heap slot when an expiry is armed. The heap
//! reports every slot move back through a callback that rewrites the
//! owning entry's stored position, so TTL updates and removals stay
//! O(log n).
//!
//! Expiration is driven by the db task: it asks for the next deadline
//! via [`Keyspace::next_expiry`] and collects due keys in bounded
//! batches via [`Keyspace::expire_due`]. Reads never expire lazily —
//! a key can be observed for at most one tick past its deadline.

use bytes::Bytes;
use tracing::debug;

use crate::dict::Dict;
use crate::dropper::DropHandle;
use crate::error::WrongType;
use crate::heap::ExpiryHeap;
use crate::time;
use crate::types::sorted_set::SortedSet;
use crate::types::Value;

/// Sentinel heap position meaning "no TTL armed".
const NO_TTL: usize = usize::MAX;

/// The authoritative record for one key.
pub(crate) struct Entry {
    pub(crate) value: Value,
    /// Index of this entry's slot in the TTL heap, or [`NO_TTL`].
    pub(crate) heap_pos: usize,
}

impl Entry {
    fn new(value: Value) -> Self {
        Entry {
            value,
            heap_pos: NO_TTL,
        }
    }
}

/// Result of a PTTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists with an expiry; remaining milliseconds (never negative).
    Milliseconds(u64),
    /// Key exists without an expiry.
    NoExpiry,
    /// Key does not exist.
    NotFound,
}

pub struct Keyspace {
    entries: Dict<Entry>,
    ttl: ExpiryHeap,
    drop_handle: Option<DropHandle>,
    expired_total: u64,
}

/// Position write-back used by every heap operation: whenever the heap
/// moves a slot, the owning entry's `heap_pos` follows it.
fn track_positions(entries: &mut Dict<Entry>) -> impl FnMut(&[u8], usize) + '_ {
    move |key, pos| {
        if let Some(entry) = entries.find(key) {
            entry.heap_pos = pos;
        }
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            entries: Dict::new(),
            ttl: ExpiryHeap::new(),
            drop_handle: None,
            expired_total: 0,
        }
    }

    /// Attaches the drop pool handle. When set, costly value
    /// destruction is deferred off the db task.
    pub fn set_drop_handle(&mut self, handle: DropHandle) {
        self.drop_handle = Some(handle);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cumulative count of keys collected by TTL expiration.
    pub fn expired_total(&self) -> u64 {
        self.expired_total
    }

    // -- string commands --

    /// GET: the string value, `None` when missing.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>, WrongType> {
        match self.entries.find(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::String(data) => Ok(Some(data.clone())),
                Value::SortedSet(_) => Err(WrongType),
            },
        }
    }

    /// SET: upserts a string value. Overwriting keeps any armed TTL.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> Result<(), WrongType> {
        match self.entries.find(&key) {
            Some(entry) => match &mut entry.value {
                Value::String(data) => {
                    *data = value;
                    Ok(())
                }
                Value::SortedSet(_) => Err(WrongType),
            },
            None => {
                self.entries.insert(key, Entry::new(Value::String(value)));
                Ok(())
            }
        }
    }

    /// DEL: removes a key of any kind. Returns whether it existed.
    pub fn del(&mut self, key: &[u8]) -> bool {
        let pos = match self.entries.find(key) {
            Some(entry) => entry.heap_pos,
            None => return false,
        };
        if pos != NO_TTL {
            self.heap_remove(pos);
        }
        match self.entries.remove(key) {
            Some(entry) => {
                self.defer_drop(entry.value);
                true
            }
            None => false,
        }
    }

    /// KEYS: every live key, in no particular order.
    pub fn keys(&self) -> Vec<Bytes> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    // -- sorted set commands --

    /// ZADD: upserts a member. Creates the sorted set on first touch.
    /// Returns `true` when the member was newly added.
    pub fn zadd(&mut self, key: &Bytes, member: Bytes, score: f64) -> Result<bool, WrongType> {
        match self.entries.find(key) {
            Some(entry) => match &mut entry.value {
                Value::SortedSet(zset) => Ok(zset.add(member, score)),
                Value::String(_) => Err(WrongType),
            },
            None => {
                let mut zset = Box::new(SortedSet::new());
                zset.add(member, score);
                self.entries
                    .insert(key.clone(), Entry::new(Value::SortedSet(zset)));
                Ok(true)
            }
        }
    }

    /// ZREM: removes a member. Missing key counts as a missing member.
    pub fn zrem(&mut self, key: &[u8], member: &[u8]) -> Result<bool, WrongType> {
        match self.entries.find(key) {
            None => Ok(false),
            Some(entry) => match &mut entry.value {
                Value::SortedSet(zset) => Ok(zset.remove(member)),
                Value::String(_) => Err(WrongType),
            },
        }
    }

    /// ZSCORE: the member's score, `None` when either key or member is
    /// missing.
    pub fn zscore(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>, WrongType> {
        match self.entries.find(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::SortedSet(zset) => Ok(zset.score(member)),
                Value::String(_) => Err(WrongType),
            },
        }
    }

    /// ZQUERY: ordered range scan. Missing key yields an empty result.
    pub fn zquery(
        &mut self,
        key: &[u8],
        min_score: f64,
        min_member: Bytes,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<(Bytes, f64)>, WrongType> {
        match self.entries.find(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::SortedSet(zset) => Ok(zset.query(min_score, min_member, offset, limit)),
                Value::String(_) => Err(WrongType),
            },
        }
    }

    // -- TTL commands --

    /// PEXPIRE: arms, rearms, or (for negative `ttl_ms`) disarms the
    /// key's expiry. A TTL of zero is armed at `now` and collected on
    /// the next tick. Returns whether the key exists.
    pub fn pexpire(&mut self, key: &Bytes, ttl_ms: i64) -> bool {
        let pos = match self.entries.find(key) {
            Some(entry) => entry.heap_pos,
            None => return false,
        };

        if ttl_ms < 0 {
            if pos != NO_TTL {
                self.heap_remove(pos);
                if let Some(entry) = self.entries.find(key) {
                    entry.heap_pos = NO_TTL;
                }
            }
            return true;
        }

        let expire_at = time::now_us() + ttl_ms as u64 * 1000;
        let Keyspace { entries, ttl, .. } = self;
        if pos == NO_TTL {
            ttl.push(expire_at, key.clone(), &mut track_positions(entries));
        } else {
            ttl.update(pos, expire_at, &mut track_positions(entries));
        }
        true
    }

    /// PTTL: remaining lifetime in milliseconds.
    pub fn pttl(&mut self, key: &[u8]) -> TtlResult {
        let pos = match self.entries.find(key) {
            Some(entry) => entry.heap_pos,
            None => return TtlResult::NotFound,
        };
        if pos == NO_TTL {
            return TtlResult::NoExpiry;
        }
        let expire_at = self.ttl.expire_at(pos);
        let now = time::now_us();
        TtlResult::Milliseconds(expire_at.saturating_sub(now) / 1000)
    }

    /// Monotonic-microsecond deadline of the soonest expiry, if any.
    pub fn next_expiry(&self) -> Option<u64> {
        self.ttl.peek().map(|slot| slot.expire_at)
    }

    /// Collects keys whose expiry has passed, at most `budget` of them,
    /// deferring value destruction to the drop pool. Returns the number
    /// collected.
    pub fn expire_due(&mut self, budget: usize) -> usize {
        let now = time::now_us();
        let mut collected = 0;

        while collected < budget {
            match self.ttl.peek() {
                Some(slot) if slot.expire_at <= now => {}
                _ => break,
            }
            let slot = {
                let Keyspace { entries, ttl, .. } = self;
                ttl.pop(&mut track_positions(entries))
            };
            let Some(slot) = slot else { break };
            if let Some(entry) = self.entries.remove(&slot.key) {
                self.expired_total += 1;
                self.defer_drop(entry.value);
            }
            collected += 1;
        }

        if collected > 0 {
            debug!(collected, "expired keys");
        }
        collected
    }

    fn heap_remove(&mut self, pos: usize) {
        let Keyspace { entries, ttl, .. } = self;
        ttl.remove(pos, &mut track_positions(entries));
    }

    fn defer_drop(&self, value: Value) {
        if let Some(handle) = &self.drop_handle {
            handle.defer_value(value);
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_owned())
    }

    #[test]
    fn set_then_get() {
        let mut ks = Keyspace::new();
        ks.set(b("foo"), b("bar")).unwrap();
        assert_eq!(ks.get(b"foo").unwrap(), Some(b("bar")));
        assert_eq!(ks.get(b"missing").unwrap(), None);
    }

    #[test]
    fn set_overwrites() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v1")).unwrap();
        ks.set(b("k"), b("v2")).unwrap();
        assert_eq!(ks.get(b"k").unwrap(), Some(b("v2")));
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn kind_mismatch_is_wrong_type() {
        let mut ks = Keyspace::new();
        ks.set(b("s"), b("v")).unwrap();
        assert_eq!(ks.zadd(&b("s"), b("m"), 1.0), Err(WrongType));
        assert_eq!(ks.zscore(b"s", b"m"), Err(WrongType));
        assert_eq!(ks.zrem(b"s", b"m"), Err(WrongType));
        assert_eq!(ks.zquery(b"s", 0.0, Bytes::new(), 0, 10), Err(WrongType));

        ks.zadd(&b("z"), b("m"), 1.0).unwrap();
        assert_eq!(ks.get(b"z"), Err(WrongType));
        assert_eq!(ks.set(b("z"), b("v")), Err(WrongType));
    }

    #[test]
    fn del_is_idempotent() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v")).unwrap();
        assert!(ks.del(b"k"));
        assert!(!ks.del(b"k"));
        assert!(!ks.del(b"never"));
        assert_eq!(ks.len(), 0);
    }

    #[test]
    fn del_disarms_ttl() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v")).unwrap();
        assert!(ks.pexpire(&b("k"), 10_000));
        assert!(ks.del(b"k"));
        assert!(ks.next_expiry().is_none());
    }

    #[test]
    fn zadd_upsert_semantics() {
        let mut ks = Keyspace::new();
        assert!(ks.zadd(&b("z"), b("a"), 1.0).unwrap());
        assert!(ks.zadd(&b("z"), b("b"), 2.0).unwrap());
        // score update, not a new member
        assert!(!ks.zadd(&b("z"), b("a"), 1.0).unwrap());
        assert_eq!(ks.zscore(b"z", b"a").unwrap(), Some(1.0));

        let result = ks.zquery(b"z", 1.0, Bytes::new(), 0, 10).unwrap();
        assert_eq!(result, vec![(b("a"), 1.0), (b("b"), 2.0)]);
    }

    #[test]
    fn zrem_member() {
        let mut ks = Keyspace::new();
        ks.zadd(&b("z"), b("a"), 1.0).unwrap();
        assert!(ks.zrem(b"z", b"a").unwrap());
        assert!(!ks.zrem(b"z", b"a").unwrap());
        assert!(!ks.zrem(b"nokey", b"a").unwrap());
    }

    #[test]
    fn pexpire_missing_key() {
        let mut ks = Keyspace::new();
        assert!(!ks.pexpire(&b("nokey"), 1000));
    }

    #[test]
    fn pttl_reports_remaining() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v")).unwrap();
        assert_eq!(ks.pttl(b"k"), TtlResult::NoExpiry);
        assert_eq!(ks.pttl(b"missing"), TtlResult::NotFound);

        ks.pexpire(&b("k"), 1000);
        match ks.pttl(b"k") {
            TtlResult::Milliseconds(ms) => assert!(ms <= 1000),
            other => panic!("expected Milliseconds, got {other:?}"),
        }
    }

    #[test]
    fn pttl_is_non_increasing() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v")).unwrap();
        ks.pexpire(&b("k"), 5000);

        let first = match ks.pttl(b"k") {
            TtlResult::Milliseconds(ms) => ms,
            other => panic!("expected Milliseconds, got {other:?}"),
        };
        thread::sleep(Duration::from_millis(5));
        let second = match ks.pttl(b"k") {
            TtlResult::Milliseconds(ms) => ms,
            other => panic!("expected Milliseconds, got {other:?}"),
        };
        assert!(second <= first);
    }

    #[test]
    fn negative_ttl_disarms() {
        let mut ks = Keyspace::new();
        ks.set(b("k"), b("v")).unwrap();
        ks.pexpire(&b("k"), 10_000);
        assert!(ks.pexpire(&b("k"), -1));
        assert_eq!(ks.pttl(b"k"), TtlResult::NoExpiry);
        assert!(ks.next_expiry().is_none());
        // disarming an unarmed key is a no-op that still reports existence
        assert!(ks.pexpire(&b("k"), -1));
    }

    #[test]
    fn rearming_updates_in_place() {
        let mut ks = Keyspace::new();
        ks.set(b("a"), b("1")).unwrap();
        ks.set(b("b"), b("2")).unwrap();
        ks.pexpire(&b("a"), 50_000);
        ks.pexpire(&b("b"), 60_000);

        // one heap slot per armed key, even after rearming
        ks.pexpire(&b("a"), 70_000);
        ks.pexpire(&b("a"), 40_000);
        match ks.pttl(b"a") {
            TtlResult::Milliseconds(ms) => assert!(ms > 30_000 && ms <= 40_000),
            other => panic!("expected Milliseconds, got {other:?}"),
        }
    }

    #[test]
    fn expire_due_collects_due_keys() {
        let mut ks = Keyspace::new();
        ks.set(b("gone"), b("v")).unwrap();
        ks.set(b("stays"), b("v")).unwrap();
        ks.pexpire(&b("gone"), 0);
        ks.pexpire(&b("stays"), 60_000);

        thread::sleep(Duration::from_millis(2));
        assert_eq!(ks.expire_due(100), 1);
        assert_eq!(ks.get(b"gone").unwrap(), None);
        assert_eq!(ks.get(b"stays").unwrap(), Some(b("v")));
        assert_eq!(ks.expired_total(), 1);
    }

    #[test]
    fn expire_due_respects_budget() {
        let mut ks = Keyspace::new();
        for i in 0..10 {
            let key = Bytes::from(format!("k{i}"));
            ks.set(key.clone(), b("v")).unwrap();
            ks.pexpire(&key, 0);
        }
        thread::sleep(Duration::from_millis(2));
        assert_eq!(ks.expire_due(4), 4);
        assert_eq!(ks.len(), 6);
        assert_eq!(ks.expire_due(100), 6);
        assert_eq!(ks.len(), 0);
    }

    #[test]
    fn next_expiry_tracks_heap_top() {
        let mut ks = Keyspace::new();
        assert!(ks.next_expiry().is_none());
        ks.set(b("a"), b("1")).unwrap();
        ks.set(b("b"), b("2")).unwrap();
        ks.pexpire(&b("a"), 50_000);
        ks.pexpire(&b("b"), 10_000);

        let top = ks.next_expiry().unwrap();
        match ks.pttl(b"b") {
            TtlResult::Milliseconds(ms) => {
                // heap top must correspond to the sooner key
                assert!(top <= time::now_us() + (ms + 1) * 1000);
            }
            other => panic!("expected Milliseconds, got {other:?}"),
        }
    }

    #[test]
    fn keys_lists_everything() {
        let mut ks = Keyspace::new();
        ks.set(b("a"), b("1")).unwrap();
        ks.zadd(&b("z"), b("m"), 1.0).unwrap();
        let mut keys = ks.keys();
        keys.sort();
        assert_eq!(keys, vec![b("a"), b("z")]);
    }
}
