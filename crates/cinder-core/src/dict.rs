//! Progressive-rehashing chained hash table.
//!
//! `Dict` is the primary keyspace map and the name index inside every
//! sorted set. It keeps two internal tables: `primary`, where all new
//! nodes land, and an optional `resizing` table holding nodes that have
//! not yet been migrated after a growth event. Every mutating call
//! migrates a bounded chunk of nodes (`REHASH_WORK`), so a resize never
//! stalls a single operation on a large table.
//!
//! Keys are binary-safe `Bytes`. Each node stores its 64-bit hash code,
//! computed once on insert; lookups compare hash codes before falling
//! back to byte equality, and migration reuses the stored code instead
//! of rehashing.
//!
//! Invariants:
//! - every key lives in exactly one of {primary, resizing};
//! - `len()` equals the number of live nodes across both tables;
//! - `primary` load factor stays below `MAX_LOAD_FACTOR` outside of an
//!   in-progress migration.

use ahash::RandomState;
use bytes::Bytes;

/// Smallest bucket-array size. Always a power of two.
const MIN_CAPACITY: usize = 4;

/// Chain nodes per bucket (on average) before a resize starts.
const MAX_LOAD_FACTOR: usize = 8;

/// Nodes migrated from `resizing` to `primary` per mutating call.
const REHASH_WORK: usize = 128;

type Link<V> = Option<Box<Node<V>>>;

#[derive(Debug)]
struct Node<V> {
    hash: u64,
    key: Bytes,
    value: V,
    next: Link<V>,
}

/// One fixed-size open-chained table. Capacity is a power of two so the
/// bucket index is `hash & mask`.
#[derive(Debug)]
struct Table<V> {
    buckets: Vec<Link<V>>,
    mask: u64,
    len: usize,
}

impl<V> Table<V> {
    fn new() -> Self {
        Table {
            buckets: Vec::new(),
            mask: 0,
            len: 0,
        }
    }

    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mut buckets = Vec::new();
        buckets.resize_with(capacity, || None);
        Table {
            buckets,
            mask: capacity as u64 - 1,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Prepends a node to its bucket's chain. O(1).
    fn insert(&mut self, mut node: Box<Node<V>>) {
        let pos = (node.hash & self.mask) as usize;
        node.next = self.buckets[pos].take();
        self.buckets[pos] = Some(node);
        self.len += 1;
    }

    fn get(&self, hash: u64, key: &[u8]) -> Option<&V> {
        if self.buckets.is_empty() {
            return None;
        }
        let pos = (hash & self.mask) as usize;
        let mut cur = self.buckets[pos].as_deref();
        while let Some(node) = cur {
            if node.hash == hash && node.key.as_ref() == key {
                return Some(&node.value);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn get_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut V> {
        if self.buckets.is_empty() {
            return None;
        }
        let pos = (hash & self.mask) as usize;
        let mut cur = self.buckets[pos].as_deref_mut();
        while let Some(node) = cur {
            if node.hash == hash && node.key.as_ref() == key {
                return Some(&mut node.value);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Unlinks the node for `key` from its chain and returns ownership
    /// of it. The chain is rebuilt as it is walked; relative order of
    /// the survivors is irrelevant for a hash bucket.
    fn take(&mut self, hash: u64, key: &[u8]) -> Option<Box<Node<V>>> {
        if self.buckets.is_empty() {
            return None;
        }
        let pos = (hash & self.mask) as usize;
        let mut cur = self.buckets[pos].take();
        let mut kept: Link<V> = None;
        let mut found = None;
        while let Some(mut node) = cur {
            cur = node.next.take();
            if found.is_none() && node.hash == hash && node.key.as_ref() == key {
                found = Some(node);
            } else {
                node.next = kept;
                kept = Some(node);
            }
        }
        self.buckets[pos] = kept;
        if found.is_some() {
            self.len -= 1;
        }
        found
    }

    /// Detaches the head node of the first non-empty bucket at or after
    /// `pos`, returning it plus the bucket index it came from.
    fn take_any(&mut self, mut pos: usize) -> Option<(Box<Node<V>>, usize)> {
        while pos < self.buckets.len() {
            if let Some(mut node) = self.buckets[pos].take() {
                self.buckets[pos] = node.next.take();
                self.len -= 1;
                return Some((node, pos));
            }
            pos += 1;
        }
        None
    }

    fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> {
        self.buckets.iter().flat_map(|bucket| {
            let mut cur = bucket.as_deref();
            std::iter::from_fn(move || {
                let node = cur?;
                cur = node.next.as_deref();
                Some((&node.key, &node.value))
            })
        })
    }
}

/// Hash map with incremental migration.
#[derive(Debug)]
pub struct Dict<V> {
    primary: Table<V>,
    resizing: Option<Table<V>>,
    /// Bucket cursor into `resizing` for the next migration chunk.
    migrate_pos: usize,
    hasher: RandomState,
}

impl<V> Dict<V> {
    pub fn new() -> Self {
        Dict {
            primary: Table::new(),
            resizing: None,
            migrate_pos: 0,
            hasher: RandomState::new(),
        }
    }

    /// Number of live entries across both tables.
    pub fn len(&self) -> usize {
        self.primary.len + self.resizing.as_ref().map_or(0, |t| t.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Inserts or replaces. Returns the previous value if the key was
    /// already present.
    pub fn insert(&mut self, key: Bytes, value: V) -> Option<V> {
        let hash = self.hash(&key);

        // in-place update keeps the "at most one table" invariant: the
        // node stays wherever it currently lives
        if let Some(slot) = self.get_mut_hashed(hash, &key) {
            let old = std::mem::replace(slot, value);
            self.help_rehash();
            return Some(old);
        }

        if self.primary.buckets.is_empty() {
            self.primary = Table::with_capacity(MIN_CAPACITY);
        }
        self.primary.insert(Box::new(Node {
            hash,
            key,
            value,
            next: None,
        }));

        if self.resizing.is_none() && self.primary.len / self.primary.capacity() >= MAX_LOAD_FACTOR
        {
            self.start_resize();
        }
        self.help_rehash();
        None
    }

    /// Looks up a value, advancing the migration by one work chunk.
    pub fn find(&mut self, key: &[u8]) -> Option<&mut V> {
        self.help_rehash();
        let hash = self.hash(key);
        self.get_mut_hashed(hash, key)
    }

    /// Read-only lookup. Consults both tables but does not migrate.
    pub fn peek(&self, key: &[u8]) -> Option<&V> {
        let hash = self.hash(key);
        self.primary
            .get(hash, key)
            .or_else(|| self.resizing.as_ref().and_then(|t| t.get(hash, key)))
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        self.help_rehash();
        let hash = self.hash(key);
        let node = self.primary.take(hash, key).or_else(|| {
            self.resizing
                .as_mut()
                .and_then(|t| t.take(hash, key))
        })?;
        Some(node.value)
    }

    /// Iterates over every entry in both tables, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> {
        self.primary
            .iter()
            .chain(self.resizing.iter().flat_map(|t| t.iter()))
    }

    fn get_mut_hashed(&mut self, hash: u64, key: &[u8]) -> Option<&mut V> {
        if self.primary.get(hash, key).is_some() {
            return self.primary.get_mut(hash, key);
        }
        self.resizing.as_mut().and_then(|t| t.get_mut(hash, key))
    }

    /// Moves the current contents aside and doubles the primary table.
    fn start_resize(&mut self) {
        debug_assert!(self.resizing.is_none());
        let new_capacity = self.primary.capacity() * 2;
        let old = std::mem::replace(&mut self.primary, Table::with_capacity(new_capacity));
        self.resizing = Some(old);
        self.migrate_pos = 0;
    }

    /// Migrates up to `REHASH_WORK` nodes from `resizing` into `primary`.
    fn help_rehash(&mut self) {
        let Some(resizing) = self.resizing.as_mut() else {
            return;
        };

        let mut moved = 0;
        while moved < REHASH_WORK {
            if self.migrate_pos >= resizing.capacity() {
                self.migrate_pos = 0;
            }
            match resizing.take_any(self.migrate_pos) {
                Some((node, pos)) => {
                    self.migrate_pos = pos;
                    self.primary.insert(node);
                    moved += 1;
                }
                None => break,
            }
        }

        if resizing.len == 0 {
            self.resizing = None;
            self.migrate_pos = 0;
        }
    }

    /// Whether a migration is in progress. Exposed for tests.
    #[cfg(test)]
    fn is_migrating(&self) -> bool {
        self.resizing.is_some()
    }
}

impl<V> Default for Dict<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> Bytes {
        Bytes::from(format!("key:{i}"))
    }

    #[test]
    fn insert_and_find() {
        let mut d = Dict::new();
        assert!(d.insert(Bytes::from("a"), 1).is_none());
        assert_eq!(d.find(b"a"), Some(&mut 1));
        assert_eq!(d.peek(b"a"), Some(&1));
        assert_eq!(d.find(b"b"), None);
    }

    #[test]
    fn insert_replaces() {
        let mut d = Dict::new();
        d.insert(Bytes::from("a"), 1);
        assert_eq!(d.insert(Bytes::from("a"), 2), Some(1));
        assert_eq!(d.len(), 1);
        assert_eq!(d.peek(b"a"), Some(&2));
    }

    #[test]
    fn remove_returns_value() {
        let mut d = Dict::new();
        d.insert(Bytes::from("a"), 7);
        assert_eq!(d.remove(b"a"), Some(7));
        assert_eq!(d.remove(b"a"), None);
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn len_matches_live_nodes() {
        let mut d = Dict::new();
        for i in 0..500 {
            d.insert(key(i), i);
        }
        assert_eq!(d.len(), 500);
        for i in 0..250 {
            assert_eq!(d.remove(&key(i)), Some(i));
        }
        assert_eq!(d.len(), 250);
        for i in 250..500 {
            assert_eq!(d.peek(&key(i)), Some(&i));
        }
    }

    #[test]
    fn migration_triggers_and_completes() {
        let mut d = Dict::new();
        // MIN_CAPACITY * MAX_LOAD_FACTOR inserts force at least one resize
        let n = MIN_CAPACITY * MAX_LOAD_FACTOR * 4;
        let mut saw_migration = false;
        for i in 0..n {
            d.insert(key(i), i);
            saw_migration |= d.is_migrating();
        }
        assert!(saw_migration, "expected a resize to start");

        // every key is still reachable mid- or post-migration
        for i in 0..n {
            assert_eq!(d.peek(&key(i)), Some(&i));
        }
    }

    #[test]
    fn migration_liveness() {
        let mut d = Dict::new();
        let mut i = 0;
        // insert until a migration is in progress
        while !d.is_migrating() {
            d.insert(key(i), i);
            i += 1;
        }
        let backlog = d.resizing.as_ref().map(|t| t.len).unwrap_or(0);

        // each subsequent operation moves up to REHASH_WORK nodes, so the
        // resizing table must drain within ceil(backlog / REHASH_WORK) ops
        let budget = backlog.div_ceil(REHASH_WORK);
        for _ in 0..budget {
            d.find(b"nonexistent");
        }
        assert!(!d.is_migrating(), "migration did not finish in {budget} ops");
    }

    #[test]
    fn exactly_one_table_holds_each_key() {
        let mut d = Dict::new();
        let n = 300;
        for i in 0..n {
            d.insert(key(i), i);
        }
        for i in 0..n {
            let k = key(i);
            let hash = d.hash(&k);
            let in_primary = d.primary.get(hash, &k).is_some();
            let in_resizing = d
                .resizing
                .as_ref()
                .map(|t| t.get(hash, &k).is_some())
                .unwrap_or(false);
            assert!(
                in_primary ^ in_resizing,
                "key {i}: primary={in_primary} resizing={in_resizing}"
            );
        }
    }

    #[test]
    fn iter_covers_both_tables() {
        let mut d = Dict::new();
        let n = 200;
        for i in 0..n {
            d.insert(key(i), i);
        }
        let mut seen: Vec<usize> = d.iter().map(|(_, v)| *v).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn binary_keys() {
        let mut d = Dict::new();
        let k = Bytes::from_static(&[0u8, 1, 2, 255]);
        d.insert(k.clone(), "bin");
        assert_eq!(d.peek(&k), Some(&"bin"));
    }

    #[test]
    fn empty_dict_lookups() {
        let mut d: Dict<i32> = Dict::new();
        assert_eq!(d.find(b"x"), None);
        assert_eq!(d.peek(b"x"), None);
        assert_eq!(d.remove(b"x"), None);
        assert!(d.is_empty());
    }
}
