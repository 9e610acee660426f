//! Sorted set: dual-indexed by (score, name) and by name.
//!
//! Members are ordered by score ascending, ties broken by name
//! lexicographically, so equal (score, name) pairs cannot exist — the
//! name is the identity. The ordered view is an [`AvlTree`] keyed by
//! `(OrderedFloat<f64>, Bytes)`; the point-lookup view is a [`Dict`]
//! from name to the tree handle. Both indices always resolve the same
//! set of live members, and the name buffer is a single refcounted
//! `Bytes` shared between them.

use bytes::Bytes;
use ordered_float::OrderedFloat;

use crate::avl::{AvlTree, NodeId};
use crate::dict::Dict;

type TreeKey = (OrderedFloat<f64>, Bytes);

#[derive(Debug)]
pub struct SortedSet {
    tree: AvlTree<TreeKey>,
    index: Dict<NodeId>,
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet {
            tree: AvlTree::new(),
            index: Dict::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Adds a member or updates its score. Returns `true` if the member
    /// was newly added, `false` for a score update (or no-op).
    ///
    /// A score update relinks only the tree node; the name index keeps
    /// pointing at the member through its (new) handle.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(slot) = self.index.find(&member) {
            let id = *slot;
            if self.tree.item(id).0 .0 == score {
                return false;
            }
            // unlink, set the new score, relink under the new ordering;
            // the name buffer moves with the tree item
            let (_, name) = self.tree.remove(id);
            let new_id = self.tree.insert((OrderedFloat(score), name));
            if let Some(slot) = self.index.find(&member) {
                *slot = new_id;
            }
            false
        } else {
            let id = self.tree.insert((OrderedFloat(score), member.clone()));
            self.index.insert(member, id);
            true
        }
    }

    /// Returns the member's score, if present.
    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.index.peek(member).map(|&id| self.tree.item(id).0 .0)
    }

    /// Removes a member from both indices. Returns `true` if it existed.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.index.remove(member) {
            Some(id) => {
                self.tree.remove(id);
                true
            }
            None => false,
        }
    }

    /// Range query: seeks the smallest member with
    /// `(score, name) >= (min_score, min_name)`, walks `offset` ranks
    /// from there (negative walks backward), then emits up to `limit`
    /// members in order.
    pub fn query(
        &self,
        min_score: f64,
        min_name: Bytes,
        offset: i64,
        limit: usize,
    ) -> Vec<(Bytes, f64)> {
        let key: TreeKey = (OrderedFloat(min_score), min_name);
        let Some(start) = self.tree.seek_ge(&key) else {
            return Vec::new();
        };
        let Some(mut cur) = self.tree.offset(start, offset) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(limit.min(self.len()));
        for _ in 0..limit {
            let (score, name) = self.tree.item(cur);
            out.push((name.clone(), score.0));
            match self.tree.successor(cur) {
                Some(next) => cur = next,
                None => break,
            }
        }
        out
    }

    /// Iterates members in (score, name) order. Test and KEYS-free
    /// introspection helper; command paths use [`SortedSet::query`].
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        let mut cur = self.tree.seek_ge(&(OrderedFloat(f64::NEG_INFINITY), Bytes::new()));
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.tree.successor(id);
            let (score, name) = self.tree.item(id);
            Some((name, score.0))
        })
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}
