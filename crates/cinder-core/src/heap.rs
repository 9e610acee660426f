//! Indexed binary min-heap for TTL expiry.
//!
//! Array-backed, ordered by expiry timestamp. Each slot records the key
//! of the entry that owns it, and every operation that moves a slot
//! reports the move through an `on_move(key, new_pos)` callback so the
//! owner can keep its stored heap position current. That position makes
//! TTL updates and removals O(log n): the keyspace jumps straight to
//! the slot instead of searching for it.
//!
//! Invariant: after any operation, for every slot `i` the owning
//! entry's recorded position is `i`, and `expire_at` of a parent never
//! exceeds that of its children.

use bytes::Bytes;

/// One heap slot: when `expire_at` (monotonic microseconds) passes,
/// the entry for `key` is due for collection.
#[derive(Debug, Clone)]
pub struct HeapSlot {
    pub expire_at: u64,
    pub key: Bytes,
}

#[derive(Default)]
pub struct ExpiryHeap {
    slots: Vec<HeapSlot>,
}

impl ExpiryHeap {
    pub fn new() -> Self {
        ExpiryHeap { slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot with the earliest expiry, if any.
    pub fn peek(&self) -> Option<&HeapSlot> {
        self.slots.first()
    }

    /// Expiry timestamp stored at `pos`.
    pub fn expire_at(&self, pos: usize) -> u64 {
        self.slots[pos].expire_at
    }

    /// Adds a slot, reporting every position change (including the
    /// initial placement) through `on_move`.
    pub fn push(&mut self, expire_at: u64, key: Bytes, on_move: &mut dyn FnMut(&[u8], usize)) {
        self.slots.push(HeapSlot { expire_at, key });
        let pos = self.slots.len() - 1;
        on_move(&self.slots[pos].key, pos);
        self.sift_up(pos, on_move);
    }

    /// Pops the minimum slot.
    pub fn pop(&mut self, on_move: &mut dyn FnMut(&[u8], usize)) -> Option<HeapSlot> {
        if self.slots.is_empty() {
            return None;
        }
        let last = self.slots.len() - 1;
        self.slots.swap(0, last);
        let min = self.slots.pop();
        if !self.slots.is_empty() {
            on_move(&self.slots[0].key, 0);
            self.sift_down(0, on_move);
        }
        min
    }

    /// Replaces the expiry at `pos` and restores heap order by sifting
    /// in whichever direction the new value requires.
    pub fn update(&mut self, pos: usize, expire_at: u64, on_move: &mut dyn FnMut(&[u8], usize)) {
        self.slots[pos].expire_at = expire_at;
        if pos > 0 && self.slots[pos].expire_at < self.slots[parent(pos)].expire_at {
            self.sift_up(pos, on_move);
        } else {
            self.sift_down(pos, on_move);
        }
    }

    /// Removes the slot at `pos`: swap with the last slot, shrink, then
    /// re-sift the swapped-in slot if one landed there.
    pub fn remove(&mut self, pos: usize, on_move: &mut dyn FnMut(&[u8], usize)) -> HeapSlot {
        let last = self.slots.len() - 1;
        self.slots.swap(pos, last);
        let removed = self.slots.pop();
        if pos < self.slots.len() {
            on_move(&self.slots[pos].key, pos);
            let at = self.slots[pos].expire_at;
            self.update(pos, at, on_move);
        }
        match removed {
            Some(slot) => slot,
            None => unreachable!("remove on empty heap"),
        }
    }

    fn sift_up(&mut self, mut pos: usize, on_move: &mut dyn FnMut(&[u8], usize)) {
        while pos > 0 {
            let up = parent(pos);
            if self.slots[pos].expire_at >= self.slots[up].expire_at {
                break;
            }
            self.slots.swap(pos, up);
            on_move(&self.slots[pos].key, pos);
            pos = up;
        }
        on_move(&self.slots[pos].key, pos);
    }

    fn sift_down(&mut self, mut pos: usize, on_move: &mut dyn FnMut(&[u8], usize)) {
        let len = self.slots.len();
        loop {
            let left = pos * 2 + 1;
            let right = pos * 2 + 2;
            let mut min = pos;
            if left < len && self.slots[left].expire_at < self.slots[min].expire_at {
                min = left;
            }
            if right < len && self.slots[right].expire_at < self.slots[min].expire_at {
                min = right;
            }
            if min == pos {
                break;
            }
            self.slots.swap(pos, min);
            on_move(&self.slots[pos].key, pos);
            pos = min;
        }
        on_move(&self.slots[pos].key, pos);
    }
}

fn parent(pos: usize) -> usize {
    (pos + 1) / 2 - 1
}
