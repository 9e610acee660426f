//! Ordered balanced binary search tree with rank navigation.
//!
//! Every node tracks its height and the size of its subtree, which
//! makes signed rank-offset moves (`offset`) O(log n): the walk climbs
//! or descends using subtree counts instead of stepping one node at a
//! time. The sorted-set query path relies on this to skip `offset`
//! results cheaply.
//!
//! Nodes live in a slot arena and reference each other through `u32`
//! handles, including a parent handle used by the bottom-up rebalance
//! after insert and delete. A freed slot goes on an intrusive free
//! list and is reused by the next insert. Handles are stable for the
//! lifetime of the node, so external indices (the sorted set's name
//! table) can hold them.

/// Handle to a tree node. Stable until the node is removed.
pub type NodeId = u32;

/// Null handle.
const NIL: NodeId = u32::MAX;

#[derive(Debug)]
struct Node<T> {
    item: T,
    left: NodeId,
    right: NodeId,
    parent: NodeId,
    height: u32,
    /// Number of nodes in the subtree rooted here, self included.
    count: u32,
}

#[derive(Debug)]
enum Slot<T> {
    Used(Node<T>),
    Free { next: NodeId },
}

#[derive(Debug)]
pub struct AvlTree<T> {
    slots: Vec<Slot<T>>,
    free_head: NodeId,
    root: NodeId,
    len: usize,
}

impl<T: Ord> AvlTree<T> {
    pub fn new() -> Self {
        AvlTree {
            slots: Vec::new(),
            free_head: NIL,
            root: NIL,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrows the item stored at `id`.
    pub fn item(&self, id: NodeId) -> &T {
        &self.node(id).item
    }

    /// Inserts an item and returns its handle. Items comparing equal to
    /// an existing one are placed to its right; callers that need
    /// set semantics must check for duplicates themselves.
    pub fn insert(&mut self, item: T) -> NodeId {
        let id = self.alloc(item);
        if self.root == NIL {
            self.root = id;
            return id;
        }

        let mut cur = self.root;
        loop {
            let go_left = self.node(id).item < self.node(cur).item;
            let next = if go_left {
                self.node(cur).left
            } else {
                self.node(cur).right
            };
            if next == NIL {
                if go_left {
                    self.node_mut(cur).left = id;
                } else {
                    self.node_mut(cur).right = id;
                }
                self.node_mut(id).parent = cur;
                break;
            }
            cur = next;
        }

        self.rebalance(cur);
        id
    }

    /// Removes the node at `id` and returns its item. Remaining handles
    /// stay valid: deletion splices the in-order successor into the
    /// removed node's position rather than moving other nodes' slots.
    pub fn remove(&mut self, id: NodeId) -> T {
        let left = self.node(id).left;
        let right = self.node(id).right;
        let parent = self.node(id).parent;

        if right == NIL {
            // no right subtree: the left child (possibly NIL) takes our place
            if left != NIL {
                self.node_mut(left).parent = parent;
            }
            self.replace_child(parent, id, left);
            if parent != NIL {
                self.rebalance(parent);
            }
        } else {
            // two-child case: splice in the in-order successor, the
            // leftmost node of the right subtree
            let mut succ = right;
            while self.node(succ).left != NIL {
                succ = self.node(succ).left;
            }
            let sp = self.node(succ).parent;
            let sr = self.node(succ).right;

            if sp == id {
                // successor is our direct right child; it keeps its own
                // right subtree and adopts our left one
                self.node_mut(succ).left = left;
                if left != NIL {
                    self.node_mut(left).parent = succ;
                }
                self.node_mut(succ).parent = parent;
                self.replace_child(parent, id, succ);
                self.rebalance(succ);
            } else {
                // detach the successor from the left spine first
                self.node_mut(sp).left = sr;
                if sr != NIL {
                    self.node_mut(sr).parent = sp;
                }
                // then graft it into the removed node's position
                self.node_mut(succ).left = left;
                self.node_mut(succ).right = right;
                if left != NIL {
                    self.node_mut(left).parent = succ;
                }
                self.node_mut(right).parent = succ;
                self.node_mut(succ).parent = parent;
                self.replace_child(parent, id, succ);
                // heights changed from the splice point upward
                self.rebalance(sp);
            }
        }

        self.free(id)
    }

    /// Finds the smallest item that is `>= key`.
    pub fn seek_ge(&self, key: &T) -> Option<NodeId> {
        let mut found = None;
        let mut cur = self.root;
        while cur != NIL {
            if self.node(cur).item < *key {
                cur = self.node(cur).right;
            } else {
                found = Some(cur);
                cur = self.node(cur).left;
            }
        }
        found
    }

    /// Walks `delta` positions through the in-order sequence from `id`
    /// (positive = forward, negative = backward), using subtree counts
    /// to move O(log n) instead of stepping. Returns `None` when the
    /// target rank falls outside the tree.
    pub fn offset(&self, id: NodeId, delta: i64) -> Option<NodeId> {
        let mut pos: i64 = 0;
        let mut cur = id;
        while pos != delta {
            let right = self.node(cur).right;
            let left = self.node(cur).left;
            if pos < delta && pos + self.count(right) as i64 >= delta {
                // target is inside the right subtree
                cur = right;
                pos += self.count(self.node(cur).left) as i64 + 1;
            } else if pos > delta && pos - (self.count(left) as i64) <= delta {
                // target is inside the left subtree
                cur = left;
                pos -= self.count(self.node(cur).right) as i64 + 1;
            } else {
                // climb toward the root, adjusting our rank
                let parent = self.node(cur).parent;
                if parent == NIL {
                    return None;
                }
                if self.node(parent).right == cur {
                    pos -= self.count(self.node(cur).left) as i64 + 1;
                } else {
                    pos += self.count(self.node(cur).right) as i64 + 1;
                }
                cur = parent;
            }
        }
        Some(cur)
    }

    /// In-order successor.
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        self.offset(id, 1)
    }

    // -- node plumbing --

    fn node(&self, id: NodeId) -> &Node<T> {
        match &self.slots[id as usize] {
            Slot::Used(node) => node,
            Slot::Free { .. } => unreachable!("dangling tree handle"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        match &mut self.slots[id as usize] {
            Slot::Used(node) => node,
            Slot::Free { .. } => unreachable!("dangling tree handle"),
        }
    }

    fn height(&self, id: NodeId) -> u32 {
        if id == NIL {
            0
        } else {
            self.node(id).height
        }
    }

    fn count(&self, id: NodeId) -> u32 {
        if id == NIL {
            0
        } else {
            self.node(id).count
        }
    }

    fn alloc(&mut self, item: T) -> NodeId {
        let node = Node {
            item,
            left: NIL,
            right: NIL,
            parent: NIL,
            height: 1,
            count: 1,
        };
        self.len += 1;
        if self.free_head != NIL {
            let id = self.free_head;
            match std::mem::replace(&mut self.slots[id as usize], Slot::Used(node)) {
                Slot::Free { next } => self.free_head = next,
                Slot::Used(_) => unreachable!("free list pointed at a live node"),
            }
            id
        } else {
            let id = self.slots.len() as NodeId;
            self.slots.push(Slot::Used(node));
            id
        }
    }

    fn free(&mut self, id: NodeId) -> T {
        let slot = std::mem::replace(
            &mut self.slots[id as usize],
            Slot::Free {
                next: self.free_head,
            },
        );
        self.free_head = id;
        self.len -= 1;
        match slot {
            Slot::Used(node) => node.item,
            Slot::Free { .. } => unreachable!("double free of tree node"),
        }
    }

    /// Recomputes height and subtree count from the children.
    fn update(&mut self, id: NodeId) {
        let (l, r) = {
            let n = self.node(id);
            (n.left, n.right)
        };
        let height = 1 + self.height(l).max(self.height(r));
        let count = 1 + self.count(l) + self.count(r);
        let n = self.node_mut(id);
        n.height = height;
        n.count = count;
    }

    /// Points `parent`'s child link (or the root) from `old` to `new`.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if parent == NIL {
            self.root = new;
        } else if self.node(parent).left == old {
            self.node_mut(parent).left = new;
        } else {
            self.node_mut(parent).right = new;
        }
    }

    fn rotate_left(&mut self, x: NodeId) -> NodeId {
        let y = self.node(x).right;
        let parent = self.node(x).parent;
        let yl = self.node(y).left;

        self.node_mut(x).right = yl;
        if yl != NIL {
            self.node_mut(yl).parent = x;
        }
        self.node_mut(y).left = x;
        self.node_mut(x).parent = y;
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, y);

        self.update(x);
        self.update(y);
        y
    }

    fn rotate_right(&mut self, x: NodeId) -> NodeId {
        let y = self.node(x).left;
        let parent = self.node(x).parent;
        let yr = self.node(y).right;

        self.node_mut(x).left = yr;
        if yr != NIL {
            self.node_mut(yr).parent = x;
        }
        self.node_mut(y).right = x;
        self.node_mut(x).parent = y;
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, y);

        self.update(x);
        self.update(y);
        y
    }

    /// Walks from `id` to the root, refreshing heights and counts and
    /// rotating wherever the balance factor reaches two.
    fn rebalance(&mut self, mut id: NodeId) {
        while id != NIL {
            self.update(id);
            let (l, r) = {
                let n = self.node(id);
                (n.left, n.right)
            };
            let (lh, rh) = (self.height(l), self.height(r));

            let subtree = if lh == rh + 2 {
                if self.height(self.node(l).left) < self.height(self.node(l).right) {
                    self.rotate_left(l);
                }
                self.rotate_right(id)
            } else if rh == lh + 2 {
                if self.height(self.node(r).right) < self.height(self.node(r).left) {
                    self.rotate_right(r);
                }
                self.rotate_left(id)
            } else {
                id
            };

            id = self.node(subtree).parent;
        }
    }
}

impl<T: Ord> Default for AvlTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    impl<T: Ord> AvlTree<T> {
        /// Asserts the AVL and subtree-count invariants over the whole
        /// tree, returning (height, count) of the checked subtree.
        fn check(&self) -> (u32, u32) {
            if self.root != NIL {
                assert_eq!(self.node(self.root).parent, NIL);
            }
            self.check_subtree(self.root)
        }

        fn check_subtree(&self, id: NodeId) -> (u32, u32) {
            if id == NIL {
                return (0, 0);
            }
            let node = self.node(id);
            if node.left != NIL {
                assert_eq!(self.node(node.left).parent, id, "broken parent link");
                assert!(self.node(node.left).item <= node.item, "ordering violated");
            }
            if node.right != NIL {
                assert_eq!(self.node(node.right).parent, id, "broken parent link");
                assert!(node.item <= self.node(node.right).item, "ordering violated");
            }
            let (lh, lc) = self.check_subtree(node.left);
            let (rh, rc) = self.check_subtree(node.right);
            assert!(lh.abs_diff(rh) <= 1, "balance factor exceeded");
            assert_eq!(node.height, 1 + lh.max(rh), "stale height");
            assert_eq!(node.count, 1 + lc + rc, "stale subtree count");
            (node.height, node.count)
        }

        fn in_order(&self) -> Vec<&T> {
            let mut out = Vec::with_capacity(self.len);
            let mut cur = self.seek_first();
            while let Some(id) = cur {
                out.push(self.item(id));
                cur = self.successor(id);
            }
            out
        }

        fn seek_first(&self) -> Option<NodeId> {
            if self.root == NIL {
                return None;
            }
            let mut cur = self.root;
            while self.node(cur).left != NIL {
                cur = self.node(cur).left;
            }
            Some(cur)
        }
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let mut tree = AvlTree::new();
        for i in 0..200 {
            tree.insert(i);
            tree.check();
        }
        let (height, count) = tree.check();
        assert_eq!(count, 200);
        // a balanced tree of 200 nodes is at most ~1.44*log2(n) tall
        assert!(height <= 11, "height {height} too tall for 200 nodes");
        let got: Vec<i32> = tree.in_order().into_iter().copied().collect();
        assert_eq!(got, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn random_insert_remove_keeps_invariants() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xC1DE);
        let mut values: Vec<i32> = (0..300).collect();
        values.shuffle(&mut rng);

        let mut tree = AvlTree::new();
        let mut ids = Vec::new();
        for &v in &values {
            ids.push((v, tree.insert(v)));
            tree.check();
        }

        ids.shuffle(&mut rng);
        for (v, id) in ids {
            assert_eq!(tree.remove(id), v);
            tree.check();
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn slot_reuse_after_remove() {
        let mut tree = AvlTree::new();
        let a = tree.insert(1);
        tree.remove(a);
        let b = tree.insert(2);
        assert_eq!(a, b, "freed slot should be reused");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn seek_ge_finds_lower_bound() {
        let mut tree = AvlTree::new();
        for i in [10, 20, 30, 40] {
            tree.insert(i);
        }
        assert_eq!(tree.seek_ge(&5).map(|id| *tree.item(id)), Some(10));
        assert_eq!(tree.seek_ge(&20).map(|id| *tree.item(id)), Some(20));
        assert_eq!(tree.seek_ge(&21).map(|id| *tree.item(id)), Some(30));
        assert_eq!(tree.seek_ge(&41), None);
    }

    #[test]
    fn offset_navigates_by_rank() {
        let mut tree = AvlTree::new();
        let mut ids = Vec::new();
        for i in 0..50 {
            ids.push(tree.insert(i));
        }

        let start = tree.seek_ge(&0).unwrap();
        for k in 0..50 {
            let id = tree.offset(start, k).unwrap();
            assert_eq!(*tree.item(id), k as i32);
        }
        // walking backward from the last element
        let last = tree.offset(start, 49).unwrap();
        for k in 0..50 {
            let id = tree.offset(last, -k).unwrap();
            assert_eq!(*tree.item(id), 49 - k as i32);
        }
    }

    #[test]
    fn offset_out_of_range_is_none() {
        let mut tree = AvlTree::new();
        for i in 0..10 {
            tree.insert(i);
        }
        let first = tree.seek_ge(&0).unwrap();
        assert!(tree.offset(first, 10).is_none());
        assert!(tree.offset(first, -1).is_none());
        assert!(tree.offset(first, 9).is_some());
    }

    #[test]
    fn successor_yields_sorted_sequence() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut values: Vec<i32> = (0..100).collect();
        values.shuffle(&mut rng);

        let mut tree = AvlTree::new();
        for v in values {
            tree.insert(v);
        }
        let seen: Vec<i32> = tree.in_order().into_iter().copied().collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
