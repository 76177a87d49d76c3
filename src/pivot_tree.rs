//! The pivot index: a treap keyed by element index, arena-allocated per
//! Design Notes §9's suggested alternative to parent-linked pointer nodes.
//!
//! Every node marks a previously used pivot position and carries two flags
//! recording whether the segment immediately to its left/right is already
//! fully sorted. The tree always contains two sentinels, at index `-1` and
//! at `n` (the element count), which bracket the array and are never
//! deleted.
//!
//! This module knows nothing about element comparisons; it only orders by
//! `idx` and `priority`. Operations that need to compare element *values*
//! (duplicate coalescing) live one layer up, in the query driver, which
//! calls back into [`PivotTree::set_flags`] and [`PivotTree::delete`] once
//! it has made the comparison.

use std::fmt;

pub(crate) type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Flags(u8);

impl Flags {
    const SORTED_RIGHT: u8 = 0b01;
    const SORTED_LEFT: u8 = 0b10;

    pub(crate) fn unsorted() -> Self {
        Flags(0)
    }

    pub(crate) fn sorted_right(self) -> bool {
        self.0 & Self::SORTED_RIGHT != 0
    }

    pub(crate) fn sorted_left(self) -> bool {
        self.0 & Self::SORTED_LEFT != 0
    }

    pub(crate) fn set_sorted_right(&mut self) {
        self.0 |= Self::SORTED_RIGHT;
    }

    pub(crate) fn set_sorted_left(&mut self) {
        self.0 |= Self::SORTED_LEFT;
    }

    pub(crate) fn name(self) -> &'static str {
        match self.0 {
            0 => "UNSORTED",
            Self::SORTED_RIGHT => "SORTED_RIGHT",
            Self::SORTED_LEFT => "SORTED_LEFT",
            _ => "SORTED_BOTH",
        }
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PivotTreeError {
    /// Attempted to insert a pivot at an index already present in the tree.
    DuplicateIndex,
}

#[derive(Clone, Copy)]
struct Node {
    idx: isize,
    flags: Flags,
    priority: u32,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// Arena-backed treap over pivot indices.
///
/// Nodes live in `slots`; a freed slot is pushed onto `free` and reused by
/// the next insert, so `delete`/`insert` churn doesn't grow the arena
/// unboundedly.
pub(crate) struct PivotTree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    start: NodeId,
    end: NodeId,
}

impl PivotTree {
    /// Builds a fresh tree for an array of `n` elements, containing only
    /// the two sentinels at `-1` and `n`. Priorities for the sentinels are
    /// supplied by the caller (the query driver owns the RNG; this module
    /// stays deterministic and easy to test in isolation).
    pub(crate) fn new(n: usize, neg_one_priority: u32, len_priority: u32) -> Self {
        let mut tree = PivotTree {
            slots: Vec::new(),
            free: Vec::new(),
            root: 0,
            start: 0,
            end: 0,
        };
        let start = tree.alloc(Node {
            idx: -1,
            flags: Flags::unsorted(),
            priority: neg_one_priority,
            parent: None,
            left: None,
            right: None,
        });
        tree.root = start;
        tree.start = start;
        let end = tree
            .insert(n as isize, Flags::unsorted(), len_priority, start)
            .expect("sentinel n cannot collide with sentinel -1 for any n >= 0");
        tree.end = end;
        tree
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Some(node);
            id
        } else {
            self.slots.push(Some(node));
            (self.slots.len() - 1) as NodeId
        }
    }

    fn dealloc(&mut self, id: NodeId) {
        self.slots[id as usize] = None;
        self.free.push(id);
    }

    fn node(&self, id: NodeId) -> &Node {
        self.slots[id as usize]
            .as_ref()
            .expect("NodeId referred to a freed slot")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id as usize]
            .as_mut()
            .expect("NodeId referred to a freed slot")
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn start(&self) -> NodeId {
        self.start
    }

    pub(crate) fn end(&self) -> NodeId {
        self.end
    }

    pub(crate) fn is_sentinel(&self, id: NodeId) -> bool {
        id == self.start || id == self.end
    }

    pub(crate) fn idx(&self, id: NodeId) -> isize {
        self.node(id).idx
    }

    pub(crate) fn flags(&self, id: NodeId) -> Flags {
        self.node(id).flags
    }

    pub(crate) fn set_flags(&mut self, id: NodeId, flags: Flags) {
        self.node_mut(id).flags = flags;
    }

    pub(crate) fn set_sorted_left(&mut self, id: NodeId) {
        self.node_mut(id).flags.set_sorted_left();
    }

    pub(crate) fn set_sorted_right(&mut self, id: NodeId) {
        self.node_mut(id).flags.set_sorted_right();
    }

    pub(crate) fn left_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).left
    }

    pub(crate) fn right_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).right
    }

    /// Number of pivots currently tracked, sentinels included. Mostly for
    /// tests and the "tree doesn't grow unboundedly" property.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn rotate_left(&mut self, node: NodeId) {
        //    p                       p
        //    |                       |
        // +-node-+               +-right-+
        // |      |      -->      |       |
        // a  +-right-+       +-node-+    c
        //    |       |       |      |
        //    b       c       a      b
        let right = self.node(node).right.expect("rotate_left needs a right child");
        let b = self.node(right).left;

        self.node_mut(node).right = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(node);
        }

        let parent = self.node(node).parent;
        self.node_mut(right).parent = parent;
        match parent {
            None => self.root = right,
            Some(p) => {
                if self.node(p).left == Some(node) {
                    self.node_mut(p).left = Some(right);
                } else {
                    self.node_mut(p).right = Some(right);
                }
            }
        }

        self.node_mut(right).left = Some(node);
        self.node_mut(node).parent = Some(right);
    }

    fn rotate_right(&mut self, node: NodeId) {
        //         p              p
        //         |              |
        //     +-node-+       +-left-+
        //     |      |       |      |
        // +-left-+   c  -->  a  +-node-+
        // |      |              |      |
        // a      b              b      c
        let left = self.node(node).left.expect("rotate_right needs a left child");
        let b = self.node(left).right;

        self.node_mut(node).left = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(node);
        }

        let parent = self.node(node).parent;
        self.node_mut(left).parent = parent;
        match parent {
            None => self.root = left,
            Some(p) => {
                if self.node(p).left == Some(node) {
                    self.node_mut(p).left = Some(left);
                } else {
                    self.node_mut(p).right = Some(left);
                }
            }
        }

        self.node_mut(left).right = Some(node);
        self.node_mut(node).parent = Some(left);
    }

    /// Inserts a new pivot at `idx`, descending via ordinary BST
    /// comparisons starting from `start`. `start` must be an ancestor of
    /// `idx`'s eventual position (the tree's root always qualifies;
    /// passing anything else requires the caller to know the tree's
    /// shape). Restores the heap order by rotating the new node up while
    /// its priority exceeds its parent's.
    pub(crate) fn insert(
        &mut self,
        idx: isize,
        flags: Flags,
        priority: u32,
        start: NodeId,
    ) -> Result<NodeId, PivotTreeError> {
        let mut current = start;
        loop {
            let cur_idx = self.node(current).idx;
            if idx < cur_idx {
                match self.node(current).left {
                    Some(l) => current = l,
                    None => break,
                }
            } else if idx > cur_idx {
                match self.node(current).right {
                    Some(r) => current = r,
                    None => break,
                }
            } else {
                return Err(PivotTreeError::DuplicateIndex);
            }
        }

        let parent_idx = self.node(current).idx;
        let node_id = self.alloc(Node {
            idx,
            flags,
            priority,
            parent: Some(current),
            left: None,
            right: None,
        });
        if idx < parent_idx {
            self.node_mut(current).left = Some(node_id);
        } else {
            self.node_mut(current).right = Some(node_id);
        }

        loop {
            let parent = self.node(node_id).parent;
            match parent {
                Some(p) if self.node(p).priority < self.node(node_id).priority => {
                    if self.node(p).left == Some(node_id) {
                        self.rotate_right(p);
                    } else {
                        self.rotate_left(p);
                    }
                }
                _ => break,
            }
        }

        Ok(node_id)
    }

    /// Replaces the subtree rooted at `old` with `new` from `old`'s
    /// parent's point of view.
    fn splice(&mut self, old: NodeId, new: Option<NodeId>) {
        let parent = self.node(old).parent;
        if let Some(new_id) = new {
            self.node_mut(new_id).parent = parent;
        }
        match parent {
            None => {
                self.root = new.expect("sentinels keep the tree non-empty");
            }
            Some(p) => {
                if self.node(p).left == Some(old) {
                    self.node_mut(p).left = new;
                } else {
                    self.node_mut(p).right = new;
                }
            }
        }
    }

    /// Merges two treaps into one, preserving BST order on `idx` and
    /// max-heap order on `priority`. Requires every key in `left` to be
    /// less than every key in `right`.
    fn merge(&mut self, left: NodeId, right: NodeId) -> NodeId {
        debug_assert!(self.node(left).idx < self.node(right).idx);

        if self.node(left).priority > self.node(right).priority {
            let merged = match self.node(left).right {
                Some(lr) => self.merge(lr, right),
                None => right,
            };
            self.node_mut(left).right = Some(merged);
            self.node_mut(merged).parent = Some(left);
            left
        } else {
            let merged = match self.node(right).left {
                Some(rl) => self.merge(left, rl),
                None => left,
            };
            self.node_mut(right).left = Some(merged);
            self.node_mut(merged).parent = Some(right);
            right
        }
    }

    /// Deletes `node` from the tree. Never call this on a sentinel.
    pub(crate) fn delete(&mut self, node: NodeId) {
        debug_assert!(!self.is_sentinel(node), "sentinels are never deleted");

        let left = self.node(node).left;
        let right = self.node(node).right;
        match (left, right) {
            (None, _) => self.splice(node, right),
            (Some(_), None) => self.splice(node, left),
            (Some(l), Some(r)) => {
                let merged = self.merge(l, r);
                self.splice(node, Some(merged));
            }
        }
        self.dealloc(node);
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(l) = self.node(id).left {
            id = l;
        }
        id
    }

    /// In-order successor of `node`, or `None` if `node` is the last pivot
    /// (only the `n` sentinel has no successor).
    pub(crate) fn successor(&self, node: NodeId) -> Option<NodeId> {
        if let Some(r) = self.node(node).right {
            return Some(self.leftmost(r));
        }
        let mut cur = node;
        loop {
            match self.node(cur).parent {
                Some(p) => {
                    if self.node(p).left == Some(cur) {
                        return Some(p);
                    }
                    cur = p;
                }
                None => return None,
            }
        }
    }

    /// Finds the bracketing pivots around `k`: the last node with
    /// `idx < k` seen along the descent (`left`), and the last node with
    /// `idx > k` (`right`). If a node has `idx == k`, it is returned as
    /// `left`; `right` is then whatever was last recorded and must not be
    /// relied upon by the caller.
    pub(crate) fn bracket(&self, k: isize) -> (NodeId, NodeId) {
        let mut left = self.start;
        let mut right = self.end;
        let mut current = Some(self.root);
        while let Some(id) = current {
            let node_idx = self.node(id).idx;
            if node_idx < k {
                left = id;
                current = self.node(id).right;
            } else if node_idx > k {
                right = id;
                current = self.node(id).left;
            } else {
                left = id;
                break;
            }
        }
        (left, right)
    }

    /// Called after the range strictly between `left` and `right` has just
    /// been fully sorted (and the appropriate flags set on both). Removes
    /// either pivot that now sits between two sorted runs, since it has
    /// become redundant. Sentinels are never removed even if both of their
    /// flags end up set.
    pub(crate) fn depivot(&mut self, left: NodeId, right: NodeId) {
        let both_sorted = |flags: Flags| flags.sorted_left() && flags.sorted_right();
        if !self.is_sentinel(left) && both_sorted(self.flags(left)) {
            self.delete(left);
        }
        if !self.is_sentinel(right) && both_sorted(self.flags(right)) {
            self.delete(right);
        }
    }

    /// Visits every node in ascending `idx` order.
    pub(crate) fn inorder_for_each(&self, mut f: impl FnMut(NodeId)) {
        fn walk(tree: &PivotTree, id: NodeId, f: &mut impl FnMut(NodeId)) {
            if let Some(l) = tree.node(id).left {
                walk(tree, l, f);
            }
            f(id);
            if let Some(r) = tree.node(id).right {
                walk(tree, r, f);
            }
        }
        walk(self, self.root, &mut f);
    }

    /// Debug-only consistency check: unique/ordered indices, BST+heap
    /// order, parent/child agreement, and flag symmetry. Intended for
    /// tests, not release code.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        fn walk(tree: &PivotTree, id: NodeId, lo: isize, hi: isize) {
            let node = tree.node(id);
            assert!(node.idx > lo && node.idx < hi, "BST order violated at {id}");
            if let Some(l) = node.left {
                assert_eq!(tree.node(l).parent, Some(id));
                assert!(tree.node(l).priority <= node.priority, "heap order violated");
                walk(tree, l, lo, node.idx);
            }
            if let Some(r) = node.right {
                assert_eq!(tree.node(r).parent, Some(id));
                assert!(tree.node(r).priority <= node.priority, "heap order violated");
                walk(tree, r, node.idx, hi);
            }
        }
        assert_eq!(self.node(self.root).parent, None);
        walk(self, self.root, isize::MIN, isize::MAX);

        let mut prev: Option<NodeId> = None;
        self.inorder_for_each(|id| {
            if let Some(p) = prev {
                assert_eq!(
                    self.flags(p).sorted_right(),
                    self.flags(id).sorted_left(),
                    "flag symmetry violated between {p} and {id}"
                );
            }
            prev = Some(id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inorder_idxs(tree: &PivotTree) -> Vec<isize> {
        let mut out = Vec::new();
        tree.inorder_for_each(|id| out.push(tree.idx(id)));
        out
    }

    /// Inserts `idx`, always descending from the current root so the
    /// choice of hint never depends on where a previous rotation left it.
    fn insert(tree: &mut PivotTree, idx: isize, flags: Flags, priority: u32) -> NodeId {
        let root = tree.root();
        tree.insert(idx, flags, priority, root).unwrap()
    }

    #[test]
    fn new_tree_has_only_sentinels() {
        let tree = PivotTree::new(10, 5, 7);
        assert_eq!(inorder_idxs(&tree), vec![-1, 10]);
        assert_eq!(tree.len(), 2);
        tree.assert_invariants();
    }

    #[test]
    fn insert_maintains_bst_order() {
        let mut tree = PivotTree::new(100, 50, 3);
        let mut priority = 10u32;
        for k in [42, 10, 90, 5, 60] {
            insert(&mut tree, k, Flags::unsorted(), priority);
            priority += 1;
        }
        tree.assert_invariants();
        assert_eq!(inorder_idxs(&tree), vec![-1, 5, 10, 42, 60, 90, 100]);
    }

    #[test]
    fn insert_duplicate_index_errors() {
        let mut tree = PivotTree::new(10, 1, 1);
        insert(&mut tree, 4, Flags::unsorted(), 99);
        let root = tree.root();
        assert_eq!(
            tree.insert(4, Flags::unsorted(), 50, root),
            Err(PivotTreeError::DuplicateIndex)
        );
    }

    #[test]
    fn delete_preserves_order_and_successor_chain() {
        let mut tree = PivotTree::new(100, 50, 3);
        let mut ids = Vec::new();
        let mut priority = 1u32;
        for k in [42, 10, 90, 5, 60, 70, 20] {
            ids.push(insert(&mut tree, k, Flags::unsorted(), priority));
            priority += 3;
        }
        tree.assert_invariants();

        // delete a leaf, a one-child node, and a two-child node in turn
        tree.delete(ids[1]); // 10
        tree.assert_invariants();
        tree.delete(ids[0]); // 42
        tree.assert_invariants();

        let remaining: Vec<isize> = inorder_idxs(&tree);
        assert_eq!(remaining, vec![-1, 5, 20, 60, 70, 90, 100]);
    }

    #[test]
    fn successor_walks_in_order() {
        let mut tree = PivotTree::new(100, 50, 3);
        let mut priority = 1u32;
        for k in [42, 10, 90, 5, 60] {
            insert(&mut tree, k, Flags::unsorted(), priority);
            priority += 1;
        }

        let order = inorder_idxs(&tree);
        let mut current = tree.start();
        let mut walked = vec![tree.idx(current)];
        while let Some(next) = tree.successor(current) {
            walked.push(tree.idx(next));
            current = next;
        }
        assert_eq!(walked, order);
    }

    #[test]
    fn bracket_finds_immediate_neighbours() {
        let mut tree = PivotTree::new(100, 50, 3);
        let mut priority = 1u32;
        for k in [10, 20, 30, 40] {
            insert(&mut tree, k, Flags::unsorted(), priority);
            priority += 1;
        }

        let (left, right) = tree.bracket(25);
        assert_eq!(tree.idx(left), 20);
        assert_eq!(tree.idx(right), 30);

        let (left, right) = tree.bracket(20);
        assert_eq!(tree.idx(left), 20);
        // right is unreliable when left.idx == k; not asserted here.
        let _ = right;

        let (left, right) = tree.bracket(-50);
        assert_eq!(tree.idx(left), -1);
        assert_eq!(tree.idx(right), 10);
    }

    #[test]
    fn depivot_never_removes_sentinels() {
        let mut tree = PivotTree::new(10, 1, 2);
        let start = tree.start();
        let end = tree.end();
        tree.set_sorted_left(start);
        tree.set_sorted_right(start);
        tree.set_sorted_left(end);
        tree.set_sorted_right(end);
        tree.assert_invariants();
        tree.depivot(start, end);
        assert_eq!(inorder_idxs(&tree), vec![-1, 10]);
    }

    #[test]
    fn depivot_removes_redundant_pivot_between_sorted_runs() {
        let mut tree = PivotTree::new(10, 1, 2);
        let start = tree.start();
        let mid = insert(&mut tree, 5, Flags::unsorted(), 50);
        let end = tree.end();

        // Only one side of `mid` sorted so far: not yet redundant.
        tree.set_sorted_right(start);
        tree.set_sorted_left(mid);
        tree.assert_invariants();
        tree.depivot(start, mid);
        assert_eq!(inorder_idxs(&tree), vec![-1, 5, 10]);

        // Now both sides of `mid` are sorted: it carries no information a
        // query couldn't get by indexing straight through, so it's dropped.
        tree.set_sorted_right(mid);
        tree.set_sorted_left(end);
        tree.assert_invariants();
        tree.depivot(mid, end);
        assert_eq!(inorder_idxs(&tree), vec![-1, 10]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[cfg(not(miri))]
        const PROPTEST_CASES: u32 = 500;
        #[cfg(miri)]
        const PROPTEST_CASES: u32 = 8;

        proptest!(
            #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

            #[test]
            fn random_insert_delete_sequences_preserve_invariants(
                ops in proptest::collection::vec((0..500i32, any::<bool>(), 0..u32::MAX), 0..60),
            ) {
                let mut tree = PivotTree::new(500, 1, 2);
                let mut live = Vec::new();

                for (k, do_delete, priority) in ops {
                    let k = k as isize;
                    if do_delete && !live.is_empty() {
                        let i = (k as usize) % live.len();
                        let id: NodeId = live.remove(i);
                        tree.delete(id);
                    } else if tree.idx(tree.bracket(k).0) != k {
                        let root = tree.root();
                        if let Ok(id) = tree.insert(k, Flags::unsorted(), priority, root) {
                            live.push(id);
                        }
                    }
                    tree.assert_invariants();
                }
            }
        );
    }
}
