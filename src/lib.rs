//! A lazily sorted sequence.
//!
//! `LazySorted<T>` holds elements in arbitrary order and only sorts as much
//! of the backing array as a given query demands. Indexing at rank `k`
//! (`at`), reading a slice, or doing a membership query each trigger just
//! enough partitioning to answer that query; previously computed pivot
//! positions are remembered (in a [`pivot_tree`]) and reused by later
//! queries, so repeated access gets cheaper as more of the array has
//! already been settled into place.
//!
//! Internally this is quickselect-driven partial sorting backed by a treap
//! that records which array positions hold values already in final sorted
//! order.
//!
//! ```
//! use lazysorted::LazySorted;
//!
//! let mut ls = LazySorted::new(vec![5, 3, 8, 1, 9, 2]);
//! assert_eq!(*ls.at(0).unwrap(), 1);
//! assert_eq!(*ls.at(5).unwrap(), 9);
//! ```

mod comparator;
mod error;
mod partition;
mod pivot_tree;

pub use comparator::{Comparator, FnComparator, OrdComparator};
pub use error::LazySortedError;

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use partition::{insertion_sort, partition, pick_pivot, quick_sort, DEFAULT_CONTIG_THRESH, DEFAULT_SORT_THRESH};
use pivot_tree::{Flags, NodeId, PivotTree};

/// Where a debug pivot sits relative to the element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotMarker {
    /// The permanent sentinel before index 0.
    Start,
    /// A pivot at this element index.
    Index(usize),
    /// The permanent sentinel after the last index.
    End,
}

/// Whether the run immediately left/right of a pivot is known sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotFlags {
    Unsorted,
    SortedRight,
    SortedLeft,
    SortedBoth,
}

impl From<Flags> for PivotFlags {
    fn from(flags: Flags) -> Self {
        match (flags.sorted_left(), flags.sorted_right()) {
            (false, false) => PivotFlags::Unsorted,
            (false, true) => PivotFlags::SortedRight,
            (true, false) => PivotFlags::SortedLeft,
            (true, true) => PivotFlags::SortedBoth,
        }
    }
}

/// A sequence that sorts itself incrementally, only as far as queries
/// require.
///
/// `T` is the element type; `C` is the [`Comparator`] used to order it,
/// defaulting to plain [`OrdComparator`] for `T: Ord`. Every query method
/// takes `&mut self`: answering a query may permute `items` and grow the
/// internal pivot tree.
pub struct LazySorted<T, C = OrdComparator> {
    items: Vec<T>,
    tree: PivotTree,
    cmp: C,
    rng: ChaCha8Rng,
    sort_thresh: usize,
    contig_thresh: usize,
}

impl<T: Ord> LazySorted<T, OrdComparator> {
    /// Builds a new container from `items`, ordered by [`Ord`].
    pub fn new(items: Vec<T>) -> Self {
        Self::with_comparator(items, OrdComparator)
    }
}

impl<T, C: Comparator<T>> LazySorted<T, C> {
    /// Builds a new container from `items`, ordered by a custom fallible
    /// comparator.
    pub fn with_comparator(items: Vec<T>, cmp: C) -> Self {
        let seed = rand::thread_rng().gen();
        Self::with_comparator_seeded(items, cmp, seed)
    }

    /// Like [`Self::with_comparator`], but with an explicit RNG seed, for
    /// reproducible pivot choices in tests.
    pub fn with_comparator_seeded(items: Vec<T>, cmp: C, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = items.len();
        let neg_one_priority = rng.gen();
        let len_priority = rng.gen();
        let tree = PivotTree::new(n, neg_one_priority, len_priority);
        LazySorted {
            items,
            tree,
            cmp,
            rng,
            sort_thresh: DEFAULT_SORT_THRESH,
            contig_thresh: DEFAULT_CONTIG_THRESH,
        }
    }

    /// Overrides the insertion-sort cutoff and the contiguous-slice
    /// threshold used by [`Self::slice`]. Changes no observable query
    /// result, only how much work is spent reaching it.
    pub fn with_thresholds(mut self, sort_thresh: usize, contig_thresh: usize) -> Self {
        self.sort_thresh = sort_thresh;
        self.contig_thresh = contig_thresh;
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check_index(&self, k: usize) -> Result<(), LazySortedError<C::Error>> {
        if k < self.items.len() {
            Ok(())
        } else {
            Err(LazySortedError::OutOfRange {
                index: k as isize,
                len: self.items.len(),
            })
        }
    }

    fn check_range(&self, lo: usize, hi: usize) -> Result<(), LazySortedError<C::Error>> {
        if lo > hi || hi > self.items.len() {
            Err(LazySortedError::OutOfRange {
                index: hi as isize,
                len: self.items.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Returns the element with sorted rank `k`, sorting only as much of
    /// the array as necessary to place it.
    pub fn at(&mut self, k: usize) -> Result<&T, LazySortedError<C::Error>> {
        self.check_index(k)?;
        self.sort_to_rank(k as isize)?;
        Ok(&self.items[k])
    }

    /// Returns the element `k` ranks from the end (`at_from_end(0)` is the
    /// maximum).
    pub fn at_from_end(&mut self, k: usize) -> Result<&T, LazySortedError<C::Error>> {
        self.check_index(k)?;
        let rank = self.items.len() - 1 - k;
        self.at(rank)
    }

    /// Quickselects element rank `k` into its final position, inserting
    /// pivots for every intermediate partition along the way. Idempotent:
    /// calling this twice with the same `k` does no further work the
    /// second time.
    fn sort_to_rank(&mut self, k: isize) -> Result<NodeId, LazySortedError<C::Error>> {
        loop {
            let (left, right) = self.tree.bracket(k);
            if self.tree.idx(left) == k {
                return Ok(left);
            }
            // `right`'s SORTED_LEFT flag means the gap between `left` and
            // `right` (which brackets `k`) is already fully sorted from a
            // past `sort_range`, so `X[k]` already sits at its final rank
            // without partitioning anything.
            if self.tree.flags(right).sorted_left() {
                return Ok(right);
            }

            let lo = (self.tree.idx(left) + 1) as usize;
            let hi = self.tree.idx(right) as usize;

            let p = if hi - lo == 1 {
                lo
            } else {
                let pivot_index = pick_pivot(lo, hi, &mut self.rng);
                partition(&mut self.items, lo, hi, pivot_index, &mut self.cmp)
                    .map_err(LazySortedError::Comparator)?
            };

            let priority = self.rng.gen();
            let root = self.tree.root();
            let node = self
                .tree
                .insert(p as isize, Flags::unsorted(), priority, root)
                .map_err(|_| LazySortedError::Internal("duplicate pivot inserted by sort_to_rank"))?;
            // `left`/`right` aren't reused after this point in the current
            // iteration; the next one re-derives both fresh from `bracket`.
            self.uniq_pivots(left, node, right)?;

            if p as isize == k {
                return Ok(node);
            }
        }
    }

    /// Called right after a new pivot `middle` has been inserted between
    /// `left` and `right`. If `middle`'s value ties one of its neighbors,
    /// the region between them is a run of equal keys that will never
    /// produce a useful further partition; the neighbor is folded into
    /// `middle` instead of kept around. Without this, an array dominated
    /// by a handful of distinct values grows the pivot tree by one node
    /// per query while doing no useful work.
    ///
    /// Returns the surviving left/right boundary nodes: whichever of
    /// `left`/`right` gets folded away is replaced with `middle` in the
    /// result, since it now carries that same value and flag information.
    /// Callers that keep `left`/`right` across more than one insert must use
    /// this return value instead of the ids passed in, which may have just
    /// been freed.
    fn uniq_pivots(
        &mut self,
        left: NodeId,
        middle: NodeId,
        right: NodeId,
    ) -> Result<(NodeId, NodeId), LazySortedError<C::Error>> {
        let mid_idx = self.tree.idx(middle) as usize;
        let mut new_left = left;
        let mut new_right = right;

        if !self.tree.is_sentinel(left) {
            let left_idx = self.tree.idx(left) as usize;
            if self
                .cmp
                .equal(&self.items[left_idx], &self.items[mid_idx])
                .map_err(LazySortedError::Comparator)?
            {
                if self.tree.flags(left).sorted_left() {
                    self.tree.set_sorted_left(middle);
                }
                self.tree.delete(left);
                new_left = middle;
            }
        }
        if !self.tree.is_sentinel(right) {
            let right_idx = self.tree.idx(right) as usize;
            if self
                .cmp
                .equal(&self.items[mid_idx], &self.items[right_idx])
                .map_err(LazySortedError::Comparator)?
            {
                if self.tree.flags(right).sorted_right() {
                    self.tree.set_sorted_right(middle);
                }
                self.tree.delete(right);
                new_right = middle;
            }
        }
        Ok((new_left, new_right))
    }

    /// Fully sorts the array positions between the nearest pivots bracketing
    /// `[lo, hi)`, then marks both bracketing pivots sorted on the side
    /// facing the newly sorted run and removes either if it has become
    /// redundant. No-op if that gap is empty or already sorted.
    fn sort_range(&mut self, lo: usize, hi: usize) -> Result<(), LazySortedError<C::Error>> {
        if lo >= hi {
            return Ok(());
        }

        // Pivot exactly at both boundaries first, so no other live pivot
        // can fall strictly inside `[lo, hi)` by the time we sort it.
        self.sort_to_rank(lo as isize)?;
        let right = if hi < self.items.len() {
            self.sort_to_rank(hi as isize)?
        } else {
            self.tree.end()
        };
        // Re-derive the live `lo` boundary rather than trust the node id
        // `sort_to_rank` handed back above: the `hi` quickselect that just
        // ran may have folded that pivot into a later equal-valued
        // neighbor (`uniq_pivots`), freeing its slot.
        let left = self.tree.bracket(lo as isize).0;

        if self.tree.flags(left).sorted_right() && self.tree.flags(right).sorted_left() {
            return Ok(());
        }

        // Any pivot strictly between `left` and `right` is about to be
        // swept up into one fully sorted run and carries no information
        // past that point.
        loop {
            let next = self
                .tree
                .successor(left)
                .expect("right is always reachable from left by construction");
            if next == right {
                break;
            }
            self.tree.delete(next);
        }

        // Sort the *actual* bracketed span, not just `[lo, hi)`: duplicate
        // coalescing above may have moved `left` further left than `lo` (its
        // exact-`lo` pivot got folded into a later equal-valued neighbor),
        // and the flags set below claim everything up to `right` is sorted,
        // so everything up to `right` has to genuinely get sorted.
        let sort_lo = (self.tree.idx(left) + 1) as usize;
        let sort_hi = self.tree.idx(right) as usize;
        let span = sort_hi - sort_lo;
        if span <= self.sort_thresh {
            insertion_sort(&mut self.items, sort_lo, sort_hi, &mut self.cmp).map_err(LazySortedError::Comparator)?;
        } else {
            quick_sort(&mut self.items, sort_lo, sort_hi, &mut self.cmp, &mut self.rng, self.sort_thresh)
                .map_err(LazySortedError::Comparator)?;
        }

        self.tree.set_sorted_right(left);
        self.tree.set_sorted_left(right);
        self.tree.depivot(left, right);
        Ok(())
    }

    /// Returns a borrowed, fully sorted window `[lo, hi)`. Unlike
    /// [`Self::slice`], this sorts the entire interior contiguously rather
    /// than skipping by a step, and returns a live borrow instead of a
    /// copy. Elements outside `[lo, hi)` are left in whatever order they
    /// were already in.
    pub fn between(&mut self, lo: usize, hi: usize) -> Result<&[T], LazySortedError<C::Error>> {
        self.check_range(lo, hi)?;
        if lo < hi {
            self.sort_range(lo, hi)?;
        }
        Ok(&self.items[lo..hi])
    }

    /// Returns every `step`-th element of the sorted sequence in
    /// `[lo, hi)`, cloned out into a fresh `Vec`.
    ///
    /// Only ascending iteration (`step >= 1`) is supported; negative-step
    /// and wraparound index handling are argument-massaging concerns for a
    /// caller wrapping this type, not this container's job.
    pub fn slice(&mut self, lo: usize, hi: usize, step: usize) -> Result<Vec<T>, LazySortedError<C::Error>>
    where
        T: Clone,
    {
        if step == 0 {
            return Err(LazySortedError::OutOfRange {
                index: 0,
                len: self.items.len(),
            });
        }
        self.check_range(lo, hi)?;
        if lo >= hi {
            return Ok(Vec::new());
        }

        if step <= self.contig_thresh {
            self.sort_range(lo, hi)?;
            Ok(self.items[lo..hi].iter().step_by(step).cloned().collect())
        } else {
            let mut out = Vec::new();
            let mut i = lo;
            while i < hi {
                self.sort_to_rank(i as isize)?;
                out.push(self.items[i].clone());
                i += step;
            }
            Ok(out)
        }
    }

    /// Locates *an* occurrence of `value`, quickselecting toward it the
    /// same way [`Self::sort_to_rank`] quickselects toward a rank, except
    /// each partition's direction is chosen by comparing `value` against
    /// the resulting pivot rather than by comparing ranks.
    ///
    /// If `value` appears more than once, which occurrence is returned is
    /// unspecified: whichever one a partition happens to land on first.
    fn find_item(&mut self, value: &T) -> Result<Option<usize>, LazySortedError<C::Error>> {
        let mut left = self.tree.start();
        let mut right = self.tree.end();
        let mut current = Some(self.tree.root());

        while let Some(id) = current {
            if self.tree.is_sentinel(id) {
                break;
            }
            let node_idx = self.tree.idx(id) as usize;
            if self
                .cmp
                .equal(value, &self.items[node_idx])
                .map_err(LazySortedError::Comparator)?
            {
                return Ok(Some(node_idx));
            } else if self
                .cmp
                .less(value, &self.items[node_idx])
                .map_err(LazySortedError::Comparator)?
            {
                right = id;
                current = self.tree.left_child(id);
            } else {
                left = id;
                current = self.tree.right_child(id);
            }
        }

        loop {
            let lo = (self.tree.idx(left) + 1) as usize;
            let hi = self.tree.idx(right) as usize;
            if lo >= hi {
                return Ok(None);
            }

            // The gap is already fully sorted from a past `sort_range`;
            // linear-scan it directly rather than partitioning a range that
            // can't produce any new pivot information.
            if self.tree.flags(right).sorted_left() {
                for (offset, item) in self.items[lo..hi].iter().enumerate() {
                    if self.cmp.equal(value, item).map_err(LazySortedError::Comparator)? {
                        return Ok(Some(lo + offset));
                    }
                    if self.cmp.less(value, item).map_err(LazySortedError::Comparator)? {
                        break;
                    }
                }
                return Ok(None);
            }

            let p = if hi - lo == 1 {
                lo
            } else {
                let pivot_index = pick_pivot(lo, hi, &mut self.rng);
                partition(&mut self.items, lo, hi, pivot_index, &mut self.cmp)
                    .map_err(LazySortedError::Comparator)?
            };

            let priority = self.rng.gen();
            let root = self.tree.root();
            let p_node = self
                .tree
                .insert(p as isize, Flags::unsorted(), priority, root)
                .map_err(|_| LazySortedError::Internal("duplicate pivot inserted by find_item"))?;
            // `left`/`right` persist across loop iterations here (unlike
            // `sort_to_rank`), so whichever one `uniq_pivots` just freed
            // must be replaced before it's touched again.
            let (new_left, new_right) = self.uniq_pivots(left, p_node, right)?;
            left = new_left;
            right = new_right;

            if self.cmp.equal(value, &self.items[p]).map_err(LazySortedError::Comparator)? {
                return Ok(Some(p));
            } else if self.cmp.less(value, &self.items[p]).map_err(LazySortedError::Comparator)? {
                right = p_node;
            } else {
                left = p_node;
            }
        }
    }

    /// Index of any occurrence of `value`, or `None` if it isn't present.
    pub fn index_of(&mut self, value: &T) -> Result<Option<usize>, LazySortedError<C::Error>> {
        self.find_item(value)
    }

    /// Whether `value` occurs anywhere in the sequence.
    pub fn contains(&mut self, value: &T) -> Result<bool, LazySortedError<C::Error>> {
        Ok(self.find_item(value)?.is_some())
    }

    /// Number of occurrences of `value`.
    ///
    /// Locates one occurrence via [`Self::find_item`], then sorts a
    /// neighborhood around it (doubling outward as needed) until both
    /// edges of the scanned window provably don't equal `value`, and
    /// counts within that window. This stays lazy: only the neighborhood
    /// that actually contains duplicates of `value` ever gets sorted.
    pub fn count_of(&mut self, value: &T) -> Result<usize, LazySortedError<C::Error>> {
        let Some(p) = self.find_item(value)? else {
            return Ok(0);
        };

        let len = self.items.len();
        let mut window = 1usize;
        loop {
            let lo = p.saturating_sub(window);
            let hi = (p + window + 1).min(len);
            self.sort_range(lo, hi)?;

            let left_clear =
                lo == 0 || !self.cmp.equal(value, &self.items[lo]).map_err(LazySortedError::Comparator)?;
            let right_clear = hi == len
                || !self
                    .cmp
                    .equal(value, &self.items[hi - 1])
                    .map_err(LazySortedError::Comparator)?;

            if left_clear && right_clear {
                let mut count = 0;
                for v in &self.items[lo..hi] {
                    if self.cmp.equal(value, v).map_err(LazySortedError::Comparator)? {
                        count += 1;
                    }
                }
                return Ok(count);
            }
            if lo == 0 && hi == len {
                let mut count = 0;
                for v in &self.items[..] {
                    if self.cmp.equal(value, v).map_err(LazySortedError::Comparator)? {
                        count += 1;
                    }
                }
                return Ok(count);
            }
            window *= 2;
        }
    }

    /// Lists every pivot currently tracked, in array order, with its
    /// sorted-neighbor flags. Diagnostic only.
    pub fn debug_pivots(&self) -> Vec<(PivotMarker, PivotFlags)> {
        let mut out = Vec::new();
        let n = self.items.len();
        self.tree.inorder_for_each(|id| {
            let idx = self.tree.idx(id);
            let marker = if idx == -1 {
                PivotMarker::Start
            } else if idx == n as isize {
                PivotMarker::End
            } else {
                PivotMarker::Index(idx as usize)
            };
            out.push((marker, PivotFlags::from(self.tree.flags(id))));
        });
        out
    }
}

impl<T: fmt::Debug, C> fmt::Debug for LazySorted<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySorted")
            .field("items", &self.items)
            .field("len", &self.items.len())
            .finish()
    }
}
