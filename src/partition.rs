//! In-place partitioning and small sorts over a half-open index range
//! `[lo, hi)` of a shared elements slice. None of these touch the pivot
//! tree; they're the raw material the query driver assembles into
//! quickselect and range-fill.

use rand::Rng;

use crate::comparator::Comparator;

/// Default insertion-sort cutoff.
pub(crate) const DEFAULT_SORT_THRESH: usize = 12;

/// Default step threshold below which `slice` prefers `sort_range` over
/// per-point `sort_to_rank`.
pub(crate) const DEFAULT_CONTIG_THRESH: usize = 8;

/// Picks an index in `[lo, hi)` to use as a partition pivot. Uniform random;
/// any unbiased choice is acceptable.
pub(crate) fn pick_pivot(lo: usize, hi: usize, rng: &mut impl Rng) -> usize {
    debug_assert!(hi > lo);
    rng.gen_range(lo..hi)
}

/// Lomuto partition of `items[lo..hi]` around `items[pivot_index]`.
///
/// Swaps the chosen pivot to `lo`, scans `lo+1..hi` moving everything
/// strictly less than the pivot to the front, then swaps the pivot into its
/// final position. Returns that position.
///
/// # Panics
///
/// Panics (via `debug_assert`) if `hi - lo < 2`.
pub(crate) fn partition<T, C: Comparator<T>>(
    items: &mut [T],
    lo: usize,
    hi: usize,
    pivot_index: usize,
    cmp: &mut C,
) -> Result<usize, C::Error> {
    debug_assert!(hi - lo >= 2);
    debug_assert!((lo..hi).contains(&pivot_index));

    items.swap(lo, pivot_index);
    let mut last_less = lo;
    for i in (lo + 1)..hi {
        if cmp.less(&items[i], &items[lo])? {
            last_less += 1;
            items.swap(last_less, i);
        }
    }
    items.swap(lo, last_less);
    Ok(last_less)
}

/// Classic in-place insertion sort over `items[lo..hi]`. All reordering is
/// by swap, so a comparator error midway through leaves the multiset
/// exactly as it was, merely less sorted.
pub(crate) fn insertion_sort<T, C: Comparator<T>>(
    items: &mut [T],
    lo: usize,
    hi: usize,
    cmp: &mut C,
) -> Result<(), C::Error> {
    for j in (lo + 1)..hi {
        let mut i = j;
        while i > lo && cmp.less(&items[i], &items[i - 1])? {
            items.swap(i - 1, i);
            i -= 1;
        }
    }
    Ok(())
}

/// Unconstrained recursive quicksort over `items[lo..hi]`. Does not touch
/// the pivot tree: used only when a whole segment is being sorted
/// unconditionally, where intermediate pivots would be immediately
/// redundant.
pub(crate) fn quick_sort<T, C: Comparator<T>>(
    items: &mut [T],
    lo: usize,
    hi: usize,
    cmp: &mut C,
    rng: &mut impl Rng,
    thresh: usize,
) -> Result<(), C::Error> {
    if hi.saturating_sub(lo) <= thresh.max(1) {
        return insertion_sort(items, lo, hi, cmp);
    }

    let pivot_index = pick_pivot(lo, hi, rng);
    let p = partition(items, lo, hi, pivot_index, cmp)?;

    if p > lo {
        quick_sort(items, lo, p, cmp, rng, thresh)?;
    }
    if p + 1 < hi {
        quick_sort(items, p + 1, hi, cmp, rng, thresh)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::OrdComparator;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn assert_sorted(items: &[i32], lo: usize, hi: usize) {
        items[lo..hi].windows(2).for_each(|w| assert!(w[0] <= w[1]));
    }

    #[test]
    fn partition_splits_around_pivot() {
        let mut items = vec![5, 3, 8, 1, 9, 2];
        let mut cmp = OrdComparator;
        let p = partition(&mut items, 0, items.len(), 0, &mut cmp).unwrap();
        for (i, v) in items.iter().enumerate() {
            if i < p {
                assert!(*v <= items[p]);
            } else if i > p {
                assert!(*v >= items[p]);
            }
        }
    }

    #[test]
    #[cfg_attr(miri, ignore = "no unsafe code, nothing for miri to check")]
    fn insertion_sort_sorts_subrange() {
        let mut items = vec![9, 5, 1, 4, 2, 7, 3, 6, 8];
        let mut cmp = OrdComparator;
        insertion_sort(&mut items, 2, 7, &mut cmp).unwrap();
        assert_sorted(&items, 2, 7);
        // out of range untouched
        assert_eq!(items[0], 9);
        assert_eq!(items[1], 5);
    }

    #[test]
    #[cfg_attr(miri, ignore = "no unsafe code, nothing for miri to check")]
    fn quick_sort_sorts_whole_range() {
        let mut items = vec![9, 5, 1, 4, 2, 7, 3, 6, 8, 0];
        let mut cmp = OrdComparator;
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        quick_sort(&mut items, 0, items.len(), &mut cmp, &mut rng, DEFAULT_SORT_THRESH).unwrap();
        assert_sorted(&items, 0, items.len());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[cfg(not(miri))]
        const VEC_SIZE: usize = 500;
        #[cfg(miri)]
        const VEC_SIZE: usize = 30;

        #[cfg(not(miri))]
        const PROPTEST_CASES: u32 = 500;
        #[cfg(miri)]
        const PROPTEST_CASES: u32 = 8;

        proptest!(
            #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

            #[test]
            #[cfg_attr(miri, ignore = "no unsafe code, nothing for miri to check")]
            fn quick_sort_matches_std_sort(
                mut items in proptest::collection::vec(0..10_000i32, 0..VEC_SIZE),
            ) {
                let mut expected = items.clone();
                expected.sort();

                let mut cmp = OrdComparator;
                let mut rng = ChaCha8Rng::seed_from_u64(7);
                let len = items.len();
                quick_sort(&mut items, 0, len, &mut cmp, &mut rng, DEFAULT_SORT_THRESH).unwrap();
                prop_assert_eq!(items, expected);
            }

            #[test]
            #[cfg_attr(miri, ignore = "no unsafe code, nothing for miri to check")]
            fn insertion_sort_matches_std_sort(
                mut items in proptest::collection::vec(0..10_000i32, 0..VEC_SIZE),
            ) {
                let mut expected = items.clone();
                expected.sort();

                let mut cmp = OrdComparator;
                let len = items.len();
                insertion_sort(&mut items, 0, len, &mut cmp).unwrap();
                prop_assert_eq!(items, expected);
            }
        );
    }
}
