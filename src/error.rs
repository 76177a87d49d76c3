use std::fmt;

/// Everything that can go wrong while querying a [`crate::LazySorted`].
///
/// `E` is the comparator's own error type (`Infallible` for the default
/// `Ord`-based comparator, so callers that never supply a custom comparator
/// never have to match on [`LazySortedError::Comparator`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazySortedError<E> {
    /// The comparator returned an error while comparing two elements. The
    /// query that triggered it is abandoned; the container's internal
    /// invariants are unaffected (see the crate-level docs on error safety).
    Comparator(E),
    /// A requested index or range fell outside `0..len`.
    OutOfRange { index: isize, len: usize },
    /// A pivot-tree invariant was violated. This indicates a bug in this
    /// crate rather than caller misuse; it should never be observed.
    Internal(&'static str),
}

impl<E: fmt::Display> fmt::Display for LazySortedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazySortedError::Comparator(e) => write!(f, "comparator error: {e}"),
            LazySortedError::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            LazySortedError::Internal(msg) => write!(f, "internal consistency violation: {msg}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for LazySortedError<E> {}

pub type Result<T, E> = std::result::Result<T, LazySortedError<E>>;
