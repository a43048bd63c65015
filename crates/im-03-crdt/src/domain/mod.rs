//! CRDT primitives.

pub mod counters;
pub mod errors;
pub mod lww;
pub mod or_set;
pub mod vector_clock;

pub use counters::*;
pub use errors::*;
pub use lww::*;
pub use or_set::*;
pub use vector_clock::*;

/// A state-based CRDT: `merge` is commutative, associative and idempotent.
pub trait Crdt {
    /// Fold `other` into `self`.
    fn merge(&mut self, other: &Self);

    /// Merge without mutating either input.
    fn merged(&self, other: &Self) -> Self
    where
        Self: Clone + Sized,
    {
        let mut out = self.clone();
        out.merge(other);
        out
    }
}
