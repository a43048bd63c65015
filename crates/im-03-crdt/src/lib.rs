//! # im-03-crdt
//!
//! State-based CRDT library and per-peer CRDT engine.
//!
//! ## Primitives
//!
//! | Type | State | Merge |
//! |------|-------|-------|
//! | `LwwRegister<T>` | value, timestamp, writer | greater `(timestamp, writer_id)` wins |
//! | `GCounter` | device -> count | per-device max |
//! | `PnCounter` | two `GCounter`s | component-wise |
//! | `OrSet<E>` | add tags, remove tags | union of both |
//! | `VectorClock` | device -> counter | pointwise max |
//!
//! Every merge is commutative, associative and idempotent, so replicas that
//! have seen the same updates hold bit-for-bit equal state regardless of
//! delivery order or duplication.
//!
//! ## Engine
//!
//! `CrdtEngine` owns one peer's keyed CRDT values. Values are tagged by
//! kind (`CrdtValue`), so a remote snapshot that disagrees on a key's kind
//! is rejected for that key instead of being coerced.
//!
//! ```text
//! local mutation ──→ [CrdtEngine] ──persist──→ KeyValueStore ("crdt:<key>")
//!                         │  ↑
//!              get_state()│  │merge_state(remote)
//!                         ↓  │
//!                    CrdtSnapshot ⇄ peers
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod engine;

pub use domain::{
    CausalOrder, Crdt, CrdtError, CrdtKind, CrdtResult, GCounter, LwwRegister, OrSet, PnCounter,
    Tag, VectorClock,
};
pub use engine::{CrdtEngine, CrdtSnapshot, CrdtValue, MergeReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
