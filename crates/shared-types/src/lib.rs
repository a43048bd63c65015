//! # Shared Types Crate
//!
//! This crate contains the domain entities every Insight-Mesh component
//! agrees on, and the storage port all durable state flows through.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `Block`, `ContentHash` and `DeviceId` are
//!   defined here and nowhere else.
//! - **Content Addressing**: a block's identity on the wire and on disk is
//!   its `content_hash`; the hash is recomputable from the block's fields.
//! - **Pluggable Persistence**: components persist through `KeyValueStore`
//!   and never touch the filesystem directly.

pub mod entities;
pub mod errors;
pub mod storage;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use storage::{BatchOperation, FileBackedKVStore, InMemoryKVStore, KeyValueStore};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
