//! # Last-Writer-Wins Register
//!
//! The write with the greater `(timestamp, writer_id)` pair wins. Equal
//! pairs with different values (a writer reusing a timestamp) fall back to
//! the greater value so the outcome is still deterministic.

use super::Crdt;
use serde::{Deserialize, Serialize};
use shared_types::DeviceId;
use std::cmp::Ordering;

/// LWW-Register. `value` is `None` until the first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: Option<T>,
    timestamp: u64,
    writer_id: DeviceId,
}

impl<T> Default for LwwRegister<T> {
    fn default() -> Self {
        Self {
            value: None,
            timestamp: 0,
            writer_id: DeviceId::default(),
        }
    }
}

impl<T: Clone + Ord> LwwRegister<T> {
    /// Register holding a single write.
    pub fn new(value: T, timestamp: u64, writer_id: DeviceId) -> Self {
        Self {
            value: Some(value),
            timestamp,
            writer_id,
        }
    }

    /// Current value, if any write has been observed.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Timestamp of the winning write.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Device that performed the winning write.
    pub fn writer_id(&self) -> &DeviceId {
        &self.writer_id
    }

    /// Local write. Returns `false` if an existing write already dominates it.
    pub fn set(&mut self, value: T, timestamp: u64, writer_id: DeviceId) -> bool {
        let incoming = Self::new(value, timestamp, writer_id);
        let wins = incoming.dominates(self);
        if wins {
            *self = incoming;
        }
        wins
    }

    fn dominates(&self, other: &Self) -> bool {
        match (self.timestamp, &self.writer_id).cmp(&(other.timestamp, &other.writer_id)) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.value > other.value,
        }
    }
}

impl<T: Clone + Ord> Crdt for LwwRegister<T> {
    fn merge(&mut self, other: &Self) {
        if other.dominates(self) {
            *self = other.clone();
        }
    }
}
