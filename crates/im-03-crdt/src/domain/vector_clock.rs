//! # Vector Clock
//!
//! Per-device counters for causal ordering across replicas.

use super::Crdt;
use serde::{Deserialize, Serialize};
use shared_types::DeviceId;
use std::collections::BTreeMap;

/// Causal relation between two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// `self` happened before `other`.
    Before,
    /// `other` happened before `self`.
    After,
    /// Identical clocks.
    Equal,
    /// Neither dominates.
    Concurrent,
}

/// Vector clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: BTreeMap<DeviceId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump `device`'s counter and return the new value.
    pub fn increment(&mut self, device: &DeviceId) -> u64 {
        let slot = self.counters.entry(device.clone()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Counter for `device` (0 if never seen).
    pub fn get(&self, device: &DeviceId) -> u64 {
        self.counters.get(device).copied().unwrap_or(0)
    }

    /// Compare two clocks.
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut less = false;
        let mut greater = false;
        for device in self.counters.keys().chain(other.counters.keys()) {
            let (mine, theirs) = (self.get(device), other.get(device));
            if mine < theirs {
                less = true;
            } else if mine > theirs {
                greater = true;
            }
        }
        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Strictly happened before `other`.
    pub fn happens_before(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Neither clock dominates the other.
    pub fn concurrent_with(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }
}

impl Crdt for VectorClock {
    fn merge(&mut self, other: &Self) {
        for (device, counter) in &other.counters {
            let slot = self.counters.entry(device.clone()).or_insert(0);
            *slot = (*slot).max(*counter);
        }
    }
}
