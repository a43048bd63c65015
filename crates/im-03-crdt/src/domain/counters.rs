//! # Counters
//!
//! `GCounter` only grows; `PnCounter` pairs two of them so it can also
//! shrink. Each device only ever bumps its own slot.

use super::Crdt;
use serde::{Deserialize, Serialize};
use shared_types::DeviceId;
use std::collections::BTreeMap;

/// Grow-only counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    per_device_count: BTreeMap<DeviceId, u64>,
}

impl GCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `device`'s slot.
    pub fn increment(&mut self, device: &DeviceId, amount: u64) {
        let slot = self.per_device_count.entry(device.clone()).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    /// Sum over all devices.
    pub fn value(&self) -> u64 {
        self.per_device_count
            .values()
            .fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    /// One device's contribution.
    pub fn get(&self, device: &DeviceId) -> u64 {
        self.per_device_count.get(device).copied().unwrap_or(0)
    }
}

impl Crdt for GCounter {
    fn merge(&mut self, other: &Self) {
        for (device, count) in &other.per_device_count {
            let slot = self.per_device_count.entry(device.clone()).or_insert(0);
            *slot = (*slot).max(*count);
        }
    }
}

/// Increment/decrement counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    positive: GCounter,
    negative: GCounter,
}

impl PnCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, device: &DeviceId, amount: u64) {
        self.positive.increment(device, amount);
    }

    pub fn decrement(&mut self, device: &DeviceId, amount: u64) {
        self.negative.increment(device, amount);
    }

    /// Apply a signed delta.
    pub fn add(&mut self, device: &DeviceId, delta: i64) {
        if delta >= 0 {
            self.increment(device, delta as u64);
        } else {
            self.decrement(device, delta.unsigned_abs());
        }
    }

    /// positive.sum - negative.sum
    pub fn value(&self) -> i64 {
        let pos = i128::from(self.positive.value());
        let neg = i128::from(self.negative.value());
        (pos - neg).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl Crdt for PnCounter {
    fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_g_counter_merge_takes_max() {
        let a = DeviceId::new("a");
        let mut left = GCounter::new();
        left.increment(&a, 3);
        let mut right = GCounter::new();
        right.increment(&a, 5);

        left.merge(&right);
        assert_eq!(left.value(), 5);
        assert_eq!(left.get(&a), 5);
    }

    #[test]
    fn test_g_counter_never_decreases_on_merge() {
        let a = DeviceId::new("a");
        let mut fresh = GCounter::new();
        fresh.increment(&a, 1);
        let before = fresh.value();
        fresh.merge(&GCounter::new());
        assert!(fresh.value() >= before);
    }

    #[test]
    fn test_pn_counter_three_device_example() {
        let (a, b, c) = (DeviceId::new("a"), DeviceId::new("b"), DeviceId::new("c"));

        let mut ca = PnCounter::new();
        ca.increment(&a, 10);
        let mut cb = PnCounter::new();
        cb.increment(&b, 5);
        cb.decrement(&b, 2);
        let mut cc = PnCounter::new();
        cc.increment(&c, 7);

        let abc = ca.merged(&cb).merged(&cc);
        let cba = cc.merged(&cb).merged(&ca);
        let bac = cb.merged(&ca).merged(&cc).merged(&ca);

        assert_eq!(abc.value(), 20);
        assert_eq!(abc, cba);
        assert_eq!(abc, bac);
    }

    #[test]
    fn test_pn_counter_signed_add() {
        let a = DeviceId::new("a");
        let mut counter = PnCounter::new();
        counter.add(&a, 100);
        counter.add(&a, -250);
        assert_eq!(counter.value(), -150);
    }
}
