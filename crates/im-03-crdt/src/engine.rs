//! # CRDT Engine
//!
//! One peer's keyed CRDT state. Local mutations stamp a strictly increasing
//! millisecond timestamp, tick the engine's vector clock, and are persisted
//! before they become visible. Remote snapshots merge key by key.

use crate::domain::{
    Crdt, CrdtError, CrdtKind, CrdtResult, GCounter, LwwRegister, OrSet, PnCounter, Tag,
    VectorClock,
};
use serde::{Deserialize, Serialize};
use shared_types::{
    BatchOperation, DeviceId, InMemoryKVStore, KeyValueStore, SystemTimeSource, TimeSource,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const VALUE_PREFIX: &str = "crdt:";
const CLOCK_KEY: &[u8] = b"crdt-meta:clock";
const TICK_KEY: &[u8] = b"crdt-meta:last-tick";

/// A stored CRDT value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtValue {
    /// Last-writer-wins string register.
    Register(LwwRegister<String>),
    /// Grow-only counter.
    GCounter(GCounter),
    /// Increment/decrement counter.
    PnCounter(PnCounter),
    /// Observed-remove set of strings.
    OrSet(OrSet<String>),
}

impl CrdtValue {
    /// Kind tag of this value.
    pub fn kind(&self) -> CrdtKind {
        match self {
            CrdtValue::Register(_) => CrdtKind::Register,
            CrdtValue::GCounter(_) => CrdtKind::GCounter,
            CrdtValue::PnCounter(_) => CrdtKind::PnCounter,
            CrdtValue::OrSet(_) => CrdtKind::OrSet,
        }
    }

    fn empty(kind: CrdtKind) -> Self {
        match kind {
            CrdtKind::Register => CrdtValue::Register(LwwRegister::default()),
            CrdtKind::GCounter => CrdtValue::GCounter(GCounter::new()),
            CrdtKind::PnCounter => CrdtValue::PnCounter(PnCounter::new()),
            CrdtKind::OrSet => CrdtValue::OrSet(OrSet::new()),
        }
    }

    /// Merge a value of the same kind.
    pub fn try_merge(&mut self, key: &str, other: &CrdtValue) -> CrdtResult<()> {
        match (self, other) {
            (CrdtValue::Register(a), CrdtValue::Register(b)) => a.merge(b),
            (CrdtValue::GCounter(a), CrdtValue::GCounter(b)) => a.merge(b),
            (CrdtValue::PnCounter(a), CrdtValue::PnCounter(b)) => a.merge(b),
            (CrdtValue::OrSet(a), CrdtValue::OrSet(b)) => a.merge(b),
            (mine, theirs) => {
                return Err(CrdtError::KindMismatch {
                    key: key.to_string(),
                    expected: mine.kind(),
                    found: theirs.kind(),
                })
            }
        }
        Ok(())
    }
}

/// Full exported state of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdtSnapshot {
    /// Device that exported the snapshot.
    pub origin: DeviceId,
    /// Origin's vector clock at export time.
    pub clock: VectorClock,
    /// All keyed values.
    pub values: BTreeMap<String, CrdtValue>,
}

/// Outcome of `merge_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Keys whose local state changed.
    pub changed: Vec<String>,
    /// Keys skipped because the remote kind disagreed.
    pub rejected: Vec<String>,
}

/// Per-peer CRDT engine.
pub struct CrdtEngine {
    device_id: DeviceId,
    values: BTreeMap<String, CrdtValue>,
    clock: VectorClock,
    last_tick: u64,
    store: Box<dyn KeyValueStore>,
    time_source: Arc<dyn TimeSource>,
}

impl CrdtEngine {
    /// Open the engine over `store`, reloading persisted values.
    pub fn open(
        device_id: DeviceId,
        store: Box<dyn KeyValueStore>,
        time_source: Arc<dyn TimeSource>,
    ) -> CrdtResult<Self> {
        let mut values = BTreeMap::new();
        for (key, bytes) in store.prefix_scan(VALUE_PREFIX.as_bytes())? {
            let name = String::from_utf8_lossy(&key[VALUE_PREFIX.len()..]).into_owned();
            let value: CrdtValue = decode(&bytes)?;
            values.insert(name, value);
        }
        let clock = match store.get(CLOCK_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => VectorClock::new(),
        };
        let last_tick = match store.get(TICK_KEY)? {
            Some(bytes) => decode(&bytes)?,
            None => 0,
        };

        if !values.is_empty() {
            info!("[im-03] Restored {} CRDT keys for {}", values.len(), device_id);
        }

        Ok(Self {
            device_id,
            values,
            clock,
            last_tick,
            store,
            time_source,
        })
    }

    /// Ephemeral engine with the system clock.
    pub fn in_memory(device_id: DeviceId) -> Self {
        Self {
            device_id,
            values: BTreeMap::new(),
            clock: VectorClock::new(),
            last_tick: 0,
            store: Box::new(InMemoryKVStore::new()),
            time_source: Arc::new(SystemTimeSource),
        }
    }

    /// Owning device.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Engine vector clock.
    pub fn vector_clock(&self) -> &VectorClock {
        &self.clock
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Register under `key`, if one exists.
    pub fn get_register(&self, key: &str) -> Option<&LwwRegister<String>> {
        match self.values.get(key) {
            Some(CrdtValue::Register(reg)) => Some(reg),
            _ => None,
        }
    }

    /// PN-Counter value under `key` (0 when absent).
    pub fn get_counter(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(CrdtValue::PnCounter(c)) => c.value(),
            _ => 0,
        }
    }

    /// G-Counter value under `key` (0 when absent).
    pub fn get_g_counter(&self, key: &str) -> u64 {
        match self.values.get(key) {
            Some(CrdtValue::GCounter(c)) => c.value(),
            _ => 0,
        }
    }

    /// Present elements of the OR-Set under `key`.
    pub fn get_set(&self, key: &str) -> BTreeSet<String> {
        match self.values.get(key) {
            Some(CrdtValue::OrSet(s)) => s.elements(),
            _ => BTreeSet::new(),
        }
    }

    /// Raw tagged value.
    pub fn value(&self, key: &str) -> Option<&CrdtValue> {
        self.values.get(key)
    }

    // -------------------------------------------------------------------------
    // Local mutations
    // -------------------------------------------------------------------------

    /// Write a register value.
    pub fn set_register(&mut self, key: &str, value: impl Into<String>) -> CrdtResult<()> {
        let value = value.into();
        self.mutate(key, CrdtKind::Register, |v, ts, me| {
            if let CrdtValue::Register(reg) = v {
                reg.set(value, ts, me.clone());
            }
        })
    }

    /// Increment a PN-Counter.
    pub fn increment(&mut self, key: &str, amount: u64) -> CrdtResult<()> {
        self.mutate(key, CrdtKind::PnCounter, |v, _, me| {
            if let CrdtValue::PnCounter(c) = v {
                c.increment(me, amount);
            }
        })
    }

    /// Decrement a PN-Counter.
    pub fn decrement(&mut self, key: &str, amount: u64) -> CrdtResult<()> {
        self.mutate(key, CrdtKind::PnCounter, |v, _, me| {
            if let CrdtValue::PnCounter(c) = v {
                c.decrement(me, amount);
            }
        })
    }

    /// Increment a G-Counter.
    pub fn increment_g(&mut self, key: &str, amount: u64) -> CrdtResult<()> {
        self.mutate(key, CrdtKind::GCounter, |v, _, me| {
            if let CrdtValue::GCounter(c) = v {
                c.increment(me, amount);
            }
        })
    }

    /// Add an element to an OR-Set.
    pub fn add_to_set(&mut self, key: &str, element: impl Into<String>) -> CrdtResult<()> {
        let element = element.into();
        self.mutate(key, CrdtKind::OrSet, |v, ts, me| {
            if let CrdtValue::OrSet(s) = v {
                s.add(element, Tag::new(me.clone(), ts));
            }
        })
    }

    /// Remove an element's observed tags from an OR-Set.
    pub fn remove_from_set(&mut self, key: &str, element: &str) -> CrdtResult<()> {
        let element = element.to_string();
        self.mutate(key, CrdtKind::OrSet, |v, _, _| {
            if let CrdtValue::OrSet(s) = v {
                s.remove(&element);
            }
        })
    }

    fn next_timestamp(&mut self) -> u64 {
        let now = self.time_source.now_millis();
        self.last_tick = now.max(self.last_tick + 1);
        self.last_tick
    }

    /// Clone, apply, persist, then commit, so a failed write changes nothing.
    fn mutate<F>(&mut self, key: &str, kind: CrdtKind, apply: F) -> CrdtResult<()>
    where
        F: FnOnce(&mut CrdtValue, u64, &DeviceId),
    {
        let mut value = match self.values.get(key) {
            Some(existing) if existing.kind() != kind => {
                return Err(CrdtError::KindMismatch {
                    key: key.to_string(),
                    expected: kind,
                    found: existing.kind(),
                })
            }
            Some(existing) => existing.clone(),
            None => CrdtValue::empty(kind),
        };

        let previous_tick = self.last_tick;
        let ts = self.next_timestamp();
        apply(&mut value, ts, &self.device_id);

        let mut clock = self.clock.clone();
        clock.increment(&self.device_id);

        let batch = vec![
            BatchOperation::put(value_key(key), encode(&value)?),
            BatchOperation::put(CLOCK_KEY.to_vec(), encode(&clock)?),
            BatchOperation::put(TICK_KEY.to_vec(), encode(&ts)?),
        ];
        if let Err(e) = self.store.atomic_batch_write(batch) {
            self.last_tick = previous_tick;
            return Err(e.into());
        }

        self.values.insert(key.to_string(), value);
        self.clock = clock;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Replication
    // -------------------------------------------------------------------------

    /// Export the full local state.
    pub fn get_state(&self) -> CrdtSnapshot {
        CrdtSnapshot {
            origin: self.device_id.clone(),
            clock: self.clock.clone(),
            values: self.values.clone(),
        }
    }

    /// Merge a remote snapshot key by key.
    ///
    /// Keys whose kind disagrees with local state are skipped and reported;
    /// every other key merges. Applying the same snapshot again is a no-op.
    pub fn merge_state(&mut self, remote: &CrdtSnapshot) -> CrdtResult<MergeReport> {
        let mut report = MergeReport::default();
        let mut updated: Vec<(String, CrdtValue)> = Vec::new();

        for (key, theirs) in &remote.values {
            let mut merged = match self.values.get(key) {
                Some(mine) => mine.clone(),
                None => CrdtValue::empty(theirs.kind()),
            };
            if let Err(e) = merged.try_merge(key, theirs) {
                warn!("[im-03] Rejected key from {}: {}", remote.origin, e);
                report.rejected.push(key.clone());
                continue;
            }
            if self.values.get(key) != Some(&merged) {
                updated.push((key.clone(), merged));
            }
        }

        let clock = self.clock.merged(&remote.clock);
        if updated.is_empty() && clock == self.clock {
            return Ok(report);
        }

        let mut batch = Vec::with_capacity(updated.len() + 1);
        for (key, value) in &updated {
            batch.push(BatchOperation::put(value_key(key), encode(value)?));
        }
        batch.push(BatchOperation::put(CLOCK_KEY.to_vec(), encode(&clock)?));
        self.store.atomic_batch_write(batch)?;

        for (key, value) in updated {
            report.changed.push(key.clone());
            self.values.insert(key, value);
        }
        self.clock = clock;

        debug!(
            origin = %remote.origin,
            changed = report.changed.len(),
            rejected = report.rejected.len(),
            "[im-03] Merged remote CRDT state"
        );
        Ok(report)
    }
}

fn value_key(key: &str) -> Vec<u8> {
    format!("{VALUE_PREFIX}{key}").into_bytes()
}

fn encode<T: Serialize>(value: &T) -> CrdtResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CrdtError::Codec(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> CrdtResult<T> {
    bincode::deserialize(bytes).map_err(|e| CrdtError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FileBackedKVStore, ManualTimeSource};

    fn engine(id: &str, clock: &ManualTimeSource) -> CrdtEngine {
        CrdtEngine::open(
            DeviceId::new(id),
            Box::new(InMemoryKVStore::new()),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_pn_counter_convergence_any_order() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        let mut b = engine("b", &clock);
        let mut c = engine("c", &clock);

        a.increment("score", 10).unwrap();
        b.increment("score", 5).unwrap();
        b.decrement("score", 2).unwrap();
        c.increment("score", 7).unwrap();

        let (sa, sb, sc) = (a.get_state(), b.get_state(), c.get_state());

        a.merge_state(&sb).unwrap();
        a.merge_state(&sc).unwrap();
        c.merge_state(&sb).unwrap();
        c.merge_state(&sa).unwrap();
        c.merge_state(&sa).unwrap();
        b.merge_state(&sc).unwrap();
        b.merge_state(&sa).unwrap();

        for engine in [&a, &b, &c] {
            assert_eq!(engine.get_counter("score"), 20);
        }
        assert_eq!(a.get_state().values, b.get_state().values);
        assert_eq!(b.get_state().values, c.get_state().values);
        assert_eq!(a.vector_clock(), c.vector_clock());
    }

    #[test]
    fn test_or_set_concurrent_add_survives() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        let mut b = engine("b", &clock);

        a.add_to_set("tags", "X").unwrap();
        b.add_to_set("tags", "X").unwrap();
        a.remove_from_set("tags", "X").unwrap();
        assert!(!a.get_set("tags").contains("X"));

        a.merge_state(&b.get_state()).unwrap();
        assert!(a.get_set("tags").contains("X"));
    }

    #[test]
    fn test_register_last_writer_wins() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        let mut b = engine("b", &clock);

        a.set_register("motd", "first").unwrap();
        clock.advance_secs(1);
        b.set_register("motd", "second").unwrap();

        a.merge_state(&b.get_state()).unwrap();
        b.merge_state(&a.get_state()).unwrap();
        let value = |e: &CrdtEngine| e.get_register("motd").and_then(|r| r.value().cloned());
        assert_eq!(value(&a), Some("second".to_string()));
        assert_eq!(value(&b), Some("second".to_string()));
    }

    #[test]
    fn test_same_millisecond_writes_get_distinct_timestamps() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        a.set_register("k", "one").unwrap();
        a.set_register("k", "two").unwrap();
        assert_eq!(
            a.get_register("k").and_then(|r| r.value().cloned()),
            Some("two".to_string())
        );
    }

    #[test]
    fn test_kind_mismatch_local_and_remote() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        let mut b = engine("b", &clock);

        a.increment("shared", 1).unwrap();
        b.add_to_set("shared", "oops").unwrap();
        b.increment("other", 4).unwrap();

        assert!(matches!(
            a.add_to_set("shared", "x"),
            Err(CrdtError::KindMismatch { .. })
        ));

        let report = a.merge_state(&b.get_state()).unwrap();
        assert_eq!(report.rejected, vec!["shared".to_string()]);
        assert_eq!(report.changed, vec!["other".to_string()]);
        assert_eq!(a.get_counter("shared"), 1);
        assert_eq!(a.get_counter("other"), 4);
    }

    #[test]
    fn test_merge_same_snapshot_twice_is_noop() {
        let clock = ManualTimeSource::at_secs(1_000);
        let mut a = engine("a", &clock);
        let mut b = engine("b", &clock);
        b.increment_g("views", 3).unwrap();

        let snapshot = b.get_state();
        let first = a.merge_state(&snapshot).unwrap();
        let second = a.merge_state(&snapshot).unwrap();
        assert_eq!(first.changed, vec!["views".to_string()]);
        assert!(second.changed.is_empty());
        assert_eq!(a.get_g_counter("views"), 3);
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crdt.db");
        let clock = ManualTimeSource::at_secs(1_000);

        {
            let store = FileBackedKVStore::open(&path).unwrap();
            let mut e = CrdtEngine::open(DeviceId::new("a"), Box::new(store), Arc::new(clock.clone()))
                .unwrap();
            e.increment("score", 9).unwrap();
            e.add_to_set("tags", "rust").unwrap();
        }

        let store = FileBackedKVStore::open(&path).unwrap();
        let mut e =
            CrdtEngine::open(DeviceId::new("a"), Box::new(store), Arc::new(clock)).unwrap();
        assert_eq!(e.get_counter("score"), 9);
        assert!(e.get_set("tags").contains("rust"));
        assert_eq!(e.vector_clock().get(&DeviceId::new("a")), 2);

        // The restored tick keeps new tags unique even with a frozen clock.
        e.add_to_set("tags", "go").unwrap();
        e.remove_from_set("tags", "rust").unwrap();
        assert_eq!(e.get_set("tags").len(), 1);
    }
}
