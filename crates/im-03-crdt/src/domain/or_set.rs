//! # Observed-Remove Set
//!
//! Every add carries a unique tag `(device_id, timestamp)`. A remove only
//! tombstones the tags its replica has observed, so a concurrent add on
//! another replica (with a tag the remover never saw) survives the merge.

use super::Crdt;
use serde::{Deserialize, Serialize};
use shared_types::DeviceId;
use std::collections::{BTreeMap, BTreeSet};

/// Unique add tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Device that performed the add.
    pub device_id: DeviceId,
    /// Device-local strictly increasing timestamp.
    pub timestamp: u64,
}

impl Tag {
    pub fn new(device_id: DeviceId, timestamp: u64) -> Self {
        Self {
            device_id,
            timestamp,
        }
    }
}

/// OR-Set over ordered elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet<E: Ord> {
    added: BTreeMap<E, BTreeSet<Tag>>,
    removed: BTreeSet<(E, Tag)>,
}

impl<E: Ord> Default for OrSet<E> {
    fn default() -> Self {
        Self {
            added: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<E: Ord + Clone> OrSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `element` under a fresh tag.
    pub fn add(&mut self, element: E, tag: Tag) {
        self.added.entry(element).or_default().insert(tag);
    }

    /// Tombstone every observed tag of `element`. Returns the number of
    /// tags newly removed.
    pub fn remove(&mut self, element: &E) -> usize {
        let Some(tags) = self.added.get(element) else {
            return 0;
        };
        let mut newly = 0;
        for tag in tags {
            if self.removed.insert((element.clone(), tag.clone())) {
                newly += 1;
            }
        }
        newly
    }

    /// Present iff some add tag is not tombstoned.
    pub fn contains(&self, element: &E) -> bool {
        self.live_tags(element).next().is_some()
    }

    /// Present elements, in order.
    pub fn elements(&self) -> BTreeSet<E> {
        self.added
            .keys()
            .filter(|e| self.contains(e))
            .cloned()
            .collect()
    }

    /// Number of present elements.
    pub fn len(&self) -> usize {
        self.added.keys().filter(|e| self.contains(e)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_tags<'a>(&'a self, element: &'a E) -> impl Iterator<Item = &'a Tag> + 'a {
        self.added
            .get(element)
            .into_iter()
            .flatten()
            .filter(move |tag| !self.removed.contains(&(element.clone(), (*tag).clone())))
    }
}

impl<E: Ord + Clone> Crdt for OrSet<E> {
    fn merge(&mut self, other: &Self) {
        for (element, tags) in &other.added {
            self.added
                .entry(element.clone())
                .or_default()
                .extend(tags.iter().cloned());
        }
        self.removed.extend(other.removed.iter().cloned());
    }
}
