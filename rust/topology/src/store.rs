// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Slot storage with deferred reclamation.
//!
//! Losing an entity leaves a tombstone in its slot instead of freeing it, so
//! that undo can write the entity back under the same key. Tombstones are
//! reclaimed once no retained history state mentions the key.

use slotmap::{Key, SlotMap};

#[derive(Debug, Clone)]
pub(crate) struct Store<K: Key, T> {
    slots: SlotMap<K, Option<T>>,
    live: usize,
}

impl<K: Key, T> Store<K, T> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            live: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> K {
        self.live += 1;
        self.slots.insert(Some(value))
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots.get_mut(key).and_then(Option::as_mut)
    }

    /// Returns `true` if the key refers to a live entity.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Overwrites the slot: `Some` revives or replaces, `None` tombstones.
    ///
    /// Returns `false` if the slot has already been reclaimed.
    pub fn write(&mut self, key: K, value: Option<T>) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) => {
                match (slot.is_some(), value.is_some()) {
                    (false, true) => self.live += 1,
                    (true, false) => self.live -= 1,
                    _ => {}
                }
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Frees the slot if it holds a tombstone.
    pub fn reclaim(&mut self, key: K) -> bool {
        if matches!(self.slots.get(key), Some(None)) {
            self.slots.remove(key);
            true
        } else {
            false
        }
    }

    /// Live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Number of tombstoned slots awaiting reclamation.
    pub fn tombstones(&self) -> usize {
        self.slots.len() - self.len()
    }
}

impl<K: Key, T> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::VertexKey;

    #[test]
    fn tombstone_keeps_key_valid() {
        let mut store: Store<VertexKey, u32> = Store::new();
        let k = store.insert(7);
        assert!(store.write(k, None));
        assert!(!store.contains(k));
        assert_eq!(store.tombstones(), 1);
        assert!(store.write(k, Some(8)));
        assert_eq!(store.get(k), Some(&8));
    }

    #[test]
    fn reclaimed_slot_cannot_be_revived() {
        let mut store: Store<VertexKey, u32> = Store::new();
        let k = store.insert(1);
        assert!(!store.reclaim(k), "live slots are never reclaimed");
        store.write(k, None);
        assert!(store.reclaim(k));
        assert!(!store.write(k, Some(2)));
        let k2 = store.insert(3);
        assert_ne!(k, k2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn iteration_skips_tombstones() {
        let mut store: Store<VertexKey, u32> = Store::new();
        let a = store.insert(1);
        let _b = store.insert(2);
        store.write(a, None);
        let values: Vec<u32> = store.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }

    #[test]
    fn live_count_follows_tombstones_and_revivals() {
        let mut store: Store<VertexKey, u32> = Store::new();
        let a = store.insert(1);
        let b = store.insert(2);
        assert_eq!(store.len(), 2);
        store.write(a, None);
        store.write(a, None);
        assert_eq!(store.len(), 1);
        store.write(b, Some(5));
        assert_eq!(store.len(), 1);
        store.write(a, Some(3));
        assert_eq!(store.len(), 2);
        store.write(a, None);
        assert!(store.reclaim(a));
        assert_eq!(store.len(), 1);
        assert_eq!(store.tombstones(), 0);
        assert_eq!(store.len(), store.iter().count());
    }
}
