// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rollback history ("bulletin board").
//!
//! Every committed [`crate::Transaction`] becomes one [`DeltaState`]: a list
//! of bulletins, each holding the full pre- and post-image of one entity.
//! Undo writes the pre-images back, redo writes the post-images. Because
//! geometry records carry their use counts, both directions restore counts
//! exactly without replaying increments.

use rustc_hash::FxHashMap;

use crate::arena::{BrepArena, Record};
use crate::error::Result;
use crate::keys::EntityKey;

/// Classification of a bulletin by which images are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletinKind {
    Create,
    Delete,
    Change,
    /// Created and lost in the same transaction.
    NoBulletin,
}

/// Before/after images of one entity within a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Bulletin {
    pub key: EntityKey,
    pub old: Option<Record>,
    pub new: Option<Record>,
}

impl Bulletin {
    pub fn kind(&self) -> BulletinKind {
        match (&self.old, &self.new) {
            (None, Some(_)) => BulletinKind::Create,
            (Some(_), None) => BulletinKind::Delete,
            (Some(_), Some(_)) => BulletinKind::Change,
            (None, None) => BulletinKind::NoBulletin,
        }
    }
}

/// Identifier of a committed state, unique within one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u64);

/// The bulletins of one committed transaction.
#[derive(Debug, Clone)]
pub struct DeltaState {
    pub id: StateId,
    pub name: String,
    pub bulletins: Vec<Bulletin>,
}

impl DeltaState {
    /// Number of bulletins of the given kind.
    pub fn count(&self, kind: BulletinKind) -> usize {
        self.bulletins.iter().filter(|b| b.kind() == kind).count()
    }
}

/// Linear stack of states with an undo cursor.
///
/// States `[0, cursor)` are applied; states `[cursor, len)` form the redo
/// branch.
#[derive(Debug, Default)]
pub struct History {
    states: Vec<DeltaState>,
    cursor: usize,
    next_id: u64,
    /// How many retained states mention each key.
    mentions: FxHashMap<EntityKey, usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// All retained states, oldest first.
    pub fn states(&self) -> &[DeltaState] {
        &self.states
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.states.len()
    }

    /// Number of states that can currently be undone.
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    /// Returns `true` if some retained state mentions `key`.
    pub fn mentions(&self, key: EntityKey) -> bool {
        self.mentions.contains_key(&key)
    }

    /// Appends a state, discarding the redo branch. Returns the new id and
    /// the keys whose last mention went away.
    pub(crate) fn push(&mut self, name: String, bulletins: Vec<Bulletin>) -> (StateId, Vec<EntityKey>) {
        let discarded: Vec<DeltaState> = self.states.drain(self.cursor..).collect();
        let mut released = self.forget(discarded);

        let id = StateId(self.next_id);
        self.next_id += 1;
        for b in &bulletins {
            *self.mentions.entry(b.key).or_insert(0) += 1;
        }
        released.retain(|k| !self.mentions.contains_key(k));
        self.states.push(DeltaState {
            id,
            name,
            bulletins,
        });
        self.cursor = self.states.len();
        (id, released)
    }

    /// Drops the oldest applied states until at most `max` remain.
    pub(crate) fn prune_to(&mut self, max: usize) -> Vec<EntityKey> {
        let excess = self.states.len().saturating_sub(max).min(self.cursor);
        if excess == 0 {
            return Vec::new();
        }
        let dropped: Vec<DeltaState> = self.states.drain(..excess).collect();
        self.cursor -= excess;
        self.forget(dropped)
    }

    /// Drops every state.
    pub(crate) fn clear(&mut self) -> Vec<EntityKey> {
        let dropped: Vec<DeltaState> = self.states.drain(..).collect();
        self.cursor = 0;
        self.forget(dropped)
    }

    fn forget(&mut self, dropped: Vec<DeltaState>) -> Vec<EntityKey> {
        let mut released = Vec::new();
        for state in dropped {
            for b in state.bulletins {
                if let Some(n) = self.mentions.get_mut(&b.key) {
                    *n -= 1;
                    if *n == 0 {
                        self.mentions.remove(&b.key);
                        released.push(b.key);
                    }
                }
            }
        }
        released
    }
}

impl BrepArena {
    /// The rollback history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Rolls back the most recent applied state. Returns `false` if there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if !self.history.can_undo() {
            return Ok(false);
        }
        let index = self.history.cursor - 1;
        let state = self.history.states[index].clone();
        for b in state.bulletins.iter().rev() {
            self.write_record(b.key, b.old.clone())?;
        }
        self.history.cursor = index;
        self.boxes.clear();
        tracing::debug!(state = state.id.0, name = %state.name, "undo");
        Ok(true)
    }

    /// Re-applies the next state of the redo branch. Returns `false` if there
    /// is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        if !self.history.can_redo() {
            return Ok(false);
        }
        let index = self.history.cursor;
        let state = self.history.states[index].clone();
        for b in &state.bulletins {
            self.write_record(b.key, b.new.clone())?;
        }
        self.history.cursor = index + 1;
        self.boxes.clear();
        tracing::debug!(state = state.id.0, name = %state.name, "redo");
        Ok(true)
    }

    /// Discards all history. The current model is kept.
    pub fn prune_history(&mut self) {
        let released = self.history.clear();
        let reclaimed = self.reclaim_all(released);
        tracing::debug!(reclaimed, "history pruned");
    }

    /// Frees tombstoned slots for keys no longer mentioned by history.
    pub(crate) fn reclaim_all(&mut self, keys: Vec<EntityKey>) -> usize {
        let mut reclaimed = 0;
        for k in keys {
            if !self.history.mentions(k) && self.reclaim(k) {
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::BrepArena;
    use nalgebra::Point3;

    #[test]
    fn bulletin_kinds() {
        let key = EntityKey::Point(Default::default());
        let rec = Record::Point(crate::geometry::Counted::new(Point3::origin()));
        let b = |old: Option<Record>, new: Option<Record>| Bulletin { key, old, new };
        assert_eq!(b(None, Some(rec.clone())).kind(), BulletinKind::Create);
        assert_eq!(b(Some(rec.clone()), None).kind(), BulletinKind::Delete);
        assert_eq!(b(Some(rec.clone()), Some(rec)).kind(), BulletinKind::Change);
        assert_eq!(b(None, None).kind(), BulletinKind::NoBulletin);
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("make");
        let v = tx.make_vertex(Point3::new(1.0, 2.0, 3.0)).unwrap();
        let first = tx.commit();
        assert!(first.is_some());

        let mut tx = arena.begin("move");
        tx.set_vertex_point(v, Point3::new(4.0, 5.0, 6.0)).unwrap();
        tx.commit();
        assert_eq!(arena.vertex_position(v), Some(Point3::new(4.0, 5.0, 6.0)));

        assert!(arena.undo().unwrap());
        assert_eq!(arena.vertex_position(v), Some(Point3::new(1.0, 2.0, 3.0)));
        assert!(arena.undo().unwrap());
        assert!(arena.vertex(v).is_none());
        assert!(!arena.undo().unwrap());

        assert!(arena.redo().unwrap());
        assert!(arena.redo().unwrap());
        assert_eq!(arena.vertex_position(v), Some(Point3::new(4.0, 5.0, 6.0)));
        assert!(!arena.redo().unwrap());
    }

    #[test]
    fn commit_after_undo_discards_redo_branch() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("a");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        tx.commit();
        arena.undo().unwrap();
        assert!(arena.history().can_redo());

        let mut tx = arena.begin("b");
        tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        tx.commit();
        assert!(!arena.history().can_redo());
        assert_eq!(arena.history().states().len(), 1);
        assert!(!arena.history().mentions(a.into()));
        assert_eq!(arena.tombstone_count(), 0);
    }

    #[test]
    fn bounded_history_prunes_oldest() {
        let mut arena = BrepArena::with_options(
            crate::ModelingOptions::default().with_max_history(2),
        );
        for i in 0..4 {
            let mut tx = arena.begin(format!("step {i}"));
            tx.make_vertex(Point3::new(i as f64, 0.0, 0.0)).unwrap();
            tx.commit();
        }
        let names: Vec<&str> = arena
            .history()
            .states()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["step 2", "step 3"]);
        assert!(arena.undo().unwrap());
        assert!(arena.undo().unwrap());
        assert!(!arena.undo().unwrap());
        assert_eq!(arena.vertex_count(), 2);
    }

    #[test]
    fn prune_history_reclaims_tombstones() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("make");
        let v = tx.make_vertex(Point3::origin()).unwrap();
        tx.commit();
        let mut tx = arena.begin("lose");
        tx.lose(v).unwrap();
        tx.commit();
        assert!(arena.tombstone_count() > 0);

        arena.prune_history();
        assert_eq!(arena.tombstone_count(), 0);
        assert!(!arena.history().can_undo());
    }
}
