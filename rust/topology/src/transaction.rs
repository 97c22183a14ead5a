// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The transaction handle: the only way to change an arena.
//!
//! A [`Transaction`] holds the arena mutably for its whole lifetime. Every
//! write accessor backs the entity up before handing out `&mut`, so a change
//! without a recorded pre-image cannot be expressed. Reads go through
//! `Deref<Target = BrepArena>`.

use std::mem;
use std::ops::Deref;

use rustc_hash::FxHashMap;

use crate::arena::BrepArena;
use crate::error::{Error, Result};
use crate::history::{Bulletin, StateId};
use crate::keys::*;

/// An open set of changes on a [`BrepArena`].
///
/// Call [`commit`](Transaction::commit) to record the changes as one undoable
/// state. Dropping the transaction, or calling [`abort`](Transaction::abort),
/// restores every touched entity.
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'a> {
    pub(crate) arena: &'a mut BrepArena,
    name: String,
    bulletins: Vec<Bulletin>,
    touched: FxHashMap<EntityKey, usize>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(arena: &'a mut BrepArena, name: String) -> Self {
        Self {
            arena,
            name,
            bulletins: Vec::new(),
            touched: FxHashMap::default(),
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entities touched so far.
    pub fn touched(&self) -> usize {
        self.bulletins.len()
    }

    /// Records the pre-image of `key` unless it has already been recorded.
    pub(crate) fn backup(&mut self, key: EntityKey) -> Result<()> {
        if self.touched.contains_key(&key) {
            return Ok(());
        }
        let old = self.arena.record(key).ok_or(Error::NotFound(key))?;
        self.touched.insert(key, self.bulletins.len());
        self.bulletins.push(Bulletin {
            key,
            old: Some(old),
            new: None,
        });
        Ok(())
    }

    /// Registers a freshly inserted entity.
    pub(crate) fn created(&mut self, key: EntityKey) {
        tracing::trace!(?key, "create");
        self.touched.insert(key, self.bulletins.len());
        self.bulletins.push(Bulletin {
            key,
            old: None,
            new: None,
        });
    }

    /// Tombstones an entity after backing it up. Adjacency is the caller's
    /// business.
    pub(crate) fn erase(&mut self, key: EntityKey) -> Result<()> {
        self.backup(key)?;
        tracing::trace!(?key, "delete");
        self.arena.write_record(key, None)
    }

    fn use_count_mut(&mut self, key: EntityKey) -> Result<&mut u32> {
        Ok(match key {
            EntityKey::Point(k) => &mut self.point_mut(k)?.use_count,
            EntityKey::Curve(k) => &mut self.curve_mut(k)?.use_count,
            EntityKey::Pcurve(k) => &mut self.pcurve_mut(k)?.use_count,
            EntityKey::Surface(k) => &mut self.surface_mut(k)?.use_count,
            _ => return Err(Error::WrongType(key)),
        })
    }

    /// Increments the use count of a geometry entity.
    pub fn add_use(&mut self, key: impl Into<EntityKey>) -> Result<u32> {
        let count = self.use_count_mut(key.into())?;
        *count += 1;
        Ok(*count)
    }

    /// Decrements the use count of a geometry entity; the entity is lost
    /// when the count reaches zero.
    pub fn remove_use(&mut self, key: impl Into<EntityKey>) -> Result<u32> {
        let key = key.into();
        let count = self.use_count_mut(key)?;
        if *count == 0 {
            return Err(Error::UseCountUnderflow(key));
        }
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.lose_unused_geometry(key)?;
        }
        Ok(remaining)
    }

    fn lose_unused_geometry(&mut self, key: EntityKey) -> Result<()> {
        self.lose_owned_attributes(key)?;
        self.erase(key)?;
        self.notify_member_lost(key)
    }

    /// Records the changes as one undoable state.
    ///
    /// Returns `None` when nothing observable changed.
    pub fn commit(mut self) -> Option<StateId> {
        self.finished = true;
        let bulletins = mem::take(&mut self.bulletins);
        let name = mem::take(&mut self.name);

        let mut kept = Vec::with_capacity(bulletins.len());
        let mut released = Vec::new();
        for mut b in bulletins {
            b.new = self.arena.record(b.key);
            if b.old == b.new {
                if b.old.is_none() {
                    released.push(b.key);
                }
                continue;
            }
            tracing::trace!(key = ?b.key, kind = ?b.kind(), "bulletin");
            kept.push(b);
        }
        self.arena.boxes.clear();
        self.arena.reclaim_all(released);
        if kept.is_empty() {
            return None;
        }

        let count = kept.len();
        let (id, mut released) = self.arena.history.push(name.clone(), kept);
        if let Some(max) = self.arena.options.max_history_states {
            released.extend(self.arena.history.prune_to(max));
        }
        let reclaimed = self.arena.reclaim_all(released);
        tracing::debug!(state = id.0, %name, bulletins = count, reclaimed, "commit");
        Some(id)
    }

    /// Restores every touched entity and discards the transaction.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        self.finished = true;
        let bulletins = mem::take(&mut self.bulletins);
        let mut created = Vec::new();
        for b in bulletins.iter().rev() {
            if let Err(e) = self.arena.write_record(b.key, b.old.clone()) {
                debug_assert!(false, "rollback failed: {e}");
                tracing::error!(key = ?b.key, error = %e, "rollback failed");
            }
            if b.old.is_none() {
                created.push(b.key);
            }
        }
        self.arena.boxes.clear();
        self.arena.reclaim_all(created);
        tracing::debug!(name = %self.name, entities = bulletins.len(), "rollback");
    }
}

impl Deref for Transaction<'_> {
    type Target = BrepArena;

    fn deref(&self) -> &BrepArena {
        self.arena
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::BulletinKind;
    use nalgebra::Point3;

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut arena = BrepArena::new();
        {
            let mut tx = arena.begin("discarded");
            tx.make_vertex(Point3::origin()).unwrap();
            assert_eq!(tx.vertex_count(), 1);
        }
        assert_eq!(arena.vertex_count(), 0);
        assert_eq!(arena.point_count(), 0);
        assert_eq!(arena.tombstone_count(), 0);
        assert!(!arena.history().can_undo());
    }

    #[test]
    fn abort_restores_changed_entities() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("make");
        let v = tx.make_vertex(Point3::origin()).unwrap();
        tx.commit();

        let mut tx = arena.begin("move");
        tx.set_vertex_point(v, Point3::new(9.0, 9.0, 9.0)).unwrap();
        tx.abort();
        assert_eq!(arena.vertex_position(v), Some(Point3::origin()));
        assert_eq!(arena.history().states().len(), 1);
    }

    #[test]
    fn create_then_lose_leaves_no_bulletin() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("keep");
        let kept = tx.make_point(Point3::origin());
        tx.commit();

        let mut tx = arena.begin("churn");
        let p = tx.make_point(Point3::new(1.0, 0.0, 0.0));
        tx.lose(p).unwrap();
        tx.add_use(kept).unwrap();
        let id = tx.commit().unwrap();

        let state = arena.history().states().last().unwrap();
        assert_eq!(state.id, id);
        assert_eq!(state.bulletins.len(), 1);
        assert_eq!(state.count(BulletinKind::Change), 1);
        assert_eq!(arena.tombstone_count(), 0);
    }

    #[test]
    fn empty_commit_records_nothing() {
        let mut arena = BrepArena::new();
        let tx = arena.begin("nothing");
        assert_eq!(tx.commit(), None);
        assert!(!arena.history().can_undo());
    }

    #[test]
    fn use_counts_never_go_negative() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("counts");
        let p = tx.make_point(Point3::origin());
        assert_eq!(tx.add_use(p).unwrap(), 1);
        assert_eq!(tx.add_use(p).unwrap(), 2);
        assert_eq!(tx.remove_use(p).unwrap(), 1);
        assert_eq!(tx.remove_use(p).unwrap(), 0);
        assert!(tx.point(p).is_none(), "reaching zero loses the point");
        assert!(matches!(tx.remove_use(p), Err(Error::NotFound(_))));
        tx.commit();
    }

    #[test]
    fn unused_geometry_underflows() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("underflow");
        let p = tx.make_point(Point3::origin());
        assert!(matches!(tx.remove_use(p), Err(Error::UseCountUnderflow(_))));
        assert!(matches!(
            tx.add_use(EntityKey::Body(Default::default())),
            Err(Error::WrongType(_))
        ));
    }

    #[test]
    fn undo_restores_use_counts() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("make");
        let p = tx.make_point(Point3::origin());
        tx.add_use(p).unwrap();
        tx.commit();

        let mut tx = arena.begin("share");
        tx.add_use(p).unwrap();
        tx.add_use(p).unwrap();
        tx.commit();
        assert_eq!(arena.use_count(p.into()), Some(3));
        arena.undo().unwrap();
        assert_eq!(arena.use_count(p.into()), Some(1));
        arena.redo().unwrap();
        assert_eq!(arena.use_count(p.into()), Some(3));
    }
}
