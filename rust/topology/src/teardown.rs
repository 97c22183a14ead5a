// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered teardown of entities.
//!
//! [`Transaction::lose`] removes an entity together with everything it owns:
//! Body → Lump → Shell → Face → Loop → Coedge, then an Edge once its last
//! coedge is gone and a Vertex once its last edge is gone. Geometry use
//! counts are released on the way. Every lost entity first loses the
//! attributes it owns and then notifies attributes that reference it.

use crate::entity::CoedgeOwner;
use crate::error::{Error, Result};
use crate::keys::*;
use crate::transaction::Transaction;

/// Generates the unlink routine for one parent → children singly linked
/// chain (`head` on the parent, `next` on the child).
macro_rules! unlink_from_parent {
    ($name:ident, $key:ty, $get:ident, $get_mut:ident, $parent:ident,
     $parent_get:ident, $parent_mut:ident, $head:ident, $count:ident) => {
        fn $name(&mut self, child: $key) -> Result<()> {
            let data = self.$get(child).ok_or(Error::NotFound(child.into()))?;
            let (Some(parent), next) = (data.$parent, data.next) else {
                return Ok(());
            };
            let head = self
                .$parent_get(parent)
                .ok_or(Error::NotFound(parent.into()))?
                .$head;
            if head == Some(child) {
                self.$parent_mut(parent)?.$head = next;
            } else {
                let mut current = head;
                for _ in 0..self.$count() {
                    let Some(c) = current else { break };
                    let n = self.$get(c).and_then(|d| d.next);
                    if n == Some(child) {
                        self.$get_mut(c)?.next = next;
                        break;
                    }
                    current = n;
                }
            }
            let data = self.$get_mut(child)?;
            data.$parent = None;
            data.next = None;
            Ok(())
        }
    };
}

impl Transaction<'_> {
    unlink_from_parent!(unlink_lump, LumpKey, lump, lump_mut, body, body, body_mut, first_lump, lump_count);
    unlink_from_parent!(unlink_wire, WireKey, wire, wire_mut, body, body, body_mut, first_wire, wire_count);
    unlink_from_parent!(unlink_shell, ShellKey, shell, shell_mut, lump, lump, lump_mut, first_shell, shell_count);
    unlink_from_parent!(unlink_face, FaceKey, face, face_mut, shell, shell, shell_mut, first_face, face_count);
    unlink_from_parent!(unlink_loop, LoopKey, loop_data, loop_mut, face, face, face_mut, first_loop, loop_count);

    /// Loses an entity and everything it owns.
    ///
    /// Edges, vertices and geometry that are still used elsewhere cannot be
    /// lost directly and return [`Error::InUse`]; they go away on their own
    /// when their last user is lost.
    pub fn lose(&mut self, key: impl Into<EntityKey>) -> Result<()> {
        let key = key.into();
        if !self.contains(key) {
            return Err(Error::NotFound(key));
        }
        match key {
            EntityKey::Body(b) => self.lose_body(b),
            EntityKey::Lump(l) => {
                self.unlink_lump(l)?;
                self.lose_lump(l)
            }
            EntityKey::Shell(s) => {
                self.unlink_shell(s)?;
                self.lose_shell(s)
            }
            EntityKey::Face(f) => {
                self.unlink_face(f)?;
                self.lose_face(f)
            }
            EntityKey::Loop(l) => {
                self.unlink_loop(l)?;
                self.lose_loop(l)
            }
            EntityKey::Wire(w) => {
                self.unlink_wire(w)?;
                self.lose_wire(w)
            }
            EntityKey::Coedge(c) => {
                self.unlink_coedge(c)?;
                self.lose_coedge(c)
            }
            EntityKey::Edge(e) => {
                if self.edge(e).is_some_and(|d| d.coedge.is_some()) {
                    return Err(Error::InUse(key));
                }
                self.lose_edge(e)
            }
            EntityKey::Vertex(v) => {
                if !self.vertex_edges(v).is_empty() {
                    return Err(Error::InUse(key));
                }
                self.lose_vertex(v)
            }
            EntityKey::Point(_)
            | EntityKey::Curve(_)
            | EntityKey::Pcurve(_)
            | EntityKey::Surface(_) => {
                if self.use_count(key).unwrap_or(0) > 0 {
                    return Err(Error::InUse(key));
                }
                self.finish(key)
            }
            EntityKey::Attrib(a) => self.erase(a.into()),
        }
    }

    /// Final step shared by every entity kind.
    fn finish(&mut self, key: EntityKey) -> Result<()> {
        self.lose_owned_attributes(key)?;
        self.erase(key)?;
        self.notify_member_lost(key)
    }

    fn lose_body(&mut self, body: BodyKey) -> Result<()> {
        for l in self.body_lumps(body) {
            self.lose_lump(l)?;
        }
        for w in self.body_wires(body) {
            self.lose_wire(w)?;
        }
        self.finish(body.into())
    }

    fn lose_lump(&mut self, lump: LumpKey) -> Result<()> {
        for s in self.lump_shells(lump) {
            self.lose_shell(s)?;
        }
        self.finish(lump.into())
    }

    fn lose_shell(&mut self, shell: ShellKey) -> Result<()> {
        for f in self.shell_faces(shell) {
            self.lose_face(f)?;
        }
        self.finish(shell.into())
    }

    fn lose_face(&mut self, face: FaceKey) -> Result<()> {
        for l in self.face_loops(face) {
            self.lose_loop(l)?;
        }
        let surface = self.face(face).and_then(|f| f.surface);
        self.finish(face.into())?;
        if let Some(s) = surface {
            self.remove_use(s)?;
        }
        Ok(())
    }

    fn lose_loop(&mut self, lp: LoopKey) -> Result<()> {
        let coedges: Vec<CoedgeKey> = self.loop_coedges(lp).collect();
        for c in coedges {
            self.lose_coedge(c)?;
        }
        self.finish(lp.into())
    }

    fn lose_wire(&mut self, wire: WireKey) -> Result<()> {
        let coedges: Vec<CoedgeKey> = self.wire_coedges(wire).collect();
        for c in coedges {
            self.lose_coedge(c)?;
        }
        self.finish(wire.into())
    }

    /// Splices a coedge out of its owning chain.
    fn unlink_coedge(&mut self, coedge: CoedgeKey) -> Result<()> {
        let data = self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?;
        let (owner, next, previous) = (data.owner, data.next, data.previous);
        let (next, previous) = (next.filter(|n| *n != coedge), previous.filter(|p| *p != coedge));
        if let Some(p) = previous {
            self.coedge_mut(p)?.next = next;
        }
        if let Some(n) = next {
            self.coedge_mut(n)?.previous = previous;
        }
        match owner {
            Some(CoedgeOwner::Loop(l)) => {
                if self.loop_data(l).is_some_and(|d| d.start == Some(coedge)) {
                    self.loop_mut(l)?.start = next;
                }
                self.invalidate_loop(l)?;
            }
            Some(CoedgeOwner::Wire(w)) => {
                if self.wire(w).is_some_and(|d| d.coedge == Some(coedge)) {
                    self.wire_mut(w)?.coedge = next;
                }
            }
            None => {}
        }
        let data = self.coedge_mut(coedge)?;
        data.owner = None;
        data.next = None;
        data.previous = None;
        Ok(())
    }

    /// Removes a coedge from its edge's partner ring; the edge is lost when
    /// this was its last coedge.
    fn lose_coedge(&mut self, coedge: CoedgeKey) -> Result<()> {
        let data = self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?;
        let (edge, partner, pcurve) = (data.edge, data.partner, data.pcurve);
        let ring: Vec<CoedgeKey> = self.partners(coedge).collect();

        let replacement = match ring.len() {
            0 | 1 => None,
            2 => {
                let other = ring[1];
                self.coedge_mut(other)?.partner = None;
                Some(other)
            }
            _ => {
                let before = ring[ring.len() - 1];
                self.coedge_mut(before)?.partner = partner;
                partner
            }
        };
        if self.edge(edge).is_some_and(|e| e.coedge == Some(coedge)) {
            self.edge_mut(edge)?.coedge = replacement;
        }

        self.finish(coedge.into())?;
        if let Some(p) = pcurve {
            self.remove_use(p)?;
        }
        if self.edge(edge).is_some_and(|e| e.coedge.is_none()) {
            self.lose_edge(edge)?;
        }
        Ok(())
    }

    fn lose_edge(&mut self, edge: EdgeKey) -> Result<()> {
        let data = self.edge(edge).ok_or(Error::NotFound(edge.into()))?;
        let (start, end, curve) = (data.start, data.end, data.curve);
        self.finish(edge.into())?;
        if let Some(c) = curve {
            self.remove_use(c)?;
        }
        for v in [start, end].into_iter().flatten() {
            if self.vertex(v).is_some() {
                self.vertex_delete_edge(v, edge)?;
            }
        }
        Ok(())
    }

    fn lose_vertex(&mut self, vertex: VertexKey) -> Result<()> {
        let point = self
            .vertex(vertex)
            .ok_or(Error::NotFound(vertex.into()))?
            .point;
        self.finish(vertex.into())?;
        self.remove_use(point)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::BrepArena;
    use crate::entity::Sense;
    use crate::error::Error;
    use crate::keys::EntityType;
    use nalgebra::Point3;

    #[test]
    fn losing_a_body_releases_everything() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        tx.commit();
        assert_eq!(arena.edge_count(), 12);

        let mut tx = arena.begin("lose");
        tx.lose(body).unwrap();
        tx.commit();
        for ty in EntityType::ALL {
            assert_eq!(arena.count(*ty), 0, "{ty} left behind");
        }

        arena.undo().unwrap();
        assert_eq!(arena.face_count(), 6);
        assert_eq!(arena.vertex_count(), 8);
        assert_eq!(arena.body_faces(body).len(), 6);
    }

    #[test]
    fn losing_one_face_keeps_shared_edges() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        let face = tx.body_faces(body)[0];
        let edges = tx.face_edges(face);
        tx.lose(face).unwrap();

        assert_eq!(tx.body_faces(body).len(), 5);
        for e in edges {
            assert_eq!(tx.edge_coedges(e).len(), 1, "ring shrinks to one use");
            let c = tx.edge(e).unwrap().coedge.unwrap();
            assert_eq!(tx.coedge(c).unwrap().partner, None);
        }
        assert_eq!(tx.vertex_count(), 8);
        tx.commit();
    }

    #[test]
    fn used_edges_and_vertices_refuse_direct_loss() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("edge");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let e = tx.make_straight_edge(a, b).unwrap();
        let c = tx.make_coedge(e, Sense::Forward, None).unwrap();

        assert!(matches!(tx.lose(a), Err(Error::InUse(_))));
        assert!(matches!(tx.lose(e), Err(Error::InUse(_))));
        let curve = tx.edge(e).unwrap().curve.unwrap();
        assert!(matches!(tx.lose(curve), Err(Error::InUse(_))));

        tx.lose(c).unwrap();
        assert!(tx.edge(e).is_none());
        assert!(tx.vertex(a).is_none());
        assert!(tx.curve(curve).is_none());
        assert_eq!(tx.point_count(), 0);
        tx.commit();
    }

    #[test]
    fn losing_a_coedge_splices_its_loop() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("square");
        let face = tx
            .make_polygon_face(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        let lp = tx.face_loops(face)[0];
        let coedges: Vec<_> = tx.loop_coedges(lp).collect();
        tx.lose(coedges[0]).unwrap();

        let rest: Vec<_> = tx.loop_coedges(lp).collect();
        assert_eq!(rest, coedges[1..].to_vec());
        assert_eq!(tx.coedge_previous(coedges[1], false), Some(coedges[3]));
        assert_eq!(tx.coedge_next(coedges[3], false), Some(coedges[1]));
        tx.commit();
    }

    #[test]
    fn lost_keys_are_not_found() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("twice");
        let p = tx.make_point(Point3::origin());
        tx.lose(p).unwrap();
        assert!(matches!(tx.lose(p), Err(Error::NotFound(_))));
    }
}
