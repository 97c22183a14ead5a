// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Traversal methods for navigating the topology graph.
//!
//! Coedge navigation takes a `rev` flag that is XOR-composed into the stored
//! direction, so callers can walk a loop either way without branching.
//! Every chain walk is bounded by the number of live entities of its type,
//! so a malformed cycle terminates instead of spinning.

use rustc_hash::FxHashSet;

use crate::arena::BrepArena;
use crate::entity::{CoedgeOwner, Sense};
use crate::keys::*;

/// Iterator over a coedge chain (loop or wire), following `next`.
///
/// Stops when the start recurs (closed chain), at `None` (open chain), or
/// after visiting as many coedges as the arena holds.
pub struct CoedgeChain<'a> {
    arena: &'a BrepArena,
    start: Option<CoedgeKey>,
    current: Option<CoedgeKey>,
    remaining: usize,
}

impl Iterator for CoedgeChain<'_> {
    type Item = CoedgeKey;

    fn next(&mut self) -> Option<CoedgeKey> {
        let current = self.current?;
        if self.remaining == 0 {
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        let next = self.arena.coedge(current).and_then(|c| c.next);
        self.current = if next == self.start { None } else { next };
        Some(current)
    }
}

/// Iterator over the partner ring of a coedge, starting with the coedge
/// itself.
pub struct Partners<'a> {
    arena: &'a BrepArena,
    start: CoedgeKey,
    current: Option<CoedgeKey>,
    remaining: usize,
}

impl Iterator for Partners<'_> {
    type Item = CoedgeKey;

    fn next(&mut self) -> Option<CoedgeKey> {
        let current = self.current?;
        if self.remaining == 0 {
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        let partner = self.arena.coedge(current).and_then(|c| c.partner);
        self.current = match partner {
            Some(p) if p != self.start => Some(p),
            _ => None,
        };
        Some(current)
    }
}

/// Walks a singly linked chain from `first`, bounded by `bound` steps.
fn chain<K: Copy + Eq + std::hash::Hash>(
    first: Option<K>,
    bound: usize,
    next: impl Fn(K) -> Option<K>,
) -> Vec<K> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut current = first;
    while let Some(k) = current {
        if out.len() >= bound || !seen.insert(k) {
            break;
        }
        out.push(k);
        current = next(k);
    }
    out
}

// =============================================================================
// Coedge navigation
// =============================================================================

impl BrepArena {
    /// Next coedge in the owning chain; the previous one when `rev` is set.
    pub fn coedge_next(&self, key: CoedgeKey, rev: bool) -> Option<CoedgeKey> {
        let c = self.coedge(key)?;
        if rev {
            c.previous
        } else {
            c.next
        }
    }

    /// Previous coedge in the owning chain; the next one when `rev` is set.
    pub fn coedge_previous(&self, key: CoedgeKey, rev: bool) -> Option<CoedgeKey> {
        let c = self.coedge(key)?;
        if rev {
            c.next
        } else {
            c.previous
        }
    }

    /// Sense of the coedge relative to its edge, XOR-composed with `rev`.
    pub fn coedge_sense(&self, key: CoedgeKey, rev: bool) -> Option<Sense> {
        self.coedge(key).map(|c| c.sense.compose(rev))
    }

    /// The partner ring of a coedge, starting with the coedge itself.
    pub fn partners(&self, key: CoedgeKey) -> Partners<'_> {
        Partners {
            arena: self,
            start: key,
            current: self.coedge(key).map(|_| key),
            remaining: self.coedge_count(),
        }
    }

    /// Start vertex of a coedge in its own direction.
    pub fn coedge_start_vertex(&self, key: CoedgeKey) -> Option<VertexKey> {
        let c = self.coedge(key)?;
        let e = self.edge(c.edge)?;
        match c.sense {
            Sense::Forward => e.start,
            Sense::Reversed => e.end,
        }
    }

    /// End vertex of a coedge in its own direction.
    pub fn coedge_end_vertex(&self, key: CoedgeKey) -> Option<VertexKey> {
        let c = self.coedge(key)?;
        let e = self.edge(c.edge)?;
        match c.sense {
            Sense::Forward => e.end,
            Sense::Reversed => e.start,
        }
    }

    /// The face a coedge bounds, if it belongs to a loop on a face.
    pub fn coedge_face(&self, key: CoedgeKey) -> Option<FaceKey> {
        match self.coedge(key)?.owner? {
            CoedgeOwner::Loop(l) => self.loop_data(l)?.face,
            CoedgeOwner::Wire(_) => None,
        }
    }

    /// Loop that owns a coedge, if any.
    pub fn coedge_loop(&self, key: CoedgeKey) -> Option<LoopKey> {
        match self.coedge(key)?.owner? {
            CoedgeOwner::Loop(l) => Some(l),
            CoedgeOwner::Wire(_) => None,
        }
    }
}

// =============================================================================
// Chains: loops, wires, faces, shells, lumps
// =============================================================================

impl BrepArena {
    /// Coedges of a loop in traversal order, starting at the loop's start.
    pub fn loop_coedges(&self, key: LoopKey) -> CoedgeChain<'_> {
        let start = self.loop_data(key).and_then(|l| l.start);
        CoedgeChain {
            arena: self,
            start,
            current: start,
            remaining: self.coedge_count(),
        }
    }

    /// Coedges of a wire in traversal order.
    pub fn wire_coedges(&self, key: WireKey) -> CoedgeChain<'_> {
        let start = self.wire(key).and_then(|w| w.coedge);
        CoedgeChain {
            arena: self,
            start,
            current: start,
            remaining: self.coedge_count(),
        }
    }

    /// Returns `true` if following `next` from the loop's start returns to it.
    pub fn loop_is_closed(&self, key: LoopKey) -> bool {
        let Some(start) = self.loop_data(key).and_then(|l| l.start) else {
            return false;
        };
        let mut current = start;
        for _ in 0..self.coedge_count() {
            match self.coedge(current).and_then(|c| c.next) {
                Some(next) if next == start => return true,
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }

    /// Start vertices of the loop's coedges, in traversal order.
    pub fn loop_vertices(&self, key: LoopKey) -> Vec<VertexKey> {
        self.loop_coedges(key)
            .filter_map(|c| self.coedge_start_vertex(c))
            .collect()
    }

    /// Loops of a face, first loop first.
    pub fn face_loops(&self, key: FaceKey) -> Vec<LoopKey> {
        let first = self.face(key).and_then(|f| f.first_loop);
        chain(first, self.loop_count(), |l| self.loop_data(l).and_then(|d| d.next))
    }

    pub fn shell_faces(&self, key: ShellKey) -> Vec<FaceKey> {
        let first = self.shell(key).and_then(|s| s.first_face);
        chain(first, self.face_count(), |f| self.face(f).and_then(|d| d.next))
    }

    pub fn lump_shells(&self, key: LumpKey) -> Vec<ShellKey> {
        let first = self.lump(key).and_then(|l| l.first_shell);
        chain(first, self.shell_count(), |s| self.shell(s).and_then(|d| d.next))
    }

    pub fn body_lumps(&self, key: BodyKey) -> Vec<LumpKey> {
        let first = self.body(key).and_then(|b| b.first_lump);
        chain(first, self.lump_count(), |l| self.lump(l).and_then(|d| d.next))
    }

    pub fn body_wires(&self, key: BodyKey) -> Vec<WireKey> {
        let first = self.body(key).and_then(|b| b.first_wire);
        chain(first, self.wire_count(), |w| self.wire(w).and_then(|d| d.next))
    }
}

// =============================================================================
// Aggregates
// =============================================================================

impl BrepArena {
    /// All faces of a body, lump by lump and shell by shell.
    pub fn body_faces(&self, key: BodyKey) -> Vec<FaceKey> {
        self.body_lumps(key)
            .into_iter()
            .flat_map(|l| self.lump_shells(l))
            .flat_map(|s| self.shell_faces(s))
            .collect()
    }

    /// All coedges of a face, loop by loop.
    pub fn face_coedges(&self, key: FaceKey) -> Vec<CoedgeKey> {
        self.face_loops(key)
            .into_iter()
            .flat_map(|l| self.loop_coedges(l).collect::<Vec<_>>())
            .collect()
    }

    /// Unique edges of a face, in first-use order.
    pub fn face_edges(&self, key: FaceKey) -> Vec<EdgeKey> {
        let mut seen = FxHashSet::default();
        self.face_coedges(key)
            .into_iter()
            .filter_map(|c| self.coedge(c).map(|d| d.edge))
            .filter(|e| seen.insert(*e))
            .collect()
    }

    /// Unique edges of a body: face edges first, then wire edges.
    pub fn body_edges(&self, key: BodyKey) -> Vec<EdgeKey> {
        let mut seen = FxHashSet::default();
        let face_coedges = self
            .body_faces(key)
            .into_iter()
            .flat_map(|f| self.face_coedges(f));
        let wire_coedges = self
            .body_wires(key)
            .into_iter()
            .flat_map(|w| self.wire_coedges(w).collect::<Vec<_>>());
        face_coedges
            .chain(wire_coedges)
            .filter_map(|c| self.coedge(c).map(|d| d.edge))
            .filter(|e| seen.insert(*e))
            .collect()
    }

    /// Unique vertices of a body.
    pub fn body_vertices(&self, key: BodyKey) -> Vec<VertexKey> {
        let mut seen = FxHashSet::default();
        self.body_edges(key)
            .into_iter()
            .filter_map(|e| self.edge(e))
            .flat_map(|e| [e.start, e.end])
            .flatten()
            .filter(|v| seen.insert(*v))
            .collect()
    }

    /// Coedges using an edge (its partner ring).
    pub fn edge_coedges(&self, key: EdgeKey) -> Vec<CoedgeKey> {
        match self.edge(key).and_then(|e| e.coedge) {
            Some(c) => self.partners(c).collect(),
            None => Vec::new(),
        }
    }

    /// Faces meeting at an edge, one entry per face use.
    pub fn edge_faces(&self, key: EdgeKey) -> Vec<FaceKey> {
        self.edge_coedges(key)
            .into_iter()
            .filter_map(|c| self.coedge_face(c))
            .collect()
    }

    /// Edges ending at a vertex.
    pub fn vertex_edges(&self, key: VertexKey) -> &[EdgeKey] {
        self.vertex(key).map(|v| v.edges.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn square(arena: &mut BrepArena) -> (FaceKey, LoopKey, Vec<CoedgeKey>) {
        let mut tx = arena.begin("square");
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let face = tx.make_polygon_face(&pts).unwrap();
        tx.commit();
        let l = arena.face_loops(face)[0];
        let coedges = arena.loop_coedges(l).collect();
        (face, l, coedges)
    }

    #[test]
    fn closed_loop_returns_to_start() {
        let mut arena = BrepArena::new();
        let (_, l, coedges) = square(&mut arena);
        assert_eq!(coedges.len(), 4);
        assert!(arena.loop_is_closed(l));

        let start = coedges[0];
        let mut c = start;
        for _ in 0..4 {
            c = arena.coedge_next(c, false).unwrap();
        }
        assert_eq!(c, start);
    }

    #[test]
    fn next_rev_previous_rev_is_identity() {
        let mut arena = BrepArena::new();
        let (_, _, coedges) = square(&mut arena);
        for &c in &coedges {
            for rev in [false, true] {
                let n = arena.coedge_next(c, rev).unwrap();
                assert_eq!(arena.coedge_previous(n, rev), Some(c));
                let s = arena.coedge_sense(c, rev).unwrap();
                assert_eq!(s.compose(rev), arena.coedge_sense(c, false).unwrap());
            }
        }
    }

    #[test]
    fn loop_vertices_chain_end_to_start() {
        let mut arena = BrepArena::new();
        let (_, l, coedges) = square(&mut arena);
        for (i, &c) in coedges.iter().enumerate() {
            let next = coedges[(i + 1) % coedges.len()];
            assert_eq!(arena.coedge_end_vertex(c), arena.coedge_start_vertex(next));
        }
        assert_eq!(arena.loop_vertices(l).len(), 4);
    }

    #[test]
    fn open_wire_terminates_at_none() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("wire");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let c = tx.make_vertex(Point3::new(2.0, 0.0, 0.0)).unwrap();
        let e0 = tx.make_straight_edge(a, b).unwrap();
        let e1 = tx.make_straight_edge(b, c).unwrap();
        let c0 = tx.make_coedge(e0, Sense::Forward, None).unwrap();
        let c1 = tx.make_coedge(e1, Sense::Forward, None).unwrap();
        let w = tx.make_wire(&[c0, c1]).unwrap();
        tx.commit();

        let walked: Vec<_> = arena.wire_coedges(w).collect();
        assert_eq!(walked, vec![c0, c1]);
        assert_eq!(arena.coedge_next(c1, false), None);
        assert_eq!(arena.coedge_previous(c0, false), None);
    }

    #[test]
    fn malformed_cycle_is_bounded() {
        let mut arena = BrepArena::new();
        let (_, l, coedges) = square(&mut arena);
        // Short-circuit the loop into a cycle that never reaches the start.
        let mut tx = arena.begin("corrupt");
        tx.set_coedge_next(coedges[3], Some(coedges[1])).unwrap();
        tx.commit();
        assert!(arena.loop_coedges(l).count() <= arena.coedge_count());
        assert!(!arena.loop_is_closed(l));
    }

    #[test]
    fn walk_bounds_follow_lose_and_undo() {
        let mut arena = BrepArena::new();
        let (face, lp, coedges) = square(&mut arena);
        let mut tx = arena.begin("lose");
        tx.lose(face).unwrap();
        tx.commit();
        assert_eq!(arena.coedge_count(), 0);
        assert_eq!(arena.loop_count(), 0);

        arena.undo().unwrap();
        assert_eq!(arena.coedge_count(), coedges.len());
        assert_eq!(arena.loop_count(), 1);
        assert_eq!(arena.loop_coedges(lp).collect::<Vec<_>>(), coedges);
        assert_eq!(arena.face_loops(face), vec![lp]);
    }

    #[test]
    fn chain_walk_stops_at_repeat() {
        let ring = [1, 2, 3, 1];
        let walked = chain(Some(0usize), 10, |i| ring.get(i).copied());
        assert_eq!(walked, vec![0, 1, 2, 3]);
    }
}
