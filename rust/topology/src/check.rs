// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural checking.
//!
//! [`BrepArena::check`] walks the whole model and reports every broken
//! invariant it finds instead of stopping at the first one. It never
//! modifies the model; a healing pass decides what to do with the report.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::arena::BrepArena;
use crate::entity::*;
use crate::keys::*;
use crate::spatial::SpatialIndex;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A reference points at a lost or never-created entity.
    Dangling {
        owner: EntityKey,
        field: &'static str,
        target: EntityKey,
    },
    /// A coedge in an edge's partner ring uses a different edge.
    PartnerWrongEdge { edge: EdgeKey, coedge: CoedgeKey },
    /// Following partners from the edge's coedge does not come back round.
    PartnerRingOpen { edge: EdgeKey },
    /// The ring does not hold every coedge that uses the edge.
    PartnerCountMismatch {
        edge: EdgeKey,
        ring: usize,
        uses: usize,
    },
    /// `next.previous` (or `previous.next`) is not the coedge itself.
    LinkMismatch { coedge: CoedgeKey },
    /// A face loop whose chain does not close.
    LoopNotClosed { lp: LoopKey },
    /// A coedge ends at a different vertex than its successor starts at.
    LoopGap { coedge: CoedgeKey, next: CoedgeKey },
    /// An edge on a closed curve with exactly one end vertex.
    ClosedCurveEnds { edge: EdgeKey },
    /// A vertex and an edge disagree about their adjacency.
    VertexEdgeMismatch { vertex: VertexKey, edge: EdgeKey },
    /// Two exact vertices within `resabs` of each other.
    CoincidentVertices {
        a: VertexKey,
        b: VertexKey,
        distance: f64,
    },
    /// A stored geometry use count differs from the references to it.
    UseCountMismatch {
        geometry: EntityKey,
        stored: u32,
        actual: u32,
    },
    /// Zero tolerance on an entity with more than one tolerant use.
    ZeroToleranceShared { key: EntityKey },
    /// A periphery loop that winds clockwise about its face normal.
    WindingMismatch { lp: LoopKey, winding: f64 },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Dangling {
                owner,
                field,
                target,
            } => write!(f, "{owner:?}.{field} references missing {target:?}"),
            Issue::PartnerWrongEdge { edge, coedge } => {
                write!(f, "partner ring of {edge:?} holds {coedge:?} of another edge")
            }
            Issue::PartnerRingOpen { edge } => write!(f, "partner ring of {edge:?} is not closed"),
            Issue::PartnerCountMismatch { edge, ring, uses } => {
                write!(f, "{edge:?} has {uses} coedges but its ring holds {ring}")
            }
            Issue::LinkMismatch { coedge } => write!(f, "next/previous links of {coedge:?} disagree"),
            Issue::LoopNotClosed { lp } => write!(f, "{lp:?} is not closed"),
            Issue::LoopGap { coedge, next } => {
                write!(f, "{coedge:?} does not end where {next:?} starts")
            }
            Issue::ClosedCurveEnds { edge } => {
                write!(f, "{edge:?} lies on a closed curve but has only one vertex")
            }
            Issue::VertexEdgeMismatch { vertex, edge } => {
                write!(f, "{vertex:?} and {edge:?} disagree about adjacency")
            }
            Issue::CoincidentVertices { a, b, distance } => {
                write!(f, "exact vertices {a:?} and {b:?} coincide ({distance:.2e})")
            }
            Issue::UseCountMismatch {
                geometry,
                stored,
                actual,
            } => write!(f, "{geometry:?} use count is {stored}, references {actual}"),
            Issue::ZeroToleranceShared { key } => {
                write!(f, "{key:?} has zero tolerance but several tolerant uses")
            }
            Issue::WindingMismatch { lp, winding } => {
                write!(f, "periphery {lp:?} winds the wrong way (winding {winding:.3})")
            }
        }
    }
}

/// Result of [`BrepArena::check`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Number of live entities examined.
    pub entities: usize,
    pub issues: Vec<Issue>,
}

impl CheckReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Check Report:")?;
        writeln!(f, "  Entities: {}", self.entities)?;
        writeln!(f, "  Issues: {}", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "    - {issue}")?;
        }
        Ok(())
    }
}

impl BrepArena {
    /// Outgoing references of one entity, with the field they are held in.
    fn references(&self, key: EntityKey) -> Vec<(&'static str, EntityKey)> {
        fn push<K: Into<EntityKey>>(out: &mut Vec<(&'static str, EntityKey)>, field: &'static str, k: Option<K>) {
            if let Some(k) = k {
                out.push((field, k.into()));
            }
        }
        let mut out = Vec::new();
        match key {
            EntityKey::Body(k) => {
                if let Some(d) = self.body(k) {
                    push(&mut out, "first_lump", d.first_lump);
                    push(&mut out, "first_wire", d.first_wire);
                }
            }
            EntityKey::Lump(k) => {
                if let Some(d) = self.lump(k) {
                    push(&mut out, "body", d.body);
                    push(&mut out, "next", d.next);
                    push(&mut out, "first_shell", d.first_shell);
                }
            }
            EntityKey::Shell(k) => {
                if let Some(d) = self.shell(k) {
                    push(&mut out, "lump", d.lump);
                    push(&mut out, "next", d.next);
                    push(&mut out, "first_face", d.first_face);
                }
            }
            EntityKey::Face(k) => {
                if let Some(d) = self.face(k) {
                    push(&mut out, "shell", d.shell);
                    push(&mut out, "next", d.next);
                    push(&mut out, "first_loop", d.first_loop);
                    push(&mut out, "surface", d.surface);
                }
            }
            EntityKey::Loop(k) => {
                if let Some(d) = self.loop_data(k) {
                    push(&mut out, "face", d.face);
                    push(&mut out, "next", d.next);
                    push(&mut out, "start", d.start);
                }
            }
            EntityKey::Wire(k) => {
                if let Some(d) = self.wire(k) {
                    push(&mut out, "body", d.body);
                    push(&mut out, "next", d.next);
                    push(&mut out, "coedge", d.coedge);
                }
            }
            EntityKey::Coedge(k) => {
                if let Some(d) = self.coedge(k) {
                    push(&mut out, "edge", Some(d.edge));
                    push(&mut out, "owner", d.owner);
                    push(&mut out, "next", d.next);
                    push(&mut out, "previous", d.previous);
                    push(&mut out, "partner", d.partner);
                    push(&mut out, "pcurve", d.pcurve);
                }
            }
            EntityKey::Edge(k) => {
                if let Some(d) = self.edge(k) {
                    push(&mut out, "start", d.start);
                    push(&mut out, "end", d.end);
                    push(&mut out, "coedge", d.coedge);
                    push(&mut out, "curve", d.curve);
                }
            }
            EntityKey::Vertex(k) => {
                if let Some(d) = self.vertex(k) {
                    push(&mut out, "point", Some(d.point));
                    for &e in &d.edges {
                        push(&mut out, "edges", Some(e));
                    }
                }
            }
            EntityKey::Attrib(k) => {
                if let Some(d) = self.attrib(k) {
                    push(&mut out, "owner", Some(d.owner));
                }
            }
            EntityKey::Point(_) | EntityKey::Curve(_) | EntityKey::Pcurve(_) | EntityKey::Surface(_) => {}
        }
        out
    }

    /// Checks the whole model and lists every problem found.
    pub fn check(&self) -> CheckReport {
        let entities = self.entities();
        let mut issues = Vec::new();

        for &key in &entities {
            for (field, target) in self.references(key) {
                if !self.contains(target) {
                    issues.push(Issue::Dangling {
                        owner: key,
                        field,
                        target,
                    });
                }
            }
        }

        self.check_partners(&mut issues);
        self.check_chains(&mut issues);
        self.check_vertices(&mut issues);
        self.check_use_counts(&mut issues);
        self.check_tolerances(&mut issues);
        self.check_windings(&mut issues);

        tracing::debug!(entities = entities.len(), issues = issues.len(), "check");
        CheckReport {
            entities: entities.len(),
            issues,
        }
    }

    fn check_partners(&self, issues: &mut Vec<Issue>) {
        let mut uses: FxHashMap<EdgeKey, usize> = FxHashMap::default();
        for (_, c) in self.coedges.iter() {
            *uses.entry(c.edge).or_default() += 1;
        }
        for (edge, data) in self.edges.iter() {
            let uses = uses.get(&edge).copied().unwrap_or(0);
            let Some(first) = data.coedge else {
                if uses > 0 {
                    issues.push(Issue::PartnerCountMismatch { edge, ring: 0, uses });
                }
                continue;
            };
            let ring: Vec<CoedgeKey> = self.partners(first).collect();
            for &c in &ring {
                if self.coedge(c).is_some_and(|d| d.edge != edge) {
                    issues.push(Issue::PartnerWrongEdge { edge, coedge: c });
                }
            }
            let last = ring.last().and_then(|&c| self.coedge(c)).and_then(|d| d.partner);
            let closed = match ring.len() {
                0 => true,
                1 => last.is_none() || last == Some(first),
                _ => last == Some(first),
            };
            if !closed {
                issues.push(Issue::PartnerRingOpen { edge });
            }
            if ring.len() != uses {
                issues.push(Issue::PartnerCountMismatch {
                    edge,
                    ring: ring.len(),
                    uses,
                });
            }
        }
    }

    fn check_chains(&self, issues: &mut Vec<Issue>) {
        for (key, c) in self.coedges.iter() {
            let next_ok = c
                .next
                .map_or(true, |n| self.coedge(n).is_some_and(|d| d.previous == Some(key)));
            let previous_ok = c
                .previous
                .map_or(true, |p| self.coedge(p).is_some_and(|d| d.next == Some(key)));
            if !(next_ok && previous_ok) {
                issues.push(Issue::LinkMismatch { coedge: key });
            }
            if let Some(next) = c.next {
                let end = self.coedge_end_vertex(key);
                let start = self.coedge_start_vertex(next);
                if end.is_some() && start.is_some() && end != start {
                    issues.push(Issue::LoopGap { coedge: key, next });
                }
            }
        }
        for (lp, data) in self.loops.iter() {
            if data.face.is_some() && data.start.is_some() && !self.loop_is_closed(lp) {
                issues.push(Issue::LoopNotClosed { lp });
            }
        }
    }

    fn check_vertices(&self, issues: &mut Vec<Issue>) {
        for (edge, data) in self.edges.iter() {
            let closed = data
                .curve
                .and_then(|c| self.curve(c))
                .is_some_and(|c| c.geometry.is_closed());
            if closed && data.start.is_some() != data.end.is_some() {
                issues.push(Issue::ClosedCurveEnds { edge });
            }
            for v in [data.start, data.end].into_iter().flatten() {
                if self.vertex(v).is_some_and(|d| !d.edges.contains(&edge)) {
                    issues.push(Issue::VertexEdgeMismatch { vertex: v, edge });
                }
            }
        }
        for (vertex, data) in self.vertices.iter() {
            for &edge in &data.edges {
                let ends = self.edge(edge).map(|e| [e.start, e.end]);
                if ends.is_some_and(|ends| !ends.contains(&Some(vertex))) {
                    issues.push(Issue::VertexEdgeMismatch { vertex, edge });
                }
            }
        }

        let resabs = self.resabs();
        let index = SpatialIndex::from_arena(self, resabs);
        for (a, data) in self.vertices.iter() {
            if data.modeling.is_tolerant() {
                continue;
            }
            let Some(p) = self.vertex_position(a) else {
                continue;
            };
            for b in index.find_all_near(&p, resabs) {
                if b <= a || self.vertex(b).is_some_and(|d| d.modeling.is_tolerant()) {
                    continue;
                }
                if let Some(q) = self.vertex_position(b) {
                    issues.push(Issue::CoincidentVertices {
                        a,
                        b,
                        distance: (q - p).norm(),
                    });
                }
            }
        }
    }

    fn check_use_counts(&self, issues: &mut Vec<Issue>) {
        let mut actual: FxHashMap<EntityKey, u32> = FxHashMap::default();
        let references = self
            .vertices
            .iter()
            .map(|(_, v)| Some(EntityKey::from(v.point)))
            .chain(self.edges.iter().map(|(_, e)| e.curve.map(EntityKey::from)))
            .chain(self.coedges.iter().map(|(_, c)| c.pcurve.map(EntityKey::from)))
            .chain(self.faces.iter().map(|(_, f)| f.surface.map(EntityKey::from)));
        for key in references.flatten() {
            *actual.entry(key).or_default() += 1;
        }
        let geometry = self
            .points
            .keys()
            .map(EntityKey::from)
            .chain(self.curves.keys().map(EntityKey::from))
            .chain(self.pcurves.keys().map(EntityKey::from))
            .chain(self.surfaces.keys().map(EntityKey::from));
        for key in geometry {
            let stored = self.use_count(key).unwrap_or(0);
            let actual = actual.get(&key).copied().unwrap_or(0);
            if stored != actual {
                issues.push(Issue::UseCountMismatch {
                    geometry: key,
                    stored,
                    actual,
                });
            }
        }
    }

    fn check_tolerances(&self, issues: &mut Vec<Issue>) {
        for (vertex, data) in self.vertices.iter() {
            let shared = data.edges.len() > 1;
            if shared && data.modeling.stored_tolerance() == Some(0.0) {
                issues.push(Issue::ZeroToleranceShared { key: vertex.into() });
            }
        }
        for (edge, data) in self.edges.iter() {
            let shared = self.edge_coedges(edge).len() > 1;
            if shared && data.modeling.stored_tolerance() == Some(0.0) {
                issues.push(Issue::ZeroToleranceShared { key: edge.into() });
            }
        }
    }

    fn check_windings(&self, issues: &mut Vec<Issue>) {
        for (face, _) in self.faces.iter() {
            let loops = self.face_loops(face);
            for &lp in &loops {
                let stored = self.loop_data(lp).map(|l| l.kind).unwrap_or_default();
                let expect_periphery =
                    stored == LoopType::Periphery || (loops.len() == 1 && stored == LoopType::Unknown);
                if !expect_periphery {
                    continue;
                }
                if let Some(winding) = self.loop_winding(lp) {
                    if self.classify_loop(lp) == LoopType::Hole {
                        issues.push(Issue::WindingMismatch { lp, winding });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::BrepArena;
    use nalgebra::Point3;

    fn block() -> (BrepArena, BodyKey) {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        tx.commit();
        (arena, body)
    }

    #[test]
    fn valid_block_has_no_issues() {
        let (arena, _) = block();
        let report = arena.check();
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.entities, arena.entities().len());
    }

    #[test]
    fn coincident_exact_vertices_are_reported() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("vertices");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1e-8, 0.0, 0.0)).unwrap();
        tx.commit();
        let report = arena.check();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0],
            Issue::CoincidentVertices { a: x, b: y, .. } if (x, y) == (a.min(b), a.max(b))
        ));

        let mut tx = arena.begin("tolerant");
        tx.make_tolerant_vertex(a, 1e-6).unwrap();
        tx.commit();
        assert!(arena.check().is_valid());
    }

    #[test]
    fn broken_links_are_reported() {
        let (mut arena, body) = block();
        let face = arena.body_faces(body)[0];
        let c = arena.face_coedges(face)[0];
        let mut tx = arena.begin("break");
        tx.set_coedge_partner(c, None).unwrap();
        tx.set_coedge_next(c, None).unwrap();
        tx.commit();

        let report = arena.check();
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, Issue::LinkMismatch { .. })));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, Issue::LoopNotClosed { .. })));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, Issue::PartnerRingOpen { .. } | Issue::PartnerCountMismatch { .. })));

        arena.undo().unwrap();
        assert!(arena.check().is_valid());
    }

    #[test]
    fn reversed_face_winds_the_wrong_way() {
        let (mut arena, body) = block();
        let face = arena.body_faces(body)[0];
        let mut tx = arena.begin("flip");
        tx.set_face_sense(face, Sense::Reversed).unwrap();
        tx.commit();
        let report = arena.check();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0], Issue::WindingMismatch { .. }));
    }

    #[test]
    fn report_serializes_with_kind_tags() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("vertices");
        tx.make_vertex(Point3::origin()).unwrap();
        tx.make_vertex(Point3::origin()).unwrap();
        tx.commit();
        let json = serde_json::to_string(&arena.check()).unwrap();
        assert!(json.contains("\"kind\":\"coincident_vertices\""));
    }
}
