// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction and setter methods.
//!
//! Each entity is created through a [`Transaction`], which checks that every
//! referenced entity exists, maintains back-references and use counts, and
//! records the change for rollback.

use nalgebra::{Point2, Point3, Vector3};

use crate::entity::*;
use crate::error::{Error, Result};
use crate::geometry::{Counted, Curve, Interval, Pcurve, Surface};
use crate::keys::*;
use crate::transaction::Transaction;

// =============================================================================
// Geometry
// =============================================================================

impl Transaction<'_> {
    /// Creates an unused point.
    pub fn make_point(&mut self, p: Point3<f64>) -> PointKey {
        self.insert_point(Counted::new(p))
    }

    pub fn make_curve(&mut self, curve: Curve) -> CurveKey {
        self.insert_curve(Counted::new(curve))
    }

    pub fn make_straight(&mut self, root: Point3<f64>, direction: Vector3<f64>) -> Result<CurveKey> {
        let curve = Curve::straight(root, direction)
            .ok_or(Error::DegenerateGeometry("zero line direction"))?;
        Ok(self.make_curve(curve))
    }

    pub fn make_circle(
        &mut self,
        centre: Point3<f64>,
        normal: Vector3<f64>,
        major: Vector3<f64>,
    ) -> Result<CurveKey> {
        let curve = Curve::circle(centre, normal, major)
            .ok_or(Error::DegenerateGeometry("circle normal or radius is zero"))?;
        Ok(self.make_curve(curve))
    }

    pub fn make_surface(&mut self, surface: Surface) -> SurfaceKey {
        self.insert_surface(Counted::new(surface))
    }

    pub fn make_plane(&mut self, root: Point3<f64>, normal: Vector3<f64>) -> Result<SurfaceKey> {
        let surface =
            Surface::plane(root, normal).ok_or(Error::DegenerateGeometry("zero plane normal"))?;
        Ok(self.make_surface(surface))
    }

    pub fn make_sphere(&mut self, centre: Point3<f64>, radius: f64) -> Result<SurfaceKey> {
        let surface = Surface::sphere(centre, radius)
            .ok_or(Error::DegenerateGeometry("sphere radius must be positive"))?;
        Ok(self.make_surface(surface))
    }

    pub fn make_cylinder(
        &mut self,
        root: Point3<f64>,
        axis: Vector3<f64>,
        radius: f64,
    ) -> Result<SurfaceKey> {
        let surface = Surface::cylinder(root, axis, radius)
            .ok_or(Error::DegenerateGeometry("cylinder axis or radius is degenerate"))?;
        Ok(self.make_surface(surface))
    }

    pub fn make_pcurve(&mut self, points: Vec<Point2<f64>>) -> Result<PcurveKey> {
        let pcurve =
            Pcurve::new(points).ok_or(Error::DegenerateGeometry("pcurve needs two points"))?;
        Ok(self.insert_pcurve(Counted::new(pcurve)))
    }
}

// =============================================================================
// Topology
// =============================================================================

impl Transaction<'_> {
    /// Creates a vertex on a new point.
    pub fn make_vertex(&mut self, p: Point3<f64>) -> Result<VertexKey> {
        let point = self.make_point(p);
        self.make_vertex_on(point)
    }

    /// Creates a vertex on an existing (possibly shared) point.
    pub fn make_vertex_on(&mut self, point: PointKey) -> Result<VertexKey> {
        self.add_use(point)?;
        Ok(self.insert_vertex(VertexData {
            point,
            edges: Vec::new(),
            modeling: Modeling::Exact,
        }))
    }

    /// Creates an edge.
    ///
    /// On a closed curve both vertices must be given or both omitted. The
    /// parameter range is derived from the vertices until set explicitly.
    pub fn make_edge(
        &mut self,
        start: Option<VertexKey>,
        end: Option<VertexKey>,
        curve: Option<CurveKey>,
        sense: Sense,
    ) -> Result<EdgeKey> {
        for v in [start, end].into_iter().flatten() {
            if self.vertex(v).is_none() {
                return Err(Error::NotFound(v.into()));
            }
        }
        if let Some(c) = curve {
            let closed = self
                .curve(c)
                .ok_or(Error::NotFound(c.into()))?
                .geometry
                .is_closed();
            if closed && start.is_some() != end.is_some() {
                return Err(Error::ClosedCurveEnds);
            }
            self.add_use(c)?;
        }
        let edge = self.insert_edge(EdgeData {
            start,
            end,
            coedge: None,
            curve,
            sense,
            param_range: None,
            convexity: Convexity::Unknown,
            modeling: Modeling::Exact,
        });
        for v in [start, end].into_iter().flatten() {
            self.vertex_add_edge(v, edge)?;
        }
        Ok(edge)
    }

    /// Creates a straight edge from `start` to `end` on a new line.
    pub fn make_straight_edge(&mut self, start: VertexKey, end: VertexKey) -> Result<EdgeKey> {
        let a = self
            .vertex_position(start)
            .ok_or(Error::NotFound(start.into()))?;
        let b = self.vertex_position(end).ok_or(Error::NotFound(end.into()))?;
        let curve = self.make_straight(a, b - a)?;
        self.make_edge(Some(start), Some(end), Some(curve), Sense::Forward)
    }

    /// Creates a coedge on `edge` and links it into the edge's partner ring.
    pub fn make_coedge(
        &mut self,
        edge: EdgeKey,
        sense: Sense,
        pcurve: Option<PcurveKey>,
    ) -> Result<CoedgeKey> {
        let existing = self.edge(edge).ok_or(Error::NotFound(edge.into()))?.coedge;
        if let Some(p) = pcurve {
            self.add_use(p)?;
        }
        let coedge = self.insert_coedge(CoedgeData {
            edge,
            sense,
            pcurve,
            ..Default::default()
        });
        match existing {
            None => self.edge_mut(edge)?.coedge = Some(coedge),
            Some(first) => {
                let after = self
                    .coedge(first)
                    .ok_or(Error::NotFound(first.into()))?
                    .partner
                    .unwrap_or(first);
                self.coedge_mut(coedge)?.partner = Some(after);
                self.coedge_mut(first)?.partner = Some(coedge);
            }
        }
        Ok(coedge)
    }

    /// Validates a coedge chain before linking. Returns whether it closes up.
    fn check_chain(&self, coedges: &[CoedgeKey]) -> Result<bool> {
        if coedges.is_empty() {
            return Err(Error::EmptyLoop);
        }
        for &c in coedges {
            let data = self.coedge(c).ok_or(Error::NotFound(c.into()))?;
            if data.owner.is_some() {
                return Err(Error::CoedgeInUse(c));
            }
        }
        for i in 0..coedges.len() - 1 {
            let end = self.coedge_end_vertex(coedges[i]);
            if end.is_none() || end != self.coedge_start_vertex(coedges[i + 1]) {
                return Err(Error::DisconnectedLoop(i, i + 1));
            }
        }
        let n = coedges.len();
        let last_end = self.coedge_end_vertex(coedges[n - 1]);
        let first_start = self.coedge_start_vertex(coedges[0]);
        let closed = if n == 1 {
            last_end == first_start
        } else {
            last_end.is_some() && last_end == first_start
        };
        Ok(closed)
    }

    /// Links a checked chain of coedges and hands them to `owner`.
    fn link_chain(&mut self, coedges: &[CoedgeKey], owner: CoedgeOwner, closed: bool) -> Result<()> {
        let n = coedges.len();
        for (i, &c) in coedges.iter().enumerate() {
            let next = match coedges.get(i + 1) {
                Some(&n) => Some(n),
                None if closed => Some(coedges[0]),
                None => None,
            };
            let previous = match i.checked_sub(1) {
                Some(p) => Some(coedges[p]),
                None if closed => Some(coedges[n - 1]),
                None => None,
            };
            let data = self.coedge_mut(c)?;
            data.owner = Some(owner);
            data.next = next;
            data.previous = previous;
        }
        Ok(())
    }

    /// Creates a loop from coedges given in traversal order.
    ///
    /// Each coedge must end where the next one starts. The loop is closed if
    /// the last coedge ends where the first starts, and open otherwise.
    pub fn make_loop(&mut self, coedges: &[CoedgeKey]) -> Result<LoopKey> {
        let closed = self.check_chain(coedges)?;
        let lp = self.insert_loop(LoopData {
            start: coedges.first().copied(),
            ..Default::default()
        });
        self.link_chain(coedges, CoedgeOwner::Loop(lp), closed)?;
        Ok(lp)
    }

    /// Creates a wire from coedges given in traversal order.
    pub fn make_wire(&mut self, coedges: &[CoedgeKey]) -> Result<WireKey> {
        let closed = self.check_chain(coedges)?;
        let wire = self.insert_wire(WireData {
            coedge: coedges.first().copied(),
            ..Default::default()
        });
        self.link_chain(coedges, CoedgeOwner::Wire(wire), closed)?;
        Ok(wire)
    }

    /// Creates a face bounded by `loops` on `surface`.
    pub fn make_face(
        &mut self,
        loops: &[LoopKey],
        surface: Option<SurfaceKey>,
        sense: Sense,
    ) -> Result<FaceKey> {
        for &l in loops {
            let data = self.loop_data(l).ok_or(Error::NotFound(l.into()))?;
            if data.face.is_some() {
                return Err(Error::LoopInUse(l));
            }
        }
        if let Some(s) = surface {
            self.add_use(s)?;
        }
        let face = self.insert_face(FaceData {
            first_loop: loops.first().copied(),
            surface,
            sense,
            ..Default::default()
        });
        for (i, &l) in loops.iter().enumerate() {
            let data = self.loop_mut(l)?;
            data.face = Some(face);
            data.next = loops.get(i + 1).copied();
        }
        Ok(face)
    }

    pub fn make_shell(&mut self, faces: &[FaceKey]) -> Result<ShellKey> {
        if faces.is_empty() {
            return Err(Error::EmptyShell);
        }
        for &f in faces {
            let data = self.face(f).ok_or(Error::NotFound(f.into()))?;
            if data.shell.is_some() {
                return Err(Error::AlreadyOwned(f.into()));
            }
        }
        let shell = self.insert_shell(ShellData {
            first_face: faces.first().copied(),
            ..Default::default()
        });
        for (i, &f) in faces.iter().enumerate() {
            let data = self.face_mut(f)?;
            data.shell = Some(shell);
            data.next = faces.get(i + 1).copied();
        }
        Ok(shell)
    }

    pub fn make_lump(&mut self, shells: &[ShellKey]) -> Result<LumpKey> {
        for &s in shells {
            let data = self.shell(s).ok_or(Error::NotFound(s.into()))?;
            if data.lump.is_some() {
                return Err(Error::AlreadyOwned(s.into()));
            }
        }
        let lump = self.insert_lump(LumpData {
            first_shell: shells.first().copied(),
            ..Default::default()
        });
        for (i, &s) in shells.iter().enumerate() {
            let data = self.shell_mut(s)?;
            data.lump = Some(lump);
            data.next = shells.get(i + 1).copied();
        }
        Ok(lump)
    }

    pub fn make_body(&mut self, lumps: &[LumpKey], wires: &[WireKey]) -> Result<BodyKey> {
        for &l in lumps {
            let data = self.lump(l).ok_or(Error::NotFound(l.into()))?;
            if data.body.is_some() {
                return Err(Error::AlreadyOwned(l.into()));
            }
        }
        for &w in wires {
            let data = self.wire(w).ok_or(Error::NotFound(w.into()))?;
            if data.body.is_some() {
                return Err(Error::AlreadyOwned(w.into()));
            }
        }
        let body = self.insert_body(BodyData {
            first_lump: lumps.first().copied(),
            first_wire: wires.first().copied(),
        });
        for (i, &l) in lumps.iter().enumerate() {
            let data = self.lump_mut(l)?;
            data.body = Some(body);
            data.next = lumps.get(i + 1).copied();
        }
        for (i, &w) in wires.iter().enumerate() {
            let data = self.wire_mut(w)?;
            data.body = Some(body);
            data.next = wires.get(i + 1).copied();
        }
        Ok(body)
    }
}

// =============================================================================
// Setters
// =============================================================================

impl Transaction<'_> {
    /// Moves a vertex onto a new point, releasing the old one.
    pub fn set_vertex_point(&mut self, vertex: VertexKey, p: Point3<f64>) -> Result<()> {
        let old = self.vertex(vertex).ok_or(Error::NotFound(vertex.into()))?.point;
        let point = self.make_point(p);
        self.add_use(point)?;
        self.vertex_mut(vertex)?.point = point;
        self.remove_use(old)?;
        self.mark_tolerance_stale(vertex.into())?;
        for e in self.vertex_edges(vertex).to_vec() {
            self.mark_tolerance_stale(e.into())?;
            self.invalidate_edge(e)?;
        }
        Ok(())
    }

    /// Makes `edge` the first entry of the vertex's edge list.
    pub fn vertex_set_edge(&mut self, vertex: VertexKey, edge: EdgeKey) -> Result<()> {
        if self.edge(edge).is_none() {
            return Err(Error::NotFound(edge.into()));
        }
        let data = self.vertex_mut(vertex)?;
        data.edges.retain(|e| *e != edge);
        data.edges.insert(0, edge);
        Ok(())
    }

    pub fn vertex_add_edge(&mut self, vertex: VertexKey, edge: EdgeKey) -> Result<()> {
        let present = self
            .vertex(vertex)
            .ok_or(Error::NotFound(vertex.into()))?
            .edges
            .contains(&edge);
        if !present {
            self.vertex_mut(vertex)?.edges.push(edge);
        }
        Ok(())
    }

    /// Removes `edge` from the vertex's edge list; the vertex is lost when its
    /// last edge goes.
    pub fn vertex_delete_edge(&mut self, vertex: VertexKey, edge: EdgeKey) -> Result<()> {
        let data = self.vertex_mut(vertex)?;
        data.edges.retain(|e| *e != edge);
        if data.edges.is_empty() {
            self.lose(vertex)?;
        }
        Ok(())
    }

    fn check_closed_ends(&self, edge: EdgeKey, start: Option<VertexKey>, end: Option<VertexKey>) -> Result<()> {
        let closed = self.edge_curve(edge).is_some_and(Curve::is_closed);
        if closed && start.is_some() != end.is_some() {
            return Err(Error::ClosedCurveEnds);
        }
        Ok(())
    }

    /// Replaces both end vertices of an edge at once.
    pub fn set_edge_vertices(
        &mut self,
        edge: EdgeKey,
        start: Option<VertexKey>,
        end: Option<VertexKey>,
    ) -> Result<()> {
        let data = self.edge(edge).ok_or(Error::NotFound(edge.into()))?;
        let (old_start, old_end) = (data.start, data.end);
        self.check_closed_ends(edge, start, end)?;
        for v in [start, end].into_iter().flatten() {
            self.vertex_add_edge(v, edge)?;
        }
        {
            let data = self.edge_mut(edge)?;
            data.start = start;
            data.end = end;
            data.param_range = None;
        }
        for v in [old_start, old_end].into_iter().flatten() {
            if Some(v) != start && Some(v) != end && self.vertex(v).is_some() {
                self.vertex_delete_edge(v, edge)?;
            }
        }
        self.mark_tolerance_stale(edge.into())?;
        self.invalidate_edge(edge)
    }

    pub fn set_edge_start(&mut self, edge: EdgeKey, start: Option<VertexKey>) -> Result<()> {
        let end = self.edge(edge).ok_or(Error::NotFound(edge.into()))?.end;
        self.set_edge_vertices(edge, start, end)
    }

    pub fn set_edge_end(&mut self, edge: EdgeKey, end: Option<VertexKey>) -> Result<()> {
        let start = self.edge(edge).ok_or(Error::NotFound(edge.into()))?.start;
        self.set_edge_vertices(edge, start, end)
    }

    /// Replaces the curve of an edge, swapping use counts.
    pub fn set_edge_geometry(&mut self, edge: EdgeKey, curve: Option<CurveKey>) -> Result<()> {
        let data = self.edge(edge).ok_or(Error::NotFound(edge.into()))?;
        let (old, start, end) = (data.curve, data.start, data.end);
        if old == curve {
            return Ok(());
        }
        if let Some(c) = curve {
            let closed = self
                .curve(c)
                .ok_or(Error::NotFound(c.into()))?
                .geometry
                .is_closed();
            if closed && start.is_some() != end.is_some() {
                return Err(Error::ClosedCurveEnds);
            }
            self.add_use(c)?;
        }
        {
            let data = self.edge_mut(edge)?;
            data.curve = curve;
            data.param_range = None;
        }
        if let Some(c) = old {
            self.remove_use(c)?;
        }
        self.mark_tolerance_stale(edge.into())?;
        self.invalidate_edge(edge)
    }

    pub fn set_edge_sense(&mut self, edge: EdgeKey, sense: Sense) -> Result<()> {
        self.edge_mut(edge)?.sense = sense;
        self.invalidate_edge(edge)
    }

    pub fn set_edge_param_range(&mut self, edge: EdgeKey, range: Option<Interval>) -> Result<()> {
        self.edge_mut(edge)?.param_range = range;
        Ok(())
    }

    pub fn set_edge_convexity(&mut self, edge: EdgeKey, convexity: Convexity) -> Result<()> {
        self.edge_mut(edge)?.convexity = convexity;
        Ok(())
    }

    pub fn set_coedge_next(&mut self, coedge: CoedgeKey, next: Option<CoedgeKey>) -> Result<()> {
        self.coedge_mut(coedge)?.next = next;
        Ok(())
    }

    pub fn set_coedge_previous(&mut self, coedge: CoedgeKey, previous: Option<CoedgeKey>) -> Result<()> {
        self.coedge_mut(coedge)?.previous = previous;
        Ok(())
    }

    pub fn set_coedge_partner(&mut self, coedge: CoedgeKey, partner: Option<CoedgeKey>) -> Result<()> {
        self.coedge_mut(coedge)?.partner = partner;
        Ok(())
    }

    pub fn set_coedge_sense(&mut self, coedge: CoedgeKey, sense: Sense) -> Result<()> {
        self.coedge_mut(coedge)?.sense = sense;
        if let Some(l) = self.coedge_loop(coedge) {
            self.invalidate_loop(l)?;
        }
        Ok(())
    }

    /// Replaces the pcurve of a coedge, swapping use counts.
    pub fn set_coedge_pcurve(&mut self, coedge: CoedgeKey, pcurve: Option<PcurveKey>) -> Result<()> {
        let old = self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?.pcurve;
        if old == pcurve {
            return Ok(());
        }
        if let Some(p) = pcurve {
            self.add_use(p)?;
        }
        self.coedge_mut(coedge)?.pcurve = pcurve;
        if let Some(p) = old {
            self.remove_use(p)?;
        }
        Ok(())
    }

    /// Moves the start of a loop to one of its own coedges.
    pub fn set_loop_start(&mut self, lp: LoopKey, start: CoedgeKey) -> Result<()> {
        let owner = self.coedge(start).ok_or(Error::NotFound(start.into()))?.owner;
        if owner != Some(CoedgeOwner::Loop(lp)) {
            return Err(Error::WrongType(start.into()));
        }
        self.loop_mut(lp)?.start = Some(start);
        Ok(())
    }

    /// Replaces the surface of a face, swapping use counts.
    pub fn set_face_surface(&mut self, face: FaceKey, surface: Option<SurfaceKey>) -> Result<()> {
        let old = self.face(face).ok_or(Error::NotFound(face.into()))?.surface;
        if old == surface {
            return Ok(());
        }
        if let Some(s) = surface {
            self.add_use(s)?;
        }
        self.face_mut(face)?.surface = surface;
        if let Some(s) = old {
            self.remove_use(s)?;
        }
        self.invalidate_face(face)
    }

    pub fn set_face_sense(&mut self, face: FaceKey, sense: Sense) -> Result<()> {
        self.face_mut(face)?.sense = sense;
        self.invalidate_face(face)
    }

    pub fn set_face_sides(
        &mut self,
        face: FaceKey,
        sides: Sidedness,
        containment: Containment,
    ) -> Result<()> {
        let data = self.face_mut(face)?;
        data.sides = sides;
        data.containment = match sides {
            Sidedness::Single => Containment::Out,
            Sidedness::Double => containment,
        };
        Ok(())
    }

    /// Clears cached classifications that depend on an edge's shape.
    pub(crate) fn invalidate_edge(&mut self, edge: EdgeKey) -> Result<()> {
        if self.edge(edge).is_some_and(|e| e.convexity != Convexity::Unknown) {
            self.edge_mut(edge)?.convexity = Convexity::Unknown;
        }
        for c in self.edge_coedges(edge) {
            if let Some(l) = self.coedge_loop(c) {
                self.invalidate_loop(l)?;
            }
        }
        Ok(())
    }

    pub(crate) fn invalidate_loop(&mut self, lp: LoopKey) -> Result<()> {
        if self.loop_data(lp).is_some_and(|l| l.kind != LoopType::Unknown) {
            self.loop_mut(lp)?.kind = LoopType::Unknown;
        }
        Ok(())
    }

    fn invalidate_face(&mut self, face: FaceKey) -> Result<()> {
        for l in self.face_loops(face) {
            self.invalidate_loop(l)?;
        }
        for e in self.face_edges(face) {
            if self.edge(e).is_some_and(|d| d.convexity != Convexity::Unknown) {
                self.edge_mut(e)?.convexity = Convexity::Unknown;
            }
        }
        Ok(())
    }
}
