// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tolerant modeling: per-entity tolerances on vertices, edges and coedges,
//! and the coincidence predicate that every tolerance-aware comparison uses.
//!
//! A tolerant entity stores its tolerance in [`Modeling::Tolerant`]. A
//! negative value ([`NEEDS_UPDATE`]) marks it for recomputation from the
//! geometry. The pure [`BrepArena::tolerance`] recomputes without storing;
//! [`Transaction::tolerance_mut`] recomputes once and caches.

use nalgebra::Point3;

use crate::arena::BrepArena;
use crate::entity::{CoedgeOwner, Modeling, NEEDS_UPDATE};
use crate::error::{Error, Result};
use crate::geometry::point_segment_distance;
use crate::keys::*;
use crate::transaction::Transaction;

/// One side of a coincidence test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Probe {
    Vertex(VertexKey),
    Edge(EdgeKey),
    Point(Point3<f64>),
}

impl Probe {
    fn dimension(&self) -> u8 {
        match self {
            Probe::Vertex(_) | Probe::Point(_) => 0,
            Probe::Edge(_) => 1,
        }
    }
}

impl From<VertexKey> for Probe {
    fn from(v: VertexKey) -> Self {
        Probe::Vertex(v)
    }
}

impl From<EdgeKey> for Probe {
    fn from(e: EdgeKey) -> Self {
        Probe::Edge(e)
    }
}

impl From<Point3<f64>> for Probe {
    fn from(p: Point3<f64>) -> Self {
        Probe::Point(p)
    }
}

fn polyline_distance(p: &Point3<f64>, polyline: &[Point3<f64>]) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [q] => (p - q).norm(),
        _ => polyline
            .windows(2)
            .map(|w| point_segment_distance(p, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

// =============================================================================
// Measurement
// =============================================================================

impl BrepArena {
    /// 3D image of a coedge's pcurve on its face surface.
    pub fn pcurve_image(&self, key: CoedgeKey) -> Option<Vec<Point3<f64>>> {
        let pcurve = self.coedge_pcurve(key)?;
        let surface = self.face_surface(self.coedge_face(key)?)?;
        let mut points = Vec::with_capacity(pcurve.points.len() * 2);
        for w in pcurve.points.windows(2) {
            points.push(surface.point(&w[0]));
            points.push(surface.point(&nalgebra::center(&w[0], &w[1])));
        }
        if let Some(last) = pcurve.points.last() {
            points.push(surface.point(last));
        }
        Some(points)
    }

    /// Largest distance between a coedge's pcurve image and its edge curve.
    pub fn coedge_deviation(&self, key: CoedgeKey) -> f64 {
        let Some(edge) = self.coedge(key).map(|c| c.edge) else {
            return 0.0;
        };
        let (Some(image), Some(curve)) = (self.pcurve_image(key), self.edge_curve(edge)) else {
            return 0.0;
        };
        let range = self.edge_param_range(edge);
        image
            .iter()
            .map(|p| curve.distance(p, range))
            .fold(0.0, f64::max)
    }

    /// Distance from a vertex to the matching end of an edge's curve.
    fn end_gap(&self, edge: EdgeKey, vertex: VertexKey) -> f64 {
        let (Some(curve), Some(p)) = (self.edge_curve(edge), self.vertex_position(vertex)) else {
            return 0.0;
        };
        curve.distance(&p, self.edge_param_range(edge))
    }

    /// Geometric deviation of an edge: coedge deviations and endpoint gaps.
    pub fn edge_deviation(&self, key: EdgeKey) -> f64 {
        let Some(edge) = self.edge(key) else {
            return 0.0;
        };
        let coedges = self
            .edge_coedges(key)
            .into_iter()
            .map(|c| self.coedge_deviation(c))
            .fold(0.0, f64::max);
        [edge.start, edge.end]
            .into_iter()
            .flatten()
            .map(|v| self.end_gap(key, v))
            .fold(coedges, f64::max)
    }

    /// Largest gap between a vertex and the ends of its edges.
    pub fn vertex_deviation(&self, key: VertexKey) -> f64 {
        self.vertex_edges(key)
            .iter()
            .map(|&e| self.end_gap(e, key))
            .fold(0.0, f64::max)
    }

    /// Number of topological uses of a tolerance-bearing entity.
    fn tolerant_uses(&self, key: EntityKey) -> usize {
        match key {
            EntityKey::Vertex(v) => self.vertex_edges(v).len(),
            EntityKey::Edge(e) => self.edge_coedges(e).len(),
            _ => 1,
        }
    }

    /// Tolerance recomputed from the geometry, ignoring any stored value.
    pub fn measure_tolerance(&self, key: EntityKey) -> Option<f64> {
        let measured = match key {
            EntityKey::Coedge(c) => {
                self.coedge(c)?;
                self.coedge_deviation(c)
            }
            EntityKey::Edge(e) => {
                self.edge(e)?;
                self.edge_deviation(e)
            }
            EntityKey::Vertex(v) => {
                self.vertex(v)?;
                self.vertex_edges(v)
                    .iter()
                    .map(|&e| self.end_gap(e, v) + self.tolerance(e.into()).unwrap_or(0.0))
                    .fold(0.0, f64::max)
            }
            _ => return None,
        };
        if self.tolerant_uses(key) > 1 {
            Some(measured.max(self.resabs()))
        } else {
            Some(measured)
        }
    }

    /// Tolerance of a vertex, edge or coedge; zero for exact entities.
    ///
    /// A stale tolerance is recomputed but not stored.
    pub fn tolerance(&self, key: EntityKey) -> Option<f64> {
        match self.modeling(key)? {
            Modeling::Exact => Some(0.0),
            Modeling::Tolerant { tolerance } if tolerance >= 0.0 => Some(tolerance),
            Modeling::Tolerant { .. } => self.measure_tolerance(key),
        }
    }

    fn probe_tolerance(&self, probe: &Probe) -> f64 {
        match probe {
            Probe::Vertex(v) => self.tolerance((*v).into()).unwrap_or(0.0),
            Probe::Edge(e) => self.tolerance((*e).into()).unwrap_or(0.0),
            Probe::Point(_) => 0.0,
        }
    }

    /// Pcurve images of a tolerant edge's tolerant coedges; empty for
    /// exact edges.
    fn tolerant_images(&self, key: EdgeKey) -> Vec<Vec<Point3<f64>>> {
        if !self.edge(key).is_some_and(|e| e.modeling.is_tolerant()) {
            return Vec::new();
        }
        self.edge_coedges(key)
            .into_iter()
            .filter(|c| self.coedge(*c).is_some_and(|d| d.modeling.is_tolerant()))
            .filter_map(|c| self.pcurve_image(c))
            .collect()
    }

    /// Polylines making up the point set of an edge: the pcurve images of its
    /// tolerant coedges, or its own curve when none has a pcurve.
    fn edge_point_sets(&self, key: EdgeKey) -> Vec<Vec<Point3<f64>>> {
        let images = self.tolerant_images(key);
        if !images.is_empty() {
            return images;
        }
        self.edge_samples(key).into_iter().collect()
    }

    /// Evenly spaced points along an edge, straight or not.
    fn edge_samples(&self, key: EdgeKey) -> Option<Vec<Point3<f64>>> {
        let (Some(curve), Some(range)) = (self.edge_curve(key), self.edge_param_range(key)) else {
            return self.edge_polyline(key);
        };
        let n = self.options.curve_samples.max(2);
        Some(
            (0..=n)
                .map(|i| curve.point(range.interpolate(i as f64 / n as f64)))
                .collect(),
        )
    }

    fn probe_samples(&self, probe: &Probe) -> Option<Vec<Point3<f64>>> {
        match probe {
            Probe::Vertex(v) => self.vertex_position(*v).map(|p| vec![p]),
            Probe::Point(p) => Some(vec![*p]),
            Probe::Edge(e) => Some(self.edge_point_sets(*e).concat()),
        }
    }

    /// Distance from a point to the point set of a probe.
    fn distance_to(&self, p: &Point3<f64>, probe: &Probe) -> Option<f64> {
        match probe {
            Probe::Vertex(v) => self.vertex_position(*v).map(|q| (p - q).norm()),
            Probe::Point(q) => Some((p - q).norm()),
            Probe::Edge(e) => {
                let images = self.tolerant_images(*e);
                if !images.is_empty() {
                    return images.iter().map(|s| polyline_distance(p, s)).reduce(f64::min);
                }
                match self.edge_curve(*e) {
                    Some(curve) => Some(curve.distance(p, self.edge_param_range(*e))),
                    None => self.edge_polyline(*e).map(|s| polyline_distance(p, &s)),
                }
            }
        }
    }

    fn directed_distance(&self, from: &Probe, to: &Probe) -> Option<f64> {
        let samples = self.probe_samples(from)?;
        samples
            .iter()
            .map(|p| self.distance_to(p, to))
            .try_fold(0.0, |acc, d| d.map(|d| f64::max(acc, d)))
    }

    /// Distance between the point sets of two probes.
    ///
    /// A lower-dimensional set is measured into the higher one; sets of equal
    /// dimension use the symmetric Hausdorff distance.
    pub fn point_set_distance(&self, a: impl Into<Probe>, b: impl Into<Probe>) -> Option<f64> {
        let (a, b) = (a.into(), b.into());
        match a.dimension().cmp(&b.dimension()) {
            std::cmp::Ordering::Less => self.directed_distance(&a, &b),
            std::cmp::Ordering::Greater => self.directed_distance(&b, &a),
            std::cmp::Ordering::Equal => {
                let ab = self.directed_distance(&a, &b)?;
                let ba = self.directed_distance(&b, &a)?;
                Some(ab.max(ba))
            }
        }
    }

    /// Returns `true` if two probes coincide within the larger of their
    /// tolerances and `resabs`.
    pub fn coincident(&self, a: impl Into<Probe>, b: impl Into<Probe>) -> bool {
        let (a, b) = (a.into(), b.into());
        let threshold = self
            .probe_tolerance(&a)
            .max(self.probe_tolerance(&b))
            .max(self.resabs());
        self.point_set_distance(a, b)
            .is_some_and(|d| d < threshold)
    }
}

// =============================================================================
// Transitions
// =============================================================================

impl Transaction<'_> {
    fn check_tolerance(&self, key: EntityKey, tolerance: f64) -> Result<()> {
        if tolerance == 0.0 && self.tolerant_uses(key) > 1 {
            return Err(Error::ZeroToleranceShared(key));
        }
        Ok(())
    }

    fn set_modeling(&mut self, key: EntityKey, modeling: Modeling) -> Result<()> {
        match key {
            EntityKey::Vertex(v) => self.vertex_mut(v)?.modeling = modeling,
            EntityKey::Edge(e) => self.edge_mut(e)?.modeling = modeling,
            EntityKey::Coedge(c) => self.coedge_mut(c)?.modeling = modeling,
            _ => return Err(Error::WrongType(key)),
        }
        Ok(())
    }

    /// Makes a vertex tolerant. A negative tolerance leaves it to be
    /// recomputed on demand.
    pub fn make_tolerant_vertex(&mut self, vertex: VertexKey, tolerance: f64) -> Result<()> {
        self.vertex(vertex).ok_or(Error::NotFound(vertex.into()))?;
        self.check_tolerance(vertex.into(), tolerance)?;
        self.set_modeling(vertex.into(), Modeling::Tolerant { tolerance })
    }

    /// Makes a coedge tolerant. A face coedge needs a pcurve unless
    /// `approx_ok` is set.
    pub fn make_tolerant_coedge(&mut self, coedge: CoedgeKey, tolerance: f64, approx_ok: bool) -> Result<()> {
        let data = self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?;
        if !approx_ok && matches!(data.owner, Some(CoedgeOwner::Loop(_))) && data.pcurve.is_none() {
            return Err(Error::MissingPcurve(coedge));
        }
        self.set_modeling(coedge.into(), Modeling::Tolerant { tolerance })
    }

    /// Makes an edge tolerant in place, together with its coedges and end
    /// vertices. Adjacency is untouched.
    pub fn make_tolerant_edge(&mut self, edge: EdgeKey, tolerance: f64, approx_ok: bool) -> Result<()> {
        let data = self.edge(edge).ok_or(Error::NotFound(edge.into()))?;
        let ends: Vec<VertexKey> = [data.start, data.end].into_iter().flatten().collect();
        self.check_tolerance(edge.into(), tolerance)?;
        let coedges = self.edge_coedges(edge);
        if !approx_ok {
            for &c in &coedges {
                let d = self.coedge(c).ok_or(Error::NotFound(c.into()))?;
                if matches!(d.owner, Some(CoedgeOwner::Loop(_))) && d.pcurve.is_none() {
                    return Err(Error::MissingPcurve(c));
                }
            }
        }

        self.set_modeling(edge.into(), Modeling::Tolerant { tolerance })?;
        for c in coedges {
            if !self.modeling(c.into()).is_some_and(|m| m.is_tolerant()) {
                self.make_tolerant_coedge(c, NEEDS_UPDATE, true)?;
            }
        }
        for v in ends {
            if !self.modeling(v.into()).is_some_and(|m| m.is_tolerant()) {
                self.make_tolerant_vertex(v, NEEDS_UPDATE)?;
            }
        }
        tracing::debug!(?edge, tolerance, "make tolerant");
        Ok(())
    }

    fn make_exact(&mut self, key: EntityKey, deviation: f64) -> Result<()> {
        if deviation >= self.resabs() {
            return Err(Error::ToleranceTooLarge { key, deviation });
        }
        self.set_modeling(key, Modeling::Exact)
    }

    /// Turns a tolerant vertex exact again if its gaps are below `resabs`.
    pub fn make_exact_vertex(&mut self, vertex: VertexKey) -> Result<()> {
        self.vertex(vertex).ok_or(Error::NotFound(vertex.into()))?;
        let deviation = self.vertex_deviation(vertex);
        self.make_exact(vertex.into(), deviation)
    }

    pub fn make_exact_coedge(&mut self, coedge: CoedgeKey) -> Result<()> {
        self.coedge(coedge).ok_or(Error::NotFound(coedge.into()))?;
        let deviation = self.coedge_deviation(coedge);
        self.make_exact(coedge.into(), deviation)
    }

    /// Turns a tolerant edge and its coedges exact again if the geometry
    /// agrees within `resabs`.
    pub fn make_exact_edge(&mut self, edge: EdgeKey) -> Result<()> {
        self.edge(edge).ok_or(Error::NotFound(edge.into()))?;
        let deviation = self.edge_deviation(edge);
        self.make_exact(edge.into(), deviation)?;
        for c in self.edge_coedges(edge) {
            if self.modeling(c.into()).is_some_and(|m| m.is_tolerant()) {
                self.make_exact_coedge(c)?;
            }
        }
        Ok(())
    }

    /// Tolerance, recomputed and cached if stale.
    pub fn tolerance_mut(&mut self, key: EntityKey) -> Result<f64> {
        let modeling = self.modeling(key).ok_or(Error::NotFound(key))?;
        if !modeling.needs_update() {
            return Ok(modeling.stored_tolerance().unwrap_or(0.0));
        }
        self.update_tolerance(key)
    }

    /// Recomputes and caches the tolerance of a tolerant entity. Exact
    /// entities report zero and stay exact.
    pub fn update_tolerance(&mut self, key: EntityKey) -> Result<f64> {
        let modeling = self.modeling(key).ok_or(Error::NotFound(key))?;
        if !modeling.is_tolerant() {
            return Ok(0.0);
        }
        let tolerance = self.measure_tolerance(key).ok_or(Error::WrongType(key))?;
        self.set_modeling(key, Modeling::Tolerant { tolerance })?;
        tracing::trace!(?key, tolerance, "tolerance updated");
        Ok(tolerance)
    }

    /// Marks a tolerant entity's tolerance for recomputation.
    pub(crate) fn mark_tolerance_stale(&mut self, key: EntityKey) -> Result<()> {
        match self.modeling(key) {
            Some(m) if m.is_tolerant() && !m.needs_update() => self.set_modeling(
                key,
                Modeling::Tolerant {
                    tolerance: NEEDS_UPDATE,
                },
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Sense;
    use approx::assert_relative_eq;

    fn segment(arena: &mut BrepArena) -> (VertexKey, VertexKey, EdgeKey) {
        let mut tx = arena.begin("segment");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let e = tx.make_straight_edge(a, b).unwrap();
        tx.commit();
        (a, b, e)
    }

    #[test]
    fn coincidence_is_reflexive_and_symmetric() {
        let mut arena = BrepArena::new();
        let (a, b, e) = segment(&mut arena);
        for probe in [Probe::Vertex(a), Probe::Edge(e)] {
            assert!(arena.coincident(probe, probe));
        }
        assert!(arena.coincident(a, e));
        assert!(arena.coincident(e, a));
        assert!(!arena.coincident(a, b));
        let near = Point3::new(0.5, 1e-7, 0.0);
        assert_eq!(arena.coincident(near, e), arena.coincident(e, near));
        assert!(arena.coincident(near, e));
    }

    #[test]
    fn tolerant_edge_widens_coincidence() {
        let mut arena = BrepArena::new();
        let (a, b, e) = segment(&mut arena);
        let mut tx = arena.begin("tolerant");
        tx.make_tolerant_edge(e, 0.001, true).unwrap();
        tx.commit();

        assert_relative_eq!(arena.tolerance(e.into()).unwrap(), 0.001);
        assert_eq!(arena.edge(e).unwrap().start, Some(a));
        assert_eq!(arena.edge(e).unwrap().end, Some(b));
        assert!(arena.vertex(a).unwrap().modeling.is_tolerant());
        assert!(arena.coincident(Point3::new(0.5, 0.0005, 0.0), e));
        assert!(!arena.coincident(Point3::new(0.5, 0.01, 0.0), e));

        arena.undo().unwrap();
        assert_eq!(arena.edge(e).unwrap().modeling, Modeling::Exact);
        assert!(!arena.coincident(Point3::new(0.5, 0.0005, 0.0), e));
    }

    #[test]
    fn stale_vertex_tolerance_is_recomputed() {
        let mut arena = BrepArena::new();
        let (a, _, e) = segment(&mut arena);
        let mut tx = arena.begin("tolerant");
        tx.make_tolerant_edge(e, 0.002, true).unwrap();
        assert!(tx.vertex(a).unwrap().modeling.needs_update());
        assert_relative_eq!(tx.tolerance(a.into()).unwrap(), 0.002);
        assert!(tx.vertex(a).unwrap().modeling.needs_update(), "pure query stores nothing");
        assert_relative_eq!(tx.tolerance_mut(a.into()).unwrap(), 0.002);
        assert!(!tx.vertex(a).unwrap().modeling.needs_update());
        tx.commit();
    }

    #[test]
    fn face_coedges_need_pcurves_unless_approximating() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("loop");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let c = tx.make_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
        let edges = [
            tx.make_straight_edge(a, b).unwrap(),
            tx.make_straight_edge(b, c).unwrap(),
            tx.make_straight_edge(c, a).unwrap(),
        ];
        let coedges: Vec<_> = edges
            .iter()
            .map(|&e| tx.make_coedge(e, Sense::Forward, None).unwrap())
            .collect();
        tx.make_loop(&coedges).unwrap();

        assert!(matches!(
            tx.make_tolerant_edge(edges[0], 0.001, false),
            Err(Error::MissingPcurve(_))
        ));
        assert_eq!(tx.edge(edges[0]).unwrap().modeling, Modeling::Exact);
        tx.make_tolerant_edge(edges[0], 0.001, true).unwrap();
        tx.commit();
    }

    #[test]
    fn zero_tolerance_only_for_single_use() {
        let mut arena = BrepArena::new();
        let (a, _, e) = segment(&mut arena);
        let mut tx = arena.begin("zero");
        tx.make_tolerant_edge(e, 0.0, true).unwrap();
        let b = tx.make_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
        tx.make_straight_edge(a, b).unwrap();
        assert!(matches!(
            tx.make_tolerant_vertex(a, 0.0),
            Err(Error::ZeroToleranceShared(_))
        ));
        tx.commit();
    }

    #[test]
    fn exact_again_only_when_geometry_agrees() {
        let mut arena = BrepArena::new();
        let (a, _, e) = segment(&mut arena);
        let mut tx = arena.begin("round trip");
        tx.make_tolerant_edge(e, 0.001, true).unwrap();
        tx.make_exact_edge(e).unwrap();
        assert_eq!(tx.edge(e).unwrap().modeling, Modeling::Exact);

        tx.make_tolerant_vertex(a, 0.01).unwrap();
        tx.set_vertex_point(a, Point3::new(0.0, 0.005, 0.0)).unwrap();
        let err = tx.make_exact_vertex(a).unwrap_err();
        assert!(matches!(err, Error::ToleranceTooLarge { .. }));
        tx.commit();
    }

    #[test]
    fn hausdorff_between_parallel_edges() {
        let mut arena = BrepArena::new();
        let (_, _, e0) = segment(&mut arena);
        let mut tx = arena.begin("parallel");
        let c = tx.make_vertex(Point3::new(0.0, 0.1, 0.0)).unwrap();
        let d = tx.make_vertex(Point3::new(1.0, 0.1, 0.0)).unwrap();
        let e1 = tx.make_straight_edge(c, d).unwrap();
        tx.commit();
        assert_relative_eq!(arena.point_set_distance(e0, e1).unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(arena.point_set_distance(e1, e0).unwrap(), 0.1, epsilon = 1e-12);
    }
}
