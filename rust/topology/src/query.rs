// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric queries over topology: parameter ranges, polylines, bounding
//! boxes, normals, loop classification and edge convexity.
//!
//! Queries on `&BrepArena` never write. Box queries have `_mut` forms that
//! cache in the arena; the cache is not model state and is cleared whenever
//! the model changes. Classifications that are model state (loop type,
//! edge convexity) are cached through a [`Transaction`] instead.

use nalgebra::{Point3, Vector3};

use crate::arena::BrepArena;
use crate::entity::{Convexity, LoopType, Sense};
use crate::error::{Error, Result};
use crate::geometry::{Aabb, Interval};
use crate::keys::*;
use crate::transaction::Transaction;

/// Twice the area vector of a closed polygon (Newell's method).
pub(crate) fn newell(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut normal = Vector3::zeros();
    let n = points.len();
    for i in 0..n {
        let curr = points[i];
        let next = points[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    normal
}

// =============================================================================
// Edges
// =============================================================================

impl BrepArena {
    /// Curve parameter range of an edge: the stored range, or one derived
    /// from the end vertices (the full period for a vertexless closed curve).
    pub fn edge_param_range(&self, key: EdgeKey) -> Option<Interval> {
        let edge = self.edge(key)?;
        if let Some(range) = edge.param_range {
            return Some(range);
        }
        let curve = self.edge_curve(key)?;
        let (Some(start), Some(end)) = (edge.start, edge.end) else {
            return curve.period().map(|p| Interval::new(0.0, p));
        };
        let t_start = curve.param(&self.vertex_position(start)?);
        let t_end = curve.param(&self.vertex_position(end)?);
        let (lo, mut hi) = match edge.sense {
            Sense::Forward => (t_start, t_end),
            Sense::Reversed => (t_end, t_start),
        };
        if let Some(period) = curve.period() {
            while hi <= lo + self.resabs() {
                hi += period;
            }
        }
        Some(Interval::new(lo, hi))
    }

    /// Sample points of an edge from its start vertex to its end vertex.
    ///
    /// Straight edges yield their two ends; curved edges yield
    /// `curve_samples + 1` points. An edge without a curve is the segment
    /// between its vertices.
    pub fn edge_polyline(&self, key: EdgeKey) -> Option<Vec<Point3<f64>>> {
        let edge = self.edge(key)?;
        let Some(curve) = self.edge_curve(key) else {
            let a = self.vertex_position(edge.start?)?;
            let b = self.vertex_position(edge.end?)?;
            return Some(vec![a, b]);
        };
        let range = self.edge_param_range(key)?;
        let segments = if curve.is_closed() {
            self.options.curve_samples.max(2)
        } else {
            1
        };
        let mut points: Vec<Point3<f64>> = (0..=segments)
            .map(|i| curve.point(range.interpolate(i as f64 / segments as f64)))
            .collect();
        if edge.sense.is_reversed() {
            points.reverse();
        }
        Some(points)
    }

    /// Sample points of a coedge in its own direction.
    pub fn coedge_polyline(&self, key: CoedgeKey) -> Option<Vec<Point3<f64>>> {
        let c = self.coedge(key)?;
        let mut points = self.edge_polyline(c.edge)?;
        if c.sense.is_reversed() {
            points.reverse();
        }
        Some(points)
    }

    /// Point and unit tangent (in the edge's direction) at the middle of an
    /// edge.
    pub fn edge_midpoint(&self, key: EdgeKey) -> Option<(Point3<f64>, Vector3<f64>)> {
        let edge = self.edge(key)?;
        let curve = self.edge_curve(key)?;
        let t = self.edge_param_range(key)?.mid();
        let tangent = curve.tangent(t).try_normalize(f64::EPSILON)? * edge.sense.sign();
        Some((curve.point(t), tangent))
    }

    pub fn edge_length(&self, key: EdgeKey) -> Option<f64> {
        let points = self.edge_polyline(key)?;
        Some(points.windows(2).map(|w| (w[1] - w[0]).norm()).sum())
    }
}

// =============================================================================
// Bounding boxes
// =============================================================================

impl BrepArena {
    pub fn vertex_box(&self, key: VertexKey) -> Option<Aabb> {
        let p = self.vertex_position(key)?;
        let tol = self.vertex(key)?.modeling.stored_tolerance().unwrap_or(0.0);
        Some(Aabb::from_point(p).enlarged(tol.max(0.0)))
    }

    /// Box of an edge's samples and vertices, grown by its tolerance.
    pub fn edge_box(&self, key: EdgeKey) -> Option<Aabb> {
        let edge = self.edge(key)?;
        let mut points = self.edge_polyline(key).unwrap_or_default();
        points.extend(
            [edge.start, edge.end]
                .into_iter()
                .flatten()
                .filter_map(|v| self.vertex_position(v)),
        );
        let tol = edge.modeling.stored_tolerance().unwrap_or(0.0).max(0.0);
        Aabb::from_points(points).map(|b| b.enlarged(tol))
    }

    pub fn loop_box(&self, key: LoopKey) -> Option<Aabb> {
        self.loop_coedges(key)
            .filter_map(|c| self.coedge(c).and_then(|d| self.edge_box(d.edge)))
            .reduce(|a, b| a.union(&b))
    }

    pub fn face_box(&self, key: FaceKey) -> Option<Aabb> {
        self.face_loops(key)
            .into_iter()
            .filter_map(|l| self.loop_box(l))
            .reduce(|a, b| a.union(&b))
    }

    pub fn body_box(&self, key: BodyKey) -> Option<Aabb> {
        self.body_edges(key)
            .into_iter()
            .filter_map(|e| self.edge_box(e))
            .reduce(|a, b| a.union(&b))
    }

    fn cached_box(&mut self, key: EntityKey, compute: impl FnOnce(&Self) -> Option<Aabb>) -> Option<Aabb> {
        if let Some(b) = self.boxes.get(&key) {
            return Some(*b);
        }
        let b = compute(self)?;
        self.boxes.insert(key, b);
        Some(b)
    }

    /// Cached form of [`BrepArena::edge_box`].
    pub fn edge_box_mut(&mut self, key: EdgeKey) -> Option<Aabb> {
        self.cached_box(key.into(), |a| a.edge_box(key))
    }

    /// Cached form of [`BrepArena::loop_box`].
    pub fn loop_box_mut(&mut self, key: LoopKey) -> Option<Aabb> {
        self.cached_box(key.into(), |a| a.loop_box(key))
    }

    /// Cached form of [`BrepArena::face_box`].
    pub fn face_box_mut(&mut self, key: FaceKey) -> Option<Aabb> {
        self.cached_box(key.into(), |a| a.face_box(key))
    }

    /// Cached form of [`BrepArena::body_box`].
    pub fn body_box_mut(&mut self, key: BodyKey) -> Option<Aabb> {
        self.cached_box(key.into(), |a| a.body_box(key))
    }
}

// =============================================================================
// Faces and loops
// =============================================================================

impl BrepArena {
    /// Outward unit normal of a face at (the foot point of) `p`, taking the
    /// face sense into account.
    pub fn face_normal_at(&self, key: FaceKey, p: &Point3<f64>) -> Option<Vector3<f64>> {
        let face = self.face(key)?;
        let surface = self.face_surface(key)?;
        Some(surface.normal_at(p) * face.sense.sign())
    }

    /// Closed polyline of a loop, without repeating shared coedge ends.
    pub fn loop_polyline(&self, key: LoopKey) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for c in self.loop_coedges(key) {
            if let Some(mut poly) = self.coedge_polyline(c) {
                poly.pop();
                points.extend(poly);
            }
        }
        points
    }

    /// Signed winding of a loop about its face normal: positive when the
    /// loop runs counterclockwise about the normal (clockwise when seen
    /// looking along it).
    pub fn loop_winding(&self, key: LoopKey) -> Option<f64> {
        let face = self.loop_data(key)?.face?;
        let points = self.loop_polyline(key);
        if points.len() < 3 {
            return None;
        }
        let centroid = Point3::from(
            points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / points.len() as f64,
        );
        let normal = self.face_normal_at(face, &centroid)?;
        Some(0.5 * newell(&points).dot(&normal))
    }

    /// Classifies a loop from its winding. Loops enclosing no area about the
    /// face normal are separations.
    pub fn classify_loop(&self, key: LoopKey) -> LoopType {
        let Some(winding) = self.loop_winding(key) else {
            return match self.loop_data(key) {
                Some(l) if l.start.is_some() => LoopType::Separation,
                _ => LoopType::Unknown,
            };
        };
        let scale = self.loop_box(key).map(|b| b.diagonal()).unwrap_or(1.0);
        if winding.abs() <= self.resabs() * scale {
            LoopType::Separation
        } else if winding > 0.0 {
            LoopType::Periphery
        } else {
            LoopType::Hole
        }
    }

    /// Stored loop type, or a freshly computed one if not yet known.
    pub fn loop_type(&self, key: LoopKey) -> LoopType {
        match self.loop_data(key).map(|l| l.kind) {
            Some(LoopType::Unknown) => self.classify_loop(key),
            Some(kind) => kind,
            None => LoopType::Unknown,
        }
    }

    /// Convexity of the dihedral angle at a manifold edge.
    ///
    /// Edges with other than two face uses are `Unknown`.
    pub fn edge_convexity(&self, key: EdgeKey) -> Convexity {
        self.compute_convexity(key).unwrap_or(Convexity::Unknown)
    }

    fn compute_convexity(&self, key: EdgeKey) -> Option<Convexity> {
        let coedges = self.edge_coedges(key);
        let [c1, c2] = coedges.as_slice() else {
            return None;
        };
        let (p, edge_tangent) = self.edge_midpoint(key)?;
        let n1 = self.face_normal_at(self.coedge_face(*c1)?, &p)?;
        let n2 = self.face_normal_at(self.coedge_face(*c2)?, &p)?;
        let t1 = edge_tangent * self.coedge(*c1)?.sense.sign();
        let cross = n1.cross(&n2);
        if cross.norm() <= self.options.resnor.sqrt() {
            return Some(Convexity::Tangent);
        }
        Some(if cross.dot(&t1) > 0.0 {
            Convexity::Convex
        } else {
            Convexity::Concave
        })
    }
}

impl Transaction<'_> {
    /// Loop type, computed and stored if not yet known.
    pub fn loop_type_mut(&mut self, key: LoopKey) -> Result<LoopType> {
        let stored = self.loop_data(key).ok_or(Error::NotFound(key.into()))?.kind;
        if stored != LoopType::Unknown {
            return Ok(stored);
        }
        let kind = self.classify_loop(key);
        if kind != LoopType::Unknown {
            self.loop_mut(key)?.kind = kind;
        }
        Ok(kind)
    }

    /// Edge convexity, computed and stored if not yet known.
    pub fn edge_convexity_mut(&mut self, key: EdgeKey) -> Result<Convexity> {
        let stored = self.edge(key).ok_or(Error::NotFound(key.into()))?.convexity;
        if stored != Convexity::Unknown {
            return Ok(stored);
        }
        let convexity = self.edge_convexity(key);
        if convexity != Convexity::Unknown {
            self.edge_mut(key)?.convexity = convexity;
        }
        Ok(convexity)
    }
}
