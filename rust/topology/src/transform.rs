// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Similarity transformations on topology entities.
//!
//! A transform moves the geometry under an entity: the points of its
//! vertices, the curves of its edges, the surfaces of its faces and the
//! pcurves of its coedges. Shared geometry is moved once even when several
//! entities in the scope use it. Geometry shared with entities outside the
//! scope moves with it.

use nalgebra::{Point3, Similarity3, Translation3, Unit, UnitQuaternion, Vector3};
use rustc_hash::FxHashSet;

use crate::arena::BrepArena;
use crate::entity::Modeling;
use crate::error::{Error, Result};
use crate::geometry::Curve;
use crate::keys::*;
use crate::transaction::Transaction;

/// Everything a transform touches.
#[derive(Debug, Default)]
struct Scope {
    topology: FxHashSet<EntityKey>,
    faces: Vec<FaceKey>,
    coedges: Vec<CoedgeKey>,
    edges: Vec<EdgeKey>,
    vertices: Vec<VertexKey>,
}

impl BrepArena {
    fn transform_scope(&self, key: EntityKey) -> Result<Scope> {
        if !self.contains(key) {
            return Err(Error::NotFound(key));
        }
        let mut faces = Vec::new();
        let mut coedges = Vec::new();
        let mut edges = Vec::new();
        let mut vertices = Vec::new();
        let mut topology = FxHashSet::default();
        topology.insert(key);

        match key {
            EntityKey::Body(b) => {
                for l in self.body_lumps(b) {
                    topology.insert(l.into());
                    for s in self.lump_shells(l) {
                        topology.insert(s.into());
                        faces.extend(self.shell_faces(s));
                    }
                }
                for w in self.body_wires(b) {
                    topology.insert(w.into());
                    coedges.extend(self.wire_coedges(w));
                }
            }
            EntityKey::Lump(l) => {
                for s in self.lump_shells(l) {
                    topology.insert(s.into());
                    faces.extend(self.shell_faces(s));
                }
            }
            EntityKey::Shell(s) => faces.extend(self.shell_faces(s)),
            EntityKey::Face(f) => faces.push(f),
            EntityKey::Wire(w) => coedges.extend(self.wire_coedges(w)),
            EntityKey::Edge(e) => edges.push(e),
            EntityKey::Vertex(v) => vertices.push(v),
            _ => return Err(Error::WrongType(key)),
        }

        for &f in &faces {
            topology.insert(f.into());
            for l in self.face_loops(f) {
                topology.insert(l.into());
                coedges.extend(self.loop_coedges(l));
            }
        }
        for &c in &coedges {
            if let Some(d) = self.coedge(c) {
                edges.push(d.edge);
            }
        }
        for &e in &edges {
            if let Some(d) = self.edge(e) {
                vertices.extend([d.start, d.end].into_iter().flatten());
            }
        }
        edges.sort_unstable();
        edges.dedup();
        vertices.sort_unstable();
        vertices.dedup();
        topology.extend(coedges.iter().map(|&c| EntityKey::from(c)));
        topology.extend(edges.iter().map(|&e| EntityKey::from(e)));
        topology.extend(vertices.iter().map(|&v| EntityKey::from(v)));
        Ok(Scope {
            topology,
            faces,
            coedges,
            edges,
            vertices,
        })
    }
}

fn scaled(modeling: Modeling, s: f64) -> Modeling {
    match modeling {
        Modeling::Tolerant { tolerance } if tolerance >= 0.0 => Modeling::Tolerant {
            tolerance: tolerance * s,
        },
        other => other,
    }
}

impl Transaction<'_> {
    /// Applies a similarity transform to an entity and everything under it.
    pub fn transform(&mut self, key: impl Into<EntityKey>, transform: &Similarity3<f64>) -> Result<()> {
        let key = key.into();
        let scope = self.transform_scope(key)?;
        let s = transform.scaling();

        let mut points = FxHashSet::default();
        for &v in &scope.vertices {
            let data = self.vertex_mut(v)?;
            data.modeling = scaled(data.modeling, s);
            points.insert(data.point);
        }
        for p in points {
            let point = self.point_mut(p)?;
            point.geometry = transform.transform_point(&point.geometry);
        }

        let mut curves = FxHashSet::default();
        for &e in &scope.edges {
            let straight = matches!(self.edge_curve(e), Some(Curve::Straight { .. }));
            let data = self.edge_mut(e)?;
            data.modeling = scaled(data.modeling, s);
            if straight {
                data.param_range = data.param_range.map(|r| r.scaled(s));
            }
            if let Some(c) = data.curve {
                curves.insert(c);
            }
        }
        for c in curves {
            self.curve_mut(c)?.geometry.transform(transform);
        }

        // Pcurve parameters follow the surface parameterization, so map them
        // before the surfaces move.
        let mut pcurves = FxHashSet::default();
        for &c in &scope.coedges {
            let surface = self.coedge_face(c).and_then(|f| self.face_surface(f)).cloned();
            let data = self.coedge_mut(c)?;
            data.modeling = scaled(data.modeling, s);
            if let (Some(p), Some(surface)) = (data.pcurve, surface) {
                if pcurves.insert(p) {
                    let pcurve = self.pcurve_mut(p)?;
                    pcurve.geometry = pcurve.geometry.map(|uv| surface.scale_params(uv, s));
                }
            }
        }

        let surfaces: FxHashSet<SurfaceKey> = scope
            .faces
            .iter()
            .filter_map(|&f| self.face(f).and_then(|d| d.surface))
            .collect();
        for sk in surfaces {
            self.surface_mut(sk)?.geometry.transform(transform);
        }

        self.transform_attributes(&scope.topology, transform)?;
        tracing::debug!(
            ?key,
            scale = s,
            vertices = scope.vertices.len(),
            edges = scope.edges.len(),
            faces = scope.faces.len(),
            "transform"
        );
        Ok(())
    }

    pub fn transform_body(&mut self, body: BodyKey, transform: &Similarity3<f64>) -> Result<()> {
        self.transform(body, transform)
    }

    pub fn translate(&mut self, key: impl Into<EntityKey>, offset: Vector3<f64>) -> Result<()> {
        let t = Similarity3::from_parts(Translation3::from(offset), UnitQuaternion::identity(), 1.0);
        self.transform(key, &t)
    }

    /// Rotates about the axis through `origin`; `angle` is in radians.
    pub fn rotate(
        &mut self,
        key: impl Into<EntityKey>,
        origin: Point3<f64>,
        axis: Vector3<f64>,
        angle: f64,
    ) -> Result<()> {
        let axis = Unit::try_new(axis, f64::EPSILON)
            .ok_or(Error::DegenerateGeometry("zero rotation axis"))?;
        let rotation = UnitQuaternion::from_axis_angle(&axis, angle);
        let t = Similarity3::from_parts(
            Translation3::from(origin.coords - rotation * origin.coords),
            rotation,
            1.0,
        );
        self.transform(key, &t)
    }

    /// Scales uniformly about `origin`.
    pub fn scale(&mut self, key: impl Into<EntityKey>, origin: Point3<f64>, factor: f64) -> Result<()> {
        if factor <= 0.0 {
            return Err(Error::DegenerateGeometry("scale factor must be positive"));
        }
        let t = Similarity3::from_parts(
            Translation3::from(origin.coords * (1.0 - factor)),
            UnitQuaternion::identity(),
            factor,
        );
        self.transform(key, &t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeKind, BlendAttrib};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn block(arena: &mut BrepArena) -> BodyKey {
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        tx.commit();
        body
    }

    #[test]
    fn translate_moves_shared_points_once() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let mut tx = arena.begin("move");
        tx.translate(body, Vector3::new(10.0, 0.0, 0.0)).unwrap();
        tx.commit();

        let b = arena.body_box(body).unwrap();
        assert_relative_eq!(b.min, Point3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(b.max, Point3::new(11.0, 1.0, 1.0));
        for f in arena.body_faces(body) {
            assert_eq!(arena.classify_loop(arena.face_loops(f)[0]), crate::entity::LoopType::Periphery);
        }
    }

    #[test]
    fn rotate_about_offset_origin() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("vertex");
        let v = tx.make_vertex(Point3::new(2.0, 0.0, 0.0)).unwrap();
        tx.rotate(v, Point3::new(1.0, 0.0, 0.0), Vector3::z(), FRAC_PI_2)
            .unwrap();
        tx.commit();
        assert_relative_eq!(
            arena.vertex_position(v).unwrap(),
            Point3::new(1.0, 1.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn scale_keeps_pcurves_on_surfaces_and_scales_attributes() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let edge = arena.body_edges(body)[0];
        let mut tx = arena.begin("tag");
        tx.add_attribute(edge, AttributeKind::Blend(BlendAttrib { radius: 0.1 }))
            .unwrap();
        tx.make_tolerant_edge(edge, 0.001, true).unwrap();
        tx.scale(body, Point3::origin(), 2.0).unwrap();
        tx.commit();

        assert_relative_eq!(arena.edge_length(edge).unwrap(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(arena.tolerance(edge.into()).unwrap(), 0.002);
        let attrib = arena.attributes_of(edge)[0];
        assert_eq!(
            arena.attrib(attrib).unwrap().kind,
            AttributeKind::Blend(BlendAttrib { radius: 0.2 })
        );
        for c in arena.edge_coedges(edge) {
            assert!(arena.coedge_deviation(c) < 1e-9);
        }
    }

    #[test]
    fn transform_rolls_back() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let before = arena.body_box(body).unwrap();
        {
            let mut tx = arena.begin("discard");
            tx.scale(body, Point3::origin(), 3.0).unwrap();
        }
        assert_eq!(arena.body_box(body), Some(before));
        let mut tx = arena.begin("bad");
        assert!(tx.scale(body, Point3::origin(), 0.0).is_err());
    }
}
