// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level builders for planar polygonal topology with edge sharing.
//!
//! Faces that run between the same pair of vertices share one edge, with one
//! coedge per face in the partner ring. Each face lies on a plane fitted by
//! Newell's method, so its loop runs counterclockwise about the face normal.

use nalgebra::{Point2, Point3};
use rustc_hash::FxHashMap;

use crate::entity::Sense;
use crate::error::{Error, Result};
use crate::geometry::Surface;
use crate::keys::*;
use crate::query::newell;
use crate::spatial::SpatialIndex;
use crate::transaction::Transaction;

/// Shared edges by unordered vertex pair.
type EdgeMap = FxHashMap<(VertexKey, VertexKey), EdgeKey>;

fn canonical(a: VertexKey, b: VertexKey) -> (VertexKey, VertexKey) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Corner indices of the six block faces, each counterclockwise seen from
/// outside. Corners 0..4 run around the bottom, 4..8 around the top.
const BLOCK_FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [0, 4, 7, 3],
    [1, 2, 6, 5],
];

impl Transaction<'_> {
    /// Builds a planar face bounded by one loop through `vertices`, reusing
    /// edges recorded in `edges`.
    fn face_through(&mut self, vertices: &[VertexKey], edges: &mut EdgeMap) -> Result<FaceKey> {
        let mut ring: Vec<VertexKey> = Vec::with_capacity(vertices.len());
        for &v in vertices {
            if ring.last() != Some(&v) {
                ring.push(v);
            }
        }
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(Error::DegenerateGeometry("polygon needs three distinct vertices"));
        }

        let positions = ring
            .iter()
            .map(|&v| self.vertex_position(v).ok_or(Error::NotFound(v.into())))
            .collect::<Result<Vec<_>>>()?;
        let normal = newell(&positions);
        let plane = Surface::plane_with_u(positions[0], normal, positions[1] - positions[0])
            .ok_or(Error::DegenerateGeometry("polygon has no area"))?;

        let mut coedges = Vec::with_capacity(ring.len());
        for i in 0..ring.len() {
            let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
            let edge = match edges.get(&canonical(a, b)) {
                Some(&e) => e,
                None => {
                    let e = self.make_straight_edge(a, b)?;
                    edges.insert(canonical(a, b), e);
                    e
                }
            };
            let sense = if self.edge(edge).and_then(|d| d.start) == Some(a) {
                Sense::Forward
            } else {
                Sense::Reversed
            };
            let uv: Vec<Point2<f64>> = [positions[i], positions[(i + 1) % ring.len()]]
                .iter()
                .map(|p| plane.param(p))
                .collect();
            let pcurve = self.make_pcurve(uv)?;
            coedges.push(self.make_coedge(edge, sense, Some(pcurve))?);
        }

        let lp = self.make_loop(&coedges)?;
        let surface = self.make_surface(plane);
        self.make_face(&[lp], Some(surface), Sense::Forward)
    }

    /// Creates a free planar face with new vertices at `points`.
    pub fn make_polygon_face(&mut self, points: &[Point3<f64>]) -> Result<FaceKey> {
        if points.len() < 3 {
            return Err(Error::DegenerateGeometry("polygon needs three points"));
        }
        let vertices = points
            .iter()
            .map(|p| self.make_vertex(*p))
            .collect::<Result<Vec<_>>>()?;
        self.face_through(&vertices, &mut EdgeMap::default())
    }

    /// Creates a single-lump, single-shell body from indexed polygons.
    ///
    /// Each face lists point indices counterclockwise seen from outside;
    /// faces that run between the same two points share the edge.
    pub fn make_polyhedron(&mut self, points: &[Point3<f64>], faces: &[Vec<usize>]) -> Result<BodyKey> {
        if faces.is_empty() {
            return Err(Error::EmptyShell);
        }
        let vertices = points
            .iter()
            .map(|p| self.make_vertex(*p))
            .collect::<Result<Vec<_>>>()?;
        let mut edges = EdgeMap::default();
        let mut face_keys = Vec::with_capacity(faces.len());
        for face in faces {
            let ring = face
                .iter()
                .map(|&i| {
                    vertices
                        .get(i)
                        .copied()
                        .ok_or(Error::DegenerateGeometry("face index out of range"))
                })
                .collect::<Result<Vec<_>>>()?;
            face_keys.push(self.face_through(&ring, &mut edges)?);
        }
        let shell = self.make_shell(&face_keys)?;
        let lump = self.make_lump(&[shell])?;
        let body = self.make_body(&[lump], &[])?;
        tracing::debug!(
            faces = face_keys.len(),
            edges = edges.len(),
            vertices = vertices.len(),
            "polyhedron"
        );
        Ok(body)
    }

    /// Creates an axis-aligned block body between two corners.
    pub fn make_block(&mut self, min: Point3<f64>, max: Point3<f64>) -> Result<BodyKey> {
        let (lo, hi) = (min.inf(&max), min.sup(&max));
        let corners: Vec<Point3<f64>> = [lo.z, hi.z]
            .iter()
            .flat_map(|&z| {
                [
                    Point3::new(lo.x, lo.y, z),
                    Point3::new(hi.x, lo.y, z),
                    Point3::new(hi.x, hi.y, z),
                    Point3::new(lo.x, hi.y, z),
                ]
            })
            .collect();
        let faces: Vec<Vec<usize>> = BLOCK_FACES.iter().map(|f| f.to_vec()).collect();
        self.make_polyhedron(&corners, &faces)
    }

    /// Creates a shell from face coordinate lists, identifying vertices that
    /// lie within `tolerance` of each other (face sewing).
    pub fn sew_faces(&mut self, face_coords: &[Vec<Point3<f64>>], tolerance: f64) -> Result<ShellKey> {
        if face_coords.is_empty() {
            return Err(Error::EmptyShell);
        }
        let mut index = SpatialIndex::new(tolerance);
        let mut edges = EdgeMap::default();
        let mut faces = Vec::with_capacity(face_coords.len());
        for coords in face_coords {
            let ring = coords
                .iter()
                .map(|p| self.find_or_make_vertex(&mut index, *p, tolerance))
                .collect::<Result<Vec<_>>>()?;
            faces.push(self.face_through(&ring, &mut edges)?);
        }
        self.make_shell(&faces)
    }

    /// Creates a wire body along straight segments through `points`.
    pub fn make_wire_body(&mut self, points: &[Point3<f64>], closed: bool) -> Result<BodyKey> {
        if points.len() < 2 {
            return Err(Error::EmptyLoop);
        }
        let vertices = points
            .iter()
            .map(|p| self.make_vertex(*p))
            .collect::<Result<Vec<_>>>()?;
        let segments = if closed { vertices.len() } else { vertices.len() - 1 };
        let mut coedges = Vec::with_capacity(segments);
        for i in 0..segments {
            let edge = self.make_straight_edge(vertices[i], vertices[(i + 1) % vertices.len()])?;
            coedges.push(self.make_coedge(edge, Sense::Forward, None)?);
        }
        let wire = self.make_wire(&coedges)?;
        self.make_body(&[], &[wire])
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::BrepArena;
    use crate::entity::LoopType;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn triangle() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn polygon_face_has_pcurves_on_its_plane() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("triangle");
        let face = tx.make_polygon_face(&triangle()).unwrap();
        tx.commit();

        let surface = arena.face_surface(face).unwrap();
        assert!(surface.is_planar());
        assert_relative_eq!(
            arena.face_normal_at(face, &Point3::origin()).unwrap(),
            nalgebra::Vector3::z()
        );
        for c in arena.face_coedges(face) {
            let pcurve = arena.coedge_pcurve(c).unwrap();
            let start = arena.vertex_position(arena.coedge_start_vertex(c).unwrap()).unwrap();
            assert_relative_eq!(surface.point(&pcurve.points[0]), start, epsilon = 1e-12);
        }
        assert_eq!(arena.classify_loop(arena.face_loops(face)[0]), LoopType::Periphery);
    }

    #[test]
    fn degenerate_polygons_are_rejected() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("bad");
        assert!(tx.make_polygon_face(&triangle()[..2]).is_err());
        let collinear = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(tx.make_polygon_face(&collinear).is_err());
    }

    #[test]
    fn block_shares_edges_between_faces() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(2.0, 3.0, 4.0))
            .unwrap();
        tx.commit();

        assert_eq!(arena.vertex_count(), 8);
        assert_eq!(arena.edge_count(), 12);
        assert_eq!(arena.face_count(), 6);
        assert_eq!(arena.coedge_count(), 24);
        assert_eq!(arena.body_faces(body).len(), 6);
        for e in arena.body_edges(body) {
            let cs = arena.edge_coedges(e);
            assert_eq!(cs.len(), 2);
            let senses: Vec<_> = cs.iter().map(|c| arena.coedge(*c).unwrap().sense).collect();
            assert_ne!(senses[0], senses[1], "manifold uses run opposite ways");
        }
        let b = arena.body_box(body).unwrap();
        assert_relative_eq!(b.max, Point3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn sewing_merges_nearby_vertices() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("sew");
        let faces = vec![
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0001, 0.0, 0.0),
                Point3::new(0.5, -1.0, 0.0),
            ],
        ];
        let shell = tx.sew_faces(&faces, 0.001).unwrap();
        tx.commit();

        assert_eq!(arena.vertex_count(), 4);
        assert_eq!(arena.edge_count(), 5);
        assert_eq!(arena.shell_faces(shell).len(), 2);
    }

    #[test]
    fn wire_body_is_open_or_closed() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("wires");
        let open = tx.make_wire_body(&triangle(), false).unwrap();
        let closed = tx.make_wire_body(&triangle(), true).unwrap();
        tx.commit();

        let open_wire = arena.body_wires(open)[0];
        let closed_wire = arena.body_wires(closed)[0];
        assert_eq!(arena.wire_coedges(open_wire).count(), 2);
        assert_eq!(arena.wire_coedges(closed_wire).count(), 3);
    }
}
