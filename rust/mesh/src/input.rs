// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What to mesh: a read-only selection of faces and free edges, plus
//! explicit discretizations that replace the sampled ones.

use nalgebra::{Point2, Point3};
use rustc_hash::FxHashMap;
use tolbrep_topology::{BodyKey, BrepArena, CoedgeKey, EdgeKey, FaceKey};

/// One point of an explicit discretization.
///
/// `uv` is a parameter on the surface of the coedge's face and `xyz` a
/// position in space. A sample is valid when at least one is set; when both
/// are, `xyz` wins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub uv: Option<Point2<f64>>,
    pub xyz: Option<Point3<f64>>,
}

impl Sample {
    pub fn at(xyz: Point3<f64>) -> Self {
        Self {
            uv: None,
            xyz: Some(xyz),
        }
    }

    pub fn at_uv(uv: Point2<f64>) -> Self {
        Self {
            uv: Some(uv),
            xyz: None,
        }
    }

    #[inline]
    pub fn uv_valid(&self) -> bool {
        self.uv.is_some()
    }

    #[inline]
    pub fn xyz_valid(&self) -> bool {
        self.xyz.is_some()
    }
}

/// Explicit discretizations of edges and coedges.
///
/// Edge samples run in the edge's direction and are shared by every face
/// using the edge. Coedge samples run in the coedge's direction and only
/// apply to that coedge's face; they take precedence over edge samples.
#[derive(Debug, Clone, Default)]
pub struct DiscretizationOverride {
    pub edges: FxHashMap<EdgeKey, Vec<Sample>>,
    pub coedges: FxHashMap<CoedgeKey, Vec<Sample>>,
}

impl DiscretizationOverride {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.coedges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edges.len() + self.coedges.len()
    }
}

/// A selection of entities to mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshInput {
    /// Faces to triangulate.
    pub faces: Vec<FaceKey>,
    /// Edges to discretize into segments on their own.
    pub edges: Vec<EdgeKey>,
    pub overrides: DiscretizationOverride,
}

impl MeshInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every face of a body and every edge of its wires.
    pub fn from_body(arena: &BrepArena, body: BodyKey) -> Self {
        let mut edges: Vec<EdgeKey> = arena
            .body_wires(body)
            .into_iter()
            .flat_map(|w| arena.wire_coedges(w).collect::<Vec<_>>())
            .filter_map(|c| arena.coedge(c).map(|d| d.edge))
            .collect();
        edges.dedup();
        Self {
            faces: arena.body_faces(body),
            edges,
            overrides: DiscretizationOverride::default(),
        }
    }

    pub fn with_faces(mut self, faces: impl IntoIterator<Item = FaceKey>) -> Self {
        self.faces.extend(faces);
        self
    }

    pub fn with_edges(mut self, edges: impl IntoIterator<Item = EdgeKey>) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Replaces the discretization of an edge.
    pub fn override_edge(mut self, edge: EdgeKey, samples: Vec<Sample>) -> Self {
        self.overrides.edges.insert(edge, samples);
        self
    }

    /// Replaces the discretization of one coedge.
    pub fn override_coedge(mut self, coedge: CoedgeKey, samples: Vec<Sample>) -> Self {
        self.overrides.coedges.insert(coedge, samples);
        self
    }

    /// Number of faces and edges, the work units of a computation.
    pub fn len(&self) -> usize {
        self.faces.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_selects_faces_and_wire_edges() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("models");
        let block = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        let wire = tx
            .make_wire_body(
                &[
                    Point3::new(0.0, 0.0, 2.0),
                    Point3::new(1.0, 0.0, 2.0),
                    Point3::new(1.0, 1.0, 2.0),
                ],
                false,
            )
            .unwrap();
        tx.commit();

        let input = MeshInput::from_body(&arena, block);
        assert_eq!(input.faces.len(), 6);
        assert!(input.edges.is_empty());

        let input = MeshInput::from_body(&arena, wire);
        assert!(input.faces.is_empty());
        assert_eq!(input.edges.len(), 2);
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn test_sample_validity() {
        let sample = Sample::at_uv(Point2::new(0.5, 0.0));
        assert!(sample.uv_valid());
        assert!(!sample.xyz_valid());
        assert!(!Sample::default().uv_valid() && !Sample::default().xyz_valid());

        let input = MeshInput::new().override_edge(EdgeKey::default(), vec![sample]);
        assert_eq!(input.overrides.len(), 1);
    }
}
