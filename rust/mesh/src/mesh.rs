// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tolbrep_topology::{EdgeKey, FaceKey};

use crate::error::{MeshError, Result};

/// Surface mesh with every element tied to the entity it came from.
///
/// Nodes on a shared edge or vertex appear once, so the triangles of
/// neighbouring faces share them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Node positions.
    pub nodes: Vec<[f64; 3]>,
    /// Triangle node indices, counterclockwise about the outward normal.
    pub triangles: Vec<[u32; 3]>,
    /// Originating face of each triangle.
    pub triangle_faces: Vec<FaceKey>,
    /// Segment node indices for free edges.
    pub segments: Vec<[u32; 2]>,
    /// Originating edge of each segment.
    pub segment_edges: Vec<EdgeKey>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.segments.is_empty()
    }

    /// Appends a node and returns its index.
    pub fn add_node(&mut self, p: Point3<f64>) -> u32 {
        self.nodes.push([p.x, p.y, p.z]);
        (self.nodes.len() - 1) as u32
    }

    pub fn add_triangle(&mut self, nodes: [u32; 3], face: FaceKey) {
        self.triangles.push(nodes);
        self.triangle_faces.push(face);
    }

    pub fn add_segment(&mut self, nodes: [u32; 2], edge: EdgeKey) {
        self.segments.push(nodes);
        self.segment_edges.push(edge);
    }

    #[inline]
    pub fn node(&self, index: u32) -> Option<Point3<f64>> {
        self.nodes.get(index as usize).map(|&[x, y, z]| Point3::new(x, y, z))
    }

    /// Face a triangle was generated from.
    #[inline]
    pub fn triangle_face(&self, index: usize) -> Option<FaceKey> {
        self.triangle_faces.get(index).copied()
    }

    /// Indices of the triangles generated from `face`.
    pub fn triangles_of(&self, face: FaceKey) -> impl Iterator<Item = usize> + '_ {
        self.triangle_faces
            .iter()
            .enumerate()
            .filter(move |(_, &f)| f == face)
            .map(|(i, _)| i)
    }

    /// Area-weighted normal of a triangle (twice its area in length).
    pub fn triangle_normal(&self, index: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = *self.triangles.get(index)?;
        let (a, b, c) = (self.node(a)?, self.node(b)?, self.node(c)?);
        Some((b - a).cross(&(c - a)))
    }

    pub fn triangle_area(&self, index: usize) -> f64 {
        self.triangle_normal(index).map_or(0.0, |n| 0.5 * n.norm())
    }

    pub fn area(&self) -> f64 {
        (0..self.triangles.len()).map(|i| self.triangle_area(i)).sum()
    }

    pub fn face_area(&self, face: FaceKey) -> f64 {
        self.triangles_of(face).map(|i| self.triangle_area(i)).sum()
    }

    /// Checks that every element references an existing node and has an
    /// origin.
    pub fn validate(&self) -> Result<()> {
        let count = self.nodes.len();
        let indices = self
            .triangles
            .iter()
            .flatten()
            .chain(self.segments.iter().flatten());
        for &node in indices {
            if node as usize >= count {
                return Err(MeshError::BadNodeIndex { node, count });
            }
        }
        if self.triangle_faces.len() != self.triangles.len()
            || self.segment_edges.len() != self.segments.len()
        {
            return Err(MeshError::Triangulation(
                "element origins do not match elements".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mesh: Mesh = serde_json::from_str(text)?;
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
