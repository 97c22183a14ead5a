// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial index for tolerance-based vertex lookup.
//!
//! Uses a grid-based spatial hash for O(1) average-case nearest-vertex queries.
//! Sewing uses it to identify vertices within tolerance; the checker uses it
//! to find distinct vertices that sit on top of each other.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use crate::arena::BrepArena;
use crate::error::Result;
use crate::keys::VertexKey;
use crate::transaction::Transaction;

/// A spatial hash grid for fast tolerance-based vertex lookup.
///
/// The grid divides 3D space into cubic cells of side `cell_size`. Lookups
/// check the 27 neighboring cells (3x3x3 neighborhood), so the tolerance of a
/// query should not exceed the cell size.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    grid: FxHashMap<(i64, i64, i64), Vec<(VertexKey, Point3<f64>)>>,
}

impl SpatialIndex {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1e-10),
            grid: FxHashMap::default(),
        }
    }

    /// Builds an index over all live vertices of an arena.
    pub fn from_arena(arena: &BrepArena, cell_size: f64) -> Self {
        let mut index = Self::new(cell_size);
        for key in arena.vertices.keys() {
            if let Some(p) = arena.vertex_position(key) {
                index.insert(key, p);
            }
        }
        index
    }

    pub fn insert(&mut self, key: VertexKey, p: Point3<f64>) {
        let cell = self.cell_coords(&p);
        self.grid.entry(cell).or_default().push((key, p));
    }

    fn neighbours(&self, p: &Point3<f64>) -> impl Iterator<Item = &(VertexKey, Point3<f64>)> {
        let (cx, cy, cz) = self.cell_coords(p);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (dx, dy, dz))))
            .filter_map(move |(dx, dy, dz)| self.grid.get(&(cx + dx, cy + dy, cz + dz)))
            .flatten()
    }

    /// Nearest indexed vertex within `tolerance` of `p`.
    pub fn find_near(&self, p: &Point3<f64>, tolerance: f64) -> Option<VertexKey> {
        let tol_sq = tolerance * tolerance;
        self.neighbours(p)
            .map(|(k, q)| (*k, (q - p).norm_squared()))
            .filter(|(_, d)| *d <= tol_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| k)
    }

    /// All indexed vertices within `tolerance` of `p`.
    pub fn find_all_near(&self, p: &Point3<f64>, tolerance: f64) -> Vec<VertexKey> {
        let tol_sq = tolerance * tolerance;
        self.neighbours(p)
            .filter(|(_, q)| (q - p).norm_squared() <= tol_sq)
            .map(|(k, _)| *k)
            .collect()
    }

    fn cell_coords(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }
}

impl Transaction<'_> {
    /// Returns an indexed vertex within `tolerance` of `p`, or makes a new
    /// one and indexes it.
    pub fn find_or_make_vertex(
        &mut self,
        index: &mut SpatialIndex,
        p: Point3<f64>,
        tolerance: f64,
    ) -> Result<VertexKey> {
        if let Some(existing) = index.find_near(&p, tolerance) {
            if self.vertex(existing).is_some() {
                return Ok(existing);
            }
        }
        let key = self.make_vertex(p)?;
        index.insert(key, p);
        Ok(key)
    }
}
