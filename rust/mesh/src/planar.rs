// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in mesher for planar faces.
//!
//! Each face boundary is discretized edge by edge, projected into the plane
//! of the face and triangulated with earcutr. Nodes on edges and vertices
//! are shared between the faces that use them, so a closed shell gives a
//! closed mesh. Only boundary nodes are placed: `max_size` bounds boundary
//! segments, while `gradation` and the thread count are left to engines that
//! refine interiors.

use nalgebra::{Point2, Point3, Vector2, Vector3};
use rustc_hash::FxHashMap;
use tolbrep_topology::{
    BrepArena, CoedgeKey, EdgeKey, EntityKey, FaceKey, LoopType, Surface, VertexKey,
};

use crate::engine::{Control, MeshEngine, Progress, ProgressFn};
use crate::error::{MeshError, Result};
use crate::input::{MeshInput, Sample};
use crate::mesh::Mesh;
use crate::params::SessionParams;

/// Upper bound on the pieces one boundary segment is split into.
const MAX_SPLITS: usize = 4096;

/// Identity of a boundary node, so that neighbouring faces share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeId {
    Vertex(VertexKey),
    Edge(EdgeKey, usize),
    Coedge(CoedgeKey, usize),
}

type Chain = Vec<(NodeId, Point3<f64>)>;

/// The reference engine: triangulates planar faces, discretizes free edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarMesher;

impl MeshEngine for PlanarMesher {
    fn name(&self) -> &str {
        "planar"
    }

    fn compute(
        &self,
        arena: &BrepArena,
        input: &MeshInput,
        params: &SessionParams,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Mesh> {
        let mut builder = Builder::new(arena, input, params);
        builder.validate_overrides()?;

        let total = input.len() as u64;
        let mut done = 0u64;
        for &face in &input.faces {
            let triangles = builder.mesh_face(face)?;
            tracing::trace!(?face, triangles, "face meshed");
            done += 1;
            if progress(&Progress::new(done, total, "faces")) == Control::Stop {
                return Err(MeshError::Interrupted(done));
            }
        }
        for &edge in &input.edges {
            builder.mesh_edge(edge)?;
            done += 1;
            if progress(&Progress::new(done, total, "edges")) == Control::Stop {
                return Err(MeshError::Interrupted(done));
            }
        }

        let mesh = builder.mesh;
        if params.verbose > 0 {
            tracing::info!(
                nodes = mesh.node_count(),
                triangles = mesh.triangle_count(),
                segments = mesh.segment_count(),
                "planar mesh"
            );
        } else {
            tracing::debug!(
                nodes = mesh.node_count(),
                triangles = mesh.triangle_count(),
                segments = mesh.segment_count(),
                "planar mesh"
            );
        }
        Ok(mesh)
    }
}

// =============================================================================
// Boundary discretization
// =============================================================================

/// Drops interior samples closer than `min_size` to the previous one.
fn thin(points: Vec<Point3<f64>>, min_size: f64) -> Vec<Point3<f64>> {
    if points.len() <= 2 || min_size <= 0.0 {
        return points;
    }
    let last = points[points.len() - 1];
    let mut kept = vec![points[0]];
    for p in &points[1..points.len() - 1] {
        let previous = kept[kept.len() - 1];
        if (p - previous).norm() >= min_size && (last - p).norm() >= min_size {
            kept.push(*p);
        }
    }
    kept.push(last);
    kept
}

/// Splits segments longer than `max_size` into equal pieces.
fn subdivide(points: &[Point3<f64>], max_size: f64) -> Vec<Point3<f64>> {
    let mut out = Vec::with_capacity(points.len());
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let pieces = if max_size.is_finite() {
            ((b - a).norm() / max_size).ceil().clamp(1.0, MAX_SPLITS as f64) as usize
        } else {
            1
        };
        for i in 0..pieces {
            out.push(a + (b - a) * (i as f64 / pieces as f64));
        }
    }
    if let Some(&last) = points.last() {
        out.push(last);
    }
    out
}

fn signed_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    0.5 * ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x))
}

/// Even-odd point in polygon test.
fn inside(p: &Point2<f64>, ring: &[Point2<f64>]) -> bool {
    let mut result = false;
    let n = ring.len();
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + n - 1) % n]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            result = !result;
        }
    }
    result
}

/// Orthonormal frame of a plane: origin, in-plane axes and normal.
struct Frame {
    origin: Point3<f64>,
    u: Vector3<f64>,
    v: Vector3<f64>,
}

impl Frame {
    fn of(face: FaceKey, surface: &Surface) -> Result<Self> {
        let Surface::Plane { root, normal, u_dir } = surface else {
            return Err(MeshError::UnsupportedSurface(face));
        };
        let degenerate = || MeshError::Triangulation("degenerate plane".to_string());
        let n = normal.try_normalize(f64::EPSILON).ok_or_else(degenerate)?;
        let u = (u_dir - n * n.dot(u_dir))
            .try_normalize(f64::EPSILON)
            .ok_or_else(degenerate)?;
        Ok(Self {
            origin: *root,
            u,
            v: n.cross(&u),
        })
    }

    #[inline]
    fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }
}

struct Builder<'a> {
    arena: &'a BrepArena,
    input: &'a MeshInput,
    params: &'a SessionParams,
    mesh: Mesh,
    nodes: FxHashMap<NodeId, u32>,
    edge_chains: FxHashMap<EdgeKey, Chain>,
}

impl<'a> Builder<'a> {
    fn new(arena: &'a BrepArena, input: &'a MeshInput, params: &'a SessionParams) -> Self {
        Self {
            arena,
            input,
            params,
            mesh: Mesh::new(),
            nodes: FxHashMap::default(),
            edge_chains: FxHashMap::default(),
        }
    }

    fn validate_overrides(&self) -> Result<()> {
        for &e in self.input.overrides.edges.keys() {
            if self.arena.edge(e).is_none() {
                return Err(MeshError::NotFound(e.into()));
            }
        }
        for &c in self.input.overrides.coedges.keys() {
            if self.arena.coedge(c).is_none() {
                return Err(MeshError::NotFound(c.into()));
            }
        }
        Ok(())
    }

    fn node(&mut self, id: NodeId, p: Point3<f64>) -> u32 {
        if let Some(&index) = self.nodes.get(&id) {
            return index;
        }
        let index = self.mesh.add_node(p);
        self.nodes.insert(id, index);
        index
    }

    /// Positions of an explicit discretization, checked against the ends
    /// it has to meet.
    fn resolve(
        &self,
        key: EntityKey,
        samples: &[Sample],
        surface: Option<&Surface>,
        ends: (Option<VertexKey>, Option<VertexKey>),
    ) -> Result<Vec<Point3<f64>>> {
        if samples.len() < 2 {
            return Err(MeshError::InvalidOverride {
                key,
                reason: "needs at least two samples",
            });
        }
        let points = samples
            .iter()
            .map(|s| match (s.xyz, s.uv, surface) {
                (Some(p), _, _) => Ok(p),
                (None, Some(uv), Some(surface)) => Ok(surface.point(&uv)),
                (None, Some(_), None) => Err(MeshError::InvalidOverride {
                    key,
                    reason: "uv samples need a face surface",
                }),
                (None, None, _) => Err(MeshError::InvalidOverride {
                    key,
                    reason: "sample has neither uv nor xyz",
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        let (first, last) = (points[0], points[points.len() - 1]);
        let meets = match ends {
            (Some(start), Some(end)) => {
                self.arena.coincident(first, start) && self.arena.coincident(last, end)
            }
            _ => self.arena.coincident(first, last),
        };
        if !meets {
            return Err(MeshError::InvalidOverride {
                key,
                reason: "samples do not end at the vertices",
            });
        }
        Ok(points)
    }

    /// Attaches node identities: the ends become vertex nodes, the rest
    /// are numbered along the chain.
    fn label(
        &self,
        points: Vec<Point3<f64>>,
        ends: (Option<VertexKey>, Option<VertexKey>),
        id: impl Fn(usize) -> NodeId,
    ) -> Chain {
        let n = points.len();
        points
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let vertex = match i {
                    0 => ends.0,
                    i if i == n - 1 => ends.1,
                    _ => None,
                };
                match vertex {
                    Some(v) => (NodeId::Vertex(v), self.arena.vertex_position(v).unwrap_or(p)),
                    None if i == n - 1 && ends == (None, None) => (id(0), p),
                    None => (id(i), p),
                }
            })
            .collect()
    }

    /// Boundary nodes of an edge in the edge's direction, ends included.
    fn edge_chain(&mut self, edge: EdgeKey) -> Result<Chain> {
        if let Some(chain) = self.edge_chains.get(&edge) {
            return Ok(chain.clone());
        }
        let data = self
            .arena
            .edge(edge)
            .ok_or(MeshError::NotFound(edge.into()))?;
        let ends = (data.start, data.end);
        let points = match self.input.overrides.edges.get(&edge) {
            Some(samples) => self.resolve(edge.into(), samples, None, ends)?,
            None => {
                let poly = self
                    .arena
                    .edge_polyline(edge)
                    .ok_or(MeshError::NotFound(edge.into()))?;
                thin(poly, self.params.min_size)
            }
        };
        let chain = self.label(subdivide(&points, self.params.max_size), ends, |i| {
            NodeId::Edge(edge, i)
        });
        self.edge_chains.insert(edge, chain.clone());
        Ok(chain)
    }

    /// Boundary nodes of a coedge in the coedge's direction, ends included.
    fn coedge_chain(&mut self, coedge: CoedgeKey) -> Result<Chain> {
        let arena = self.arena;
        let input = self.input;
        let data = arena
            .coedge(coedge)
            .ok_or(MeshError::NotFound(coedge.into()))?;
        let Some(samples) = input.overrides.coedges.get(&coedge) else {
            let mut chain = self.edge_chain(data.edge)?;
            if data.sense.is_reversed() {
                chain.reverse();
            }
            return Ok(chain);
        };
        let surface = arena.coedge_face(coedge).and_then(|f| arena.face_surface(f));
        let ends = (arena.coedge_start_vertex(coedge), arena.coedge_end_vertex(coedge));
        let points = self.resolve(coedge.into(), samples, surface, ends)?;
        Ok(self.label(subdivide(&points, self.params.max_size), ends, |i| {
            NodeId::Coedge(coedge, i)
        }))
    }

    // =========================================================================
    // Faces
    // =========================================================================

    fn mesh_face(&mut self, face: FaceKey) -> Result<usize> {
        let arena = self.arena;
        let data = arena.face(face).ok_or(MeshError::NotFound(face.into()))?;
        let surface = arena
            .face_surface(face)
            .ok_or(MeshError::UnsupportedSurface(face))?;
        let frame = Frame::of(face, surface)?;
        let sign = data.sense.sign();

        let mut peripheries = Vec::new();
        let mut holes = Vec::new();
        for lp in arena.face_loops(face) {
            let kind = arena.loop_type(lp);
            if !arena.loop_is_closed(lp) || !matches!(kind, LoopType::Periphery | LoopType::Hole) {
                tracing::trace!(?lp, ?kind, "loop skipped");
                continue;
            }
            let mut ring = Vec::new();
            for c in arena.loop_coedges(lp) {
                let mut chain = self.coedge_chain(c)?;
                chain.pop();
                ring.extend(chain);
            }
            let ring: Vec<(u32, Point2<f64>)> = ring
                .into_iter()
                .map(|(id, p)| (self.node(id, p), frame.project(&p)))
                .collect();
            match kind {
                LoopType::Periphery => peripheries.push(ring),
                _ => holes.push(ring),
            }
        }
        if peripheries.is_empty() {
            return Err(MeshError::NoPeriphery(face));
        }

        let outlines: Vec<Vec<Point2<f64>>> = peripheries
            .iter()
            .map(|r| r.iter().map(|&(_, uv)| uv).collect())
            .collect();
        let mut groups: Vec<Vec<&[(u32, Point2<f64>)]>> = vec![Vec::new(); peripheries.len()];
        for hole in &holes {
            let owner = hole
                .first()
                .and_then(|(_, uv)| outlines.iter().position(|o| inside(uv, o)))
                .unwrap_or_else(|| {
                    tracing::warn!(?face, "hole outside every outer boundary");
                    0
                });
            groups[owner].push(hole);
        }

        let mut triangles = 0;
        for (outer, holes) in peripheries.iter().zip(&groups) {
            triangles += self.triangulate(face, outer, holes, sign, &frame)?;
        }
        Ok(triangles)
    }

    /// Triangulates one outer ring with its holes and appends the triangles,
    /// counterclockwise about the outward normal.
    fn triangulate(
        &mut self,
        face: FaceKey,
        outer: &[(u32, Point2<f64>)],
        holes: &[&[(u32, Point2<f64>)]],
        sign: f64,
        frame: &Frame,
    ) -> Result<usize> {
        if outer.len() < 3 {
            return Err(MeshError::Triangulation(
                "Need at least 3 points in outer boundary".to_string(),
            ));
        }
        let valid_holes: Vec<&[(u32, Point2<f64>)]> =
            holes.iter().copied().filter(|h| h.len() >= 3).collect();

        // Flatten the rings, remembering where each one starts.
        let mut ring_starts = vec![0];
        let mut hole_indices = Vec::with_capacity(valid_holes.len());
        let mut points: Vec<(u32, Point2<f64>)> = outer.to_vec();
        for hole in valid_holes {
            hole_indices.push(points.len());
            ring_starts.push(points.len());
            points.extend_from_slice(hole);
        }
        let mut vertices = Vec::with_capacity(points.len() * 2);
        for (_, uv) in &points {
            vertices.push(uv.x);
            vertices.push(uv.y);
        }

        let indices = earcutr::earcut(&vertices, &hole_indices, 2)
            .map_err(|e| MeshError::Triangulation(format!("{:?}", e)))?;

        let restorer = Restorer::new(&ring_starts, points.len(), &indices);
        let extent = points
            .iter()
            .map(|(_, uv)| uv.coords.amax())
            .fold(1.0, f64::max);
        let degenerate = f64::EPSILON * extent * extent;

        let mut count = 0;
        for tri in indices.chunks_exact(3) {
            let (polygon, corners) = restorer.polygon([tri[0], tri[1], tri[2]]);
            let split = split_corners(polygon.len(), &corners);
            let pieces: Vec<[(u32, Point2<f64>); 3]> = match split[..] {
                [] => vec![[points[tri[0]], points[tri[1]], points[tri[2]]]],
                [k] => {
                    // Fan from the corner opposite the split edge.
                    let n = polygon.len();
                    let run: Vec<usize> = (0..n - 1)
                        .map(|i| polygon[(corners[k] + i) % n])
                        .collect();
                    let apex = points[polygon[(corners[k] + n - 1) % n]];
                    run.windows(2)
                        .map(|w| [points[w[0]], points[w[1]], apex])
                        .collect()
                }
                _ => {
                    let ring: Vec<(u32, Point2<f64>)> = polygon.iter().map(|&i| points[i]).collect();
                    let centre_uv = Point2::from(
                        ring.iter().map(|(_, uv)| uv.coords).sum::<Vector2<f64>>() / ring.len() as f64,
                    );
                    let centre_xyz = frame.origin + frame.u * centre_uv.x + frame.v * centre_uv.y;
                    let centre = (self.mesh.add_node(centre_xyz), centre_uv);
                    (0..ring.len())
                        .map(|i| [ring[i], ring[(i + 1) % ring.len()], centre])
                        .collect()
                }
            };
            for [a, b, c] in pieces {
                let area = signed_area(&a.1, &b.1, &c.1);
                if area.abs() <= degenerate {
                    continue;
                }
                let nodes = if area * sign > 0.0 {
                    [a.0, b.0, c.0]
                } else {
                    [a.0, c.0, b.0]
                };
                self.mesh.add_triangle(nodes, face);
                count += 1;
            }
        }
        Ok(count)
    }

    fn mesh_edge(&mut self, edge: EdgeKey) -> Result<()> {
        let chain = self.edge_chain(edge)?;
        let nodes: Vec<u32> = chain.into_iter().map(|(id, p)| self.node(id, p)).collect();
        for w in nodes.windows(2) {
            if w[0] != w[1] {
                self.mesh.add_segment([w[0], w[1]], edge);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Hanging boundary nodes
// =============================================================================

/// Puts back boundary points that the triangulator dropped.
///
/// Ear clipping removes points lying on the straight line between their
/// neighbours. Those points are still nodes of the neighbouring face, so
/// each triangle edge that skips over them is split at them again.
struct Restorer {
    /// Start of the ring each flattened point belongs to, and its length.
    ring: Vec<(usize, usize)>,
    /// Next point along the ring that the triangulation uses.
    next_used: Vec<usize>,
}

impl Restorer {
    fn new(ring_starts: &[usize], total: usize, indices: &[usize]) -> Self {
        let mut used = vec![false; total];
        for &i in indices {
            if let Some(u) = used.get_mut(i) {
                *u = true;
            }
        }
        let mut ring = vec![(0, 0); total];
        let mut next_used = vec![usize::MAX; total];
        for (k, &start) in ring_starts.iter().enumerate() {
            let end = ring_starts.get(k + 1).copied().unwrap_or(total);
            let len = end - start;
            for slot in &mut ring[start..end] {
                *slot = (start, len);
            }
            // Two passes around the ring resolve the wrap-around.
            let mut next = usize::MAX;
            for step in (0..2 * len).rev() {
                let i = start + step % len;
                next_used[i] = next;
                if used[i] {
                    next = i;
                }
            }
        }
        Self { ring, next_used }
    }

    fn step(&self, i: usize) -> usize {
        let (start, len) = self.ring[i];
        start + (i - start + 1) % len
    }

    /// Dropped points strictly between `a` and `b`, in the order from `a`.
    fn between(&self, a: usize, b: usize) -> Vec<usize> {
        let forward = |from: usize, to: usize| {
            let mut out = Vec::new();
            let mut i = self.step(from);
            while i != to {
                out.push(i);
                i = self.step(i);
            }
            out
        };
        if self.ring[a].0 != self.ring[b].0 {
            return Vec::new();
        }
        if self.next_used[a] == b {
            forward(a, b)
        } else if self.next_used[b] == a {
            let mut back = forward(b, a);
            back.reverse();
            back
        } else {
            Vec::new()
        }
    }

    /// The triangle with its dropped edge points put back, as a polygon,
    /// and the positions of the three corners in it.
    fn polygon(&self, tri: [usize; 3]) -> (Vec<usize>, [usize; 3]) {
        let mut out = Vec::with_capacity(3);
        let mut corners = [0; 3];
        for k in 0..3 {
            let (a, b) = (tri[k], tri[(k + 1) % 3]);
            corners[k] = out.len();
            out.push(a);
            out.extend(self.between(a, b));
        }
        (out, corners)
    }
}

/// Corner indices `k` whose edge to the next corner carries dropped points.
fn split_corners(len: usize, corners: &[usize; 3]) -> Vec<usize> {
    (0..3)
        .filter(|&k| {
            let next = if k == 2 { len } else { corners[k + 1] };
            next - corners[k] > 1
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::no_progress;
    use approx::assert_relative_eq;
    use rustc_hash::FxHashSet;
    use tolbrep_topology::{BodyKey, LoopKey, Sense, Transaction};

    fn block(arena: &mut BrepArena) -> BodyKey {
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        tx.commit();
        body
    }

    fn mesh(arena: &BrepArena, input: &MeshInput, params: &SessionParams) -> Result<Mesh> {
        PlanarMesher.compute(arena, input, params, &mut no_progress)
    }

    /// Every directed triangle edge appears once and its reverse once.
    fn assert_closed(mesh: &Mesh) {
        let mut directed = FxHashSet::default();
        for t in &mesh.triangles {
            for k in 0..3 {
                assert!(directed.insert((t[k], t[(k + 1) % 3])), "edge used twice the same way");
            }
        }
        for &(a, b) in &directed {
            assert!(directed.contains(&(b, a)), "open mesh edge {a}-{b}");
        }
    }

    fn assert_outward(mesh: &Mesh, centre: Point3<f64>) {
        for i in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.triangles[i];
            let mid = Point3::from(
                (mesh.node(a).unwrap().coords + mesh.node(b).unwrap().coords + mesh.node(c).unwrap().coords)
                    / 3.0,
            );
            assert!(mesh.triangle_normal(i).unwrap().dot(&(mid - centre)) > 0.0);
        }
    }

    #[test]
    fn test_block_mesh_is_closed_and_outward() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let input = MeshInput::from_body(&arena, body);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();

        assert_eq!(mesh.node_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert_relative_eq!(mesh.area(), 6.0, epsilon = 1e-12);
        for f in arena.body_faces(body) {
            assert_eq!(mesh.triangles_of(f).count(), 2);
            assert_relative_eq!(mesh.face_area(f), 1.0, epsilon = 1e-12);
        }
        assert_closed(&mesh);
        assert_outward(&mesh, Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_max_size_refines_shared_boundaries() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let input = MeshInput::from_body(&arena, body);
        let params = SessionParams::from_pairs([("max_size", "0.25")]).unwrap();
        let mesh = mesh(&arena, &input, &params).unwrap();

        // 8 corners and 3 nodes inside each of the 12 edges, plus any
        // interior nodes.
        assert!(mesh.node_count() >= 8 + 12 * 3);
        assert_relative_eq!(mesh.area(), 6.0, epsilon = 1e-9);
        assert_closed(&mesh);
        assert_outward(&mesh, Point3::new(0.5, 0.5, 0.5));
        let mut used = vec![false; mesh.node_count()];
        for t in &mesh.triangles {
            for &n in t {
                used[n as usize] = true;
            }
        }
        assert!(used.into_iter().all(|u| u), "every boundary node is a triangle corner");
    }

    #[test]
    fn test_triangle_face() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("triangle");
        let face = tx
            .make_polygon_face(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        tx.commit();

        let input = MeshInput::new().with_faces([face]);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.triangle_face(0), Some(face));
        assert_relative_eq!(mesh.area(), 0.5);
        assert!(mesh.triangle_normal(0).unwrap().z > 0.0);
    }

    #[test]
    fn test_reversed_face_keeps_outward_side() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("triangle");
        let face = tx
            .make_polygon_face(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        // Same outward side, seen from a plane facing the other way.
        let flipped = tx.make_plane(Point3::origin(), -Vector3::z()).unwrap();
        tx.set_face_surface(face, Some(flipped)).unwrap();
        tx.set_face_sense(face, Sense::Reversed).unwrap();
        tx.commit();

        let input = MeshInput::new().with_faces([face]);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();
        assert!(mesh.triangle_normal(0).unwrap().z > 0.0);
    }

    fn square_loop(tx: &mut Transaction<'_>, corners: [(f64, f64); 4]) -> LoopKey {
        let vertices: Vec<VertexKey> = corners
            .iter()
            .map(|&(x, y)| tx.make_vertex(Point3::new(x, y, 0.0)).unwrap())
            .collect();
        let coedges: Vec<CoedgeKey> = (0..4)
            .map(|i| {
                let e = tx.make_straight_edge(vertices[i], vertices[(i + 1) % 4]).unwrap();
                tx.make_coedge(e, Sense::Forward, None).unwrap()
            })
            .collect();
        tx.make_loop(&coedges).unwrap()
    }

    #[test]
    fn test_face_with_hole() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("frame");
        let outer = square_loop(&mut tx, [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
        let inner = square_loop(&mut tx, [(1.0, 1.0), (1.0, 3.0), (3.0, 3.0), (3.0, 1.0)]);
        let plane = tx.make_plane(Point3::origin(), Vector3::z()).unwrap();
        let face = tx.make_face(&[outer, inner], Some(plane), Sense::Forward).unwrap();
        tx.commit();

        assert_eq!(arena.loop_type(inner), LoopType::Hole);
        let input = MeshInput::new().with_faces([face]);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();
        assert_eq!(mesh.node_count(), 8);
        assert_eq!(mesh.triangle_count(), 8);
        assert_relative_eq!(mesh.area(), 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_override_is_shared_by_both_faces() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let edge = arena.body_edges(body)[0];
        let data = arena.edge(edge).unwrap();
        let a = arena.vertex_position(data.start.unwrap()).unwrap();
        let b = arena.vertex_position(data.end.unwrap()).unwrap();
        let samples = vec![
            Sample::at(a),
            Sample::at(a + (b - a) * 0.3),
            Sample::at(a + (b - a) * 0.6),
            Sample::at(b),
        ];
        let input = MeshInput::from_body(&arena, body).override_edge(edge, samples);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();

        assert_eq!(mesh.node_count(), 10);
        assert_closed(&mesh);
        assert_relative_eq!(mesh.area(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let edge = arena.body_edges(body)[0];
        let start = arena.vertex_position(arena.edge(edge).unwrap().start.unwrap()).unwrap();

        let input = MeshInput::from_body(&arena, body)
            .override_edge(edge, vec![Sample::at(start), Sample::at(Point3::new(9.0, 9.0, 9.0))]);
        assert!(matches!(
            mesh(&arena, &input, &SessionParams::default()),
            Err(MeshError::InvalidOverride { .. })
        ));

        let input = MeshInput::from_body(&arena, body)
            .override_edge(edge, vec![Sample::at_uv(Point2::origin()), Sample::default()]);
        assert!(matches!(
            mesh(&arena, &input, &SessionParams::default()),
            Err(MeshError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn test_coedge_override_from_uv() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("triangle");
        let face = tx
            .make_polygon_face(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        tx.commit();

        let coedge = arena.face_coedges(face)[0];
        let from = arena.vertex_position(arena.coedge_start_vertex(coedge).unwrap()).unwrap();
        let to = arena.vertex_position(arena.coedge_end_vertex(coedge).unwrap()).unwrap();
        let surface = arena.face_surface(face).unwrap();
        let mid = surface.param(&Point3::from((from.coords + to.coords) / 2.0));
        let samples = vec![Sample::at(from), Sample::at_uv(mid), Sample::at(to)];

        let input = MeshInput::new().with_faces([face]).override_coedge(coedge, samples);
        let mesh = mesh(&arena, &input, &SessionParams::default()).unwrap();
        assert_eq!(mesh.node_count(), 4);
        assert_relative_eq!(mesh.area(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_non_planar_face_is_unsupported() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("sphere");
        let sphere = tx.make_sphere(Point3::origin(), 1.0).unwrap();
        let face = tx.make_face(&[], Some(sphere), Sense::Forward).unwrap();
        tx.commit();

        let input = MeshInput::new().with_faces([face]);
        assert!(matches!(
            mesh(&arena, &input, &SessionParams::default()),
            Err(MeshError::UnsupportedSurface(f)) if f == face
        ));
    }

    #[test]
    fn test_free_edges_become_segments() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("wire");
        let body = tx
            .make_wire_body(
                &[
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(1.0, 1.0, 0.0),
                ],
                false,
            )
            .unwrap();
        tx.commit();

        let input = MeshInput::from_body(&arena, body);
        let params = SessionParams::from_pairs([("max_size", "0.5")]).unwrap();
        let mesh = mesh(&arena, &input, &params).unwrap();
        assert_eq!(mesh.segment_count(), 4);
        assert_eq!(mesh.node_count(), 5);
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_progress_can_stop() {
        let mut arena = BrepArena::new();
        let body = block(&mut arena);
        let input = MeshInput::from_body(&arena, body);

        let mut calls = Vec::new();
        let mut record = |p: &Progress| {
            calls.push(p.current);
            Control::Continue
        };
        PlanarMesher
            .compute(&arena, &input, &SessionParams::default(), &mut record)
            .unwrap();
        assert_eq!(calls, vec![1, 2, 3, 4, 5, 6]);

        let mut stop = |p: &Progress| {
            if p.current == 2 {
                Control::Stop
            } else {
                Control::Continue
            }
        };
        assert!(matches!(
            PlanarMesher.compute(&arena, &input, &SessionParams::default(), &mut stop),
            Err(MeshError::Interrupted(2))
        ));
    }

    #[test]
    fn test_thin_and_subdivide() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.05, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
            Point3::new(0.98, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let thinned = thin(points, 0.1);
        assert_eq!(thinned.len(), 3);
        assert_eq!(subdivide(&thinned, 0.2).len(), 7);
        assert_eq!(subdivide(&thinned, f64::INFINITY), thinned);
    }
}
