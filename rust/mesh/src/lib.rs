// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # tolbrep Mesh
//!
//! Bridge between tolbrep topology and surface mesh engines.
//!
//! The bridge reads a selection of faces and edges from a [`BrepArena`],
//! optionally with explicit edge discretizations, and produces an
//! independent [`Mesh`] whose triangles remember the faces they came from.
//! It never modifies the topology.
//!
//! ```
//! use nalgebra::Point3;
//! use tolbrep_mesh::{MeshInput, SurfaceSession};
//! use tolbrep_topology::BrepArena;
//!
//! let mut arena = BrepArena::new();
//! let mut tx = arena.begin("block");
//! let body = tx.make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
//! tx.commit();
//!
//! let mut session = SurfaceSession::new(&arena, MeshInput::from_body(&arena, body));
//! session.set_param("max_size", "0.5").unwrap();
//! let mesh = session.compute(&mut tolbrep_mesh::no_progress).unwrap();
//! assert!((mesh.area() - 6.0).abs() < 1e-9);
//! ```

pub mod engine;
pub mod error;
pub mod input;
pub mod mesh;
pub mod params;
pub mod planar;
pub mod session;

pub use engine::{no_progress, Control, MeshEngine, Progress, ProgressFn};
pub use error::{MeshError, Result};
pub use input::{DiscretizationOverride, MeshInput, Sample};
pub use mesh::Mesh;
pub use params::SessionParams;
pub use planar::PlanarMesher;
pub use session::SurfaceSession;

use tolbrep_topology::{BodyKey, BrepArena};

/// Meshes every face and free edge of a body with the planar engine.
pub fn mesh_body(arena: &BrepArena, body: BodyKey, params: &SessionParams) -> Result<Mesh> {
    if arena.body(body).is_none() {
        return Err(MeshError::NotFound(body.into()));
    }
    let input = MeshInput::from_body(arena, body);
    PlanarMesher.compute(arena, &input, params, &mut no_progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_mesh_body() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        let body = tx
            .make_block(Point3::origin(), Point3::new(2.0, 1.0, 1.0))
            .unwrap();
        tx.commit();

        let mesh = mesh_body(&arena, body, &SessionParams::default()).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert!((mesh.area() - 10.0).abs() < 1e-12);

        let mut tx = arena.begin("lose");
        tx.lose(body).unwrap();
        tx.commit();
        assert!(matches!(
            mesh_body(&arena, body, &SessionParams::default()),
            Err(MeshError::NotFound(_))
        ));
    }
}
