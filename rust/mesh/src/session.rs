// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Surface meshing sessions.
//!
//! A session ties an input selection to an engine and a parameter set. It
//! keeps the last mesh and recomputes on [`SurfaceSession::update`] only when
//! parameters changed since.

use tolbrep_topology::BrepArena;

use crate::engine::{MeshEngine, ProgressFn};
use crate::error::{MeshError, Result};
use crate::input::MeshInput;
use crate::mesh::Mesh;
use crate::params::SessionParams;
use crate::planar::PlanarMesher;

pub struct SurfaceSession<'a, E: MeshEngine = PlanarMesher> {
    arena: &'a BrepArena,
    input: MeshInput,
    engine: E,
    params: SessionParams,
    mesh: Option<Mesh>,
    stale: bool,
}

impl<'a> SurfaceSession<'a, PlanarMesher> {
    /// Session on the built-in planar engine.
    pub fn new(arena: &'a BrepArena, input: MeshInput) -> Self {
        Self::with_engine(arena, input, PlanarMesher)
    }
}

impl<'a, E: MeshEngine> SurfaceSession<'a, E> {
    pub fn with_engine(arena: &'a BrepArena, input: MeshInput, engine: E) -> Self {
        Self {
            arena,
            input,
            engine,
            params: SessionParams::default(),
            mesh: None,
            stale: true,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn input(&self) -> &MeshInput {
        &self.input
    }

    /// Sets a parameter from its string value. The next update recomputes.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.params.set(name, value)?;
        self.stale = true;
        Ok(())
    }

    pub fn get_param(&self, name: &str) -> Result<String> {
        self.params.get(name)
    }

    /// Computes the mesh from scratch.
    pub fn compute(&mut self, progress: &mut ProgressFn<'_>) -> Result<&Mesh> {
        tracing::debug!(
            engine = self.engine.name(),
            faces = self.input.faces.len(),
            edges = self.input.edges.len(),
            "computing mesh"
        );
        let mesh = self
            .engine
            .compute(self.arena, &self.input, &self.params, progress)?;
        self.stale = false;
        Ok(&*self.mesh.insert(mesh))
    }

    /// Recomputes if parameters changed since the last computation.
    ///
    /// Fails with [`MeshError::NotComputed`] before the first computation.
    pub fn update(&mut self, progress: &mut ProgressFn<'_>) -> Result<&Mesh> {
        if self.mesh.is_none() {
            return Err(MeshError::NotComputed);
        }
        if self.stale {
            return self.compute(progress);
        }
        self.mesh()
    }

    pub fn mesh(&self) -> Result<&Mesh> {
        self.mesh.as_ref().ok_or(MeshError::NotComputed)
    }

    /// Takes the mesh out of the session.
    pub fn into_mesh(self) -> Result<Mesh> {
        self.mesh.ok_or(MeshError::NotComputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{no_progress, Control, Progress};
    use nalgebra::Point3;
    use tolbrep_topology::FaceKey;

    fn block() -> BrepArena {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("block");
        tx.make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        tx.commit();
        arena
    }

    #[test]
    fn test_compute_then_update() {
        let arena = block();
        let faces = arena.entities().into_iter().filter_map(|k| FaceKey::try_from(k).ok());
        let mut session = SurfaceSession::new(&arena, MeshInput::new().with_faces(faces));

        assert!(matches!(session.mesh(), Err(MeshError::NotComputed)));
        assert!(matches!(
            session.update(&mut no_progress),
            Err(MeshError::NotComputed)
        ));

        let coarse = session.compute(&mut no_progress).unwrap().node_count();
        assert_eq!(coarse, 8);

        // Nothing changed: update hands back the same mesh without calling
        // the engine.
        let mut calls = 0;
        let mut count = |_: &Progress| {
            calls += 1;
            Control::Continue
        };
        session.update(&mut count).unwrap();
        assert_eq!(calls, 0);

        session.set_param("max_size", "0.5").unwrap();
        assert_eq!(session.get_param("max_size").unwrap(), "0.5");
        let fine = session.update(&mut no_progress).unwrap().node_count();
        assert!(fine > coarse);
    }

    #[test]
    fn test_failed_param_keeps_mesh() {
        let arena = block();
        let faces = arena.entities().into_iter().filter_map(|k| FaceKey::try_from(k).ok());
        let mut session = SurfaceSession::new(&arena, MeshInput::new().with_faces(faces));
        session.compute(&mut no_progress).unwrap();
        assert!(session.set_param("gradation", "0.2").is_err());
        assert_eq!(session.into_mesh().unwrap().triangle_count(), 12);
    }
}
