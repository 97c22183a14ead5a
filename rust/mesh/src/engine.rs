// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The mesh engine boundary.
//!
//! An engine reads topology and writes an independent [`Mesh`]. It receives
//! the arena by shared reference and cannot change it. Long computations
//! report progress through a callback passed to each call, which can stop
//! the computation early.

use tolbrep_topology::BrepArena;

use crate::error::Result;
use crate::input::MeshInput;
use crate::mesh::Mesh;
use crate::params::SessionParams;

/// Progress information passed to callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Work units done so far.
    pub current: u64,
    /// Total number of work units.
    pub total: u64,
    /// What the engine is doing.
    pub message: String,
}

impl Progress {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }

    /// Progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }

    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// What a progress callback asks the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    #[default]
    Continue,
    Stop,
}

/// Progress callback. Returning [`Control::Stop`] interrupts the computation.
pub type ProgressFn<'a> = dyn FnMut(&Progress) -> Control + 'a;

/// A callback that never interrupts.
pub fn no_progress(_: &Progress) -> Control {
    Control::Continue
}

/// A surface mesh generator.
pub trait MeshEngine {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Meshes `input`. An interrupted computation returns
    /// [`MeshError::Interrupted`](crate::MeshError::Interrupted).
    fn compute(
        &self,
        arena: &BrepArena,
        input: &MeshInput,
        params: &SessionParams,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Mesh>;
}
