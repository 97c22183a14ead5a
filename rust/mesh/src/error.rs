// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;
use tolbrep_topology::{EntityKey, FaceKey};

/// Errors raised by the mesh bridge
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Unknown session parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid value {value:?} for parameter {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: &'static str,
    },

    #[error("Entity not found: {0:?}")]
    NotFound(EntityKey),

    #[error("Face {0:?} does not lie on a plane")]
    UnsupportedSurface(FaceKey),

    #[error("Face {0:?} has no outer boundary")]
    NoPeriphery(FaceKey),

    #[error("Invalid discretization override for {key:?}: {reason}")]
    InvalidOverride {
        key: EntityKey,
        reason: &'static str,
    },

    #[error("Triangulation failed: {0}")]
    Triangulation(String),

    #[error("Mesh computation interrupted at step {0}")]
    Interrupted(u64),

    #[error("No mesh has been computed yet")]
    NotComputed,

    #[error("Mesh references node {node} but has {count} nodes")]
    BadNodeIndex { node: u32, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
