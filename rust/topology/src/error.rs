// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.

use crate::keys::{CoedgeKey, EntityKey, LoopKey};

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced entity is not live in the arena.
    #[error("entity not found: {0:?}")]
    NotFound(EntityKey),

    /// The entity has the wrong type for the requested operation.
    #[error("entity {0:?} has the wrong type for this operation")]
    WrongType(EntityKey),

    /// The entity is still referenced and cannot be lost on its own.
    #[error("entity {0:?} is still in use")]
    InUse(EntityKey),

    /// A use count would drop below zero.
    #[error("use count underflow on {0:?}")]
    UseCountUnderflow(EntityKey),

    /// An edge on a closed curve must have both vertices or neither.
    #[error("edge on a closed curve must have both end vertices or neither")]
    ClosedCurveEnds,

    /// A curve or surface was given degenerate defining vectors.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),

    /// A loop or wire must have at least one coedge.
    #[error("loop must have at least one coedge")]
    EmptyLoop,

    /// A shell must have at least one face.
    #[error("shell must have at least one face")]
    EmptyShell,

    /// Coedges in a loop are not connected end-to-start.
    #[error("coedges are not connected: coedge {0} end does not match coedge {1} start")]
    DisconnectedLoop(usize, usize),

    /// The coedge already belongs to a loop or wire.
    #[error("coedge {0:?} already has an owner")]
    CoedgeInUse(CoedgeKey),

    /// The loop already belongs to a face.
    #[error("loop {0:?} already belongs to a face")]
    LoopInUse(LoopKey),

    /// The entity already belongs to a parent.
    #[error("entity {0:?} already has a parent")]
    AlreadyOwned(EntityKey),

    /// A zero tolerance was requested for an entity with more than one use.
    #[error("zero tolerance is only allowed for a single tolerant use: {0:?}")]
    ZeroToleranceShared(EntityKey),

    /// A face coedge has no pcurve and approximation was not allowed.
    #[error("coedge {0:?} has no pcurve")]
    MissingPcurve(CoedgeKey),

    /// A tolerant entity deviates too much to become exact again.
    #[error("entity {key:?} deviates by {deviation} which exceeds resabs")]
    ToleranceTooLarge { key: EntityKey, deviation: f64 },

    /// Two entities are not coincident within tolerance.
    #[error("entities are not coincident: distance {distance} exceeds tolerance {tolerance}")]
    NotCoincident { distance: f64, tolerance: f64 },

    /// A curve parameter lies outside the edge's parameter range.
    #[error("parameter {0} is outside the edge's parameter range")]
    ParameterOutOfRange(f64),

    /// The edge has no curve or no bounding vertices.
    #[error("edge {0:?} is unbounded or has no curve")]
    UnboundedEdge(EntityKey),

    /// A history record does not match its key (internal corruption).
    #[error("history record does not match entity {0:?}")]
    RecordMismatch(EntityKey),

    /// A saved file has an unsupported version number.
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u32),

    /// A saved file could not be parsed.
    #[error("restore failed at record {record}: {message}")]
    Restore { record: usize, message: String },

    /// Filesystem failure while saving or restoring.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn restore(record: usize, message: impl Into<String>) -> Self {
        Error::Restore {
            record,
            message: message.into(),
        }
    }
}
