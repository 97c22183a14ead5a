// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entity data stored in the arena.
//!
//! Child-to-parent fields (`CoedgeData::owner`, `LoopData::face`, ...) are
//! plain back-references. Parent-to-child chains (`first_loop`, `next`, ...)
//! together with geometry use counts form the ownership graph that
//! [`crate::Transaction::lose`] tears down.

use std::ops::Not;

use serde::{Deserialize, Serialize};

use crate::geometry::Interval;
use crate::keys::*;

/// Tolerance value meaning "stale, recompute before use".
pub const NEEDS_UPDATE: f64 = -1.0;

/// Orientation of an entity relative to its underlying geometry or parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sense {
    #[default]
    Forward,
    Reversed,
}

impl Sense {
    /// XOR-composes a local reversal flag into this sense.
    pub fn compose(self, rev: bool) -> Sense {
        if rev {
            !self
        } else {
            self
        }
    }

    pub fn is_reversed(self) -> bool {
        self == Sense::Reversed
    }

    /// `+1.0` for forward, `-1.0` for reversed.
    pub fn sign(self) -> f64 {
        match self {
            Sense::Forward => 1.0,
            Sense::Reversed => -1.0,
        }
    }

    /// Token used in saved files.
    pub fn as_str(self) -> &'static str {
        match self {
            Sense::Forward => "forward",
            Sense::Reversed => "reversed",
        }
    }

    pub fn parse(token: &str) -> Option<Sense> {
        match token {
            "forward" => Some(Sense::Forward),
            "reversed" => Some(Sense::Reversed),
            _ => None,
        }
    }
}

impl Not for Sense {
    type Output = Sense;

    fn not(self) -> Sense {
        match self {
            Sense::Forward => Sense::Reversed,
            Sense::Reversed => Sense::Forward,
        }
    }
}

/// Whether a face bounds material on one side or is a double-sided sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sidedness {
    #[default]
    Single,
    Double,
}

/// For a double-sided face, whether it is embedded in material or free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Containment {
    #[default]
    Out,
    In,
}

/// Convexity of the dihedral angle along an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convexity {
    #[default]
    Unknown,
    Convex,
    Concave,
    Tangent,
}

impl Convexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Convexity::Unknown => "unknown",
            Convexity::Convex => "convex",
            Convexity::Concave => "concave",
            Convexity::Tangent => "tangent",
        }
    }

    pub fn parse(token: &str) -> Option<Convexity> {
        match token {
            "unknown" => Some(Convexity::Unknown),
            "convex" => Some(Convexity::Convex),
            "concave" => Some(Convexity::Concave),
            "tangent" => Some(Convexity::Tangent),
            _ => None,
        }
    }
}

/// Classification of a loop within its face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopType {
    /// Not yet computed.
    #[default]
    Unknown,
    /// Outer boundary.
    Periphery,
    /// Inner boundary.
    Hole,
    /// Encloses no area (both sides of the loop belong to the face).
    Separation,
}

impl LoopType {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopType::Unknown => "unknown",
            LoopType::Periphery => "periphery",
            LoopType::Hole => "hole",
            LoopType::Separation => "separation",
        }
    }

    pub fn parse(token: &str) -> Option<LoopType> {
        match token {
            "unknown" => Some(LoopType::Unknown),
            "periphery" => Some(LoopType::Periphery),
            "hole" => Some(LoopType::Hole),
            "separation" => Some(LoopType::Separation),
            _ => None,
        }
    }
}

/// Exact or tolerant modeling state of a vertex, edge or coedge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Modeling {
    #[default]
    Exact,
    /// A negative tolerance is [`NEEDS_UPDATE`].
    Tolerant { tolerance: f64 },
}

impl Modeling {
    pub fn is_tolerant(&self) -> bool {
        matches!(self, Modeling::Tolerant { .. })
    }

    /// Stored tolerance, without checking for staleness.
    pub fn stored_tolerance(&self) -> Option<f64> {
        match self {
            Modeling::Exact => None,
            Modeling::Tolerant { tolerance } => Some(*tolerance),
        }
    }

    pub fn needs_update(&self) -> bool {
        matches!(self, Modeling::Tolerant { tolerance } if *tolerance < 0.0)
    }
}

/// What a coedge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoedgeOwner {
    Loop(LoopKey),
    Wire(WireKey),
}

impl From<CoedgeOwner> for EntityKey {
    fn from(owner: CoedgeOwner) -> Self {
        match owner {
            CoedgeOwner::Loop(l) => l.into(),
            CoedgeOwner::Wire(w) => w.into(),
        }
    }
}

/// A vertex: a point plus the edges that end at it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexData {
    pub point: PointKey,
    pub edges: Vec<EdgeKey>,
    pub modeling: Modeling,
}

/// A bounded portion of a curve.
///
/// `start` lies at the low end of the parameter range when `sense` is
/// forward and at the high end when reversed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeData {
    pub start: Option<VertexKey>,
    pub end: Option<VertexKey>,
    /// One coedge of the partner ring.
    pub coedge: Option<CoedgeKey>,
    pub curve: Option<CurveKey>,
    pub sense: Sense,
    /// Curve parameter range; derived from the vertices when `None`.
    pub param_range: Option<Interval>,
    pub convexity: Convexity,
    pub modeling: Modeling,
}

/// A directed use of an edge by a loop or wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoedgeData {
    pub edge: EdgeKey,
    pub owner: Option<CoedgeOwner>,
    pub next: Option<CoedgeKey>,
    pub previous: Option<CoedgeKey>,
    pub partner: Option<CoedgeKey>,
    pub sense: Sense,
    pub pcurve: Option<PcurveKey>,
    pub modeling: Modeling,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopData {
    pub face: Option<FaceKey>,
    pub next: Option<LoopKey>,
    pub start: Option<CoedgeKey>,
    pub kind: LoopType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceData {
    pub shell: Option<ShellKey>,
    pub next: Option<FaceKey>,
    pub first_loop: Option<LoopKey>,
    pub surface: Option<SurfaceKey>,
    pub sense: Sense,
    pub sides: Sidedness,
    /// Only meaningful for double-sided faces.
    pub containment: Containment,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireData {
    pub body: Option<BodyKey>,
    pub next: Option<WireKey>,
    pub coedge: Option<CoedgeKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellData {
    pub lump: Option<LumpKey>,
    pub next: Option<ShellKey>,
    pub first_face: Option<FaceKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LumpData {
    pub body: Option<BodyKey>,
    pub next: Option<LumpKey>,
    pub first_shell: Option<ShellKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyData {
    pub first_lump: Option<LumpKey>,
    pub first_wire: Option<WireKey>,
}
