// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # tolbrep Topology
//!
//! Tolerant boundary-representation (B-rep) topology with rollback history.
//!
//! A model is a graph of bodies, lumps, shells, faces, loops, coedges,
//! edges and vertices over shared, use-counted geometry (points, curves,
//! pcurves, surfaces). All of it lives in one [`BrepArena`] behind
//! generational keys.
//!
//! Every change goes through a [`Transaction`]. The transaction records the
//! state of each entity before its first change, so it can be rolled back
//! when dropped, and it becomes one undoable step when committed.
//!
//! Vertices, edges and coedges can be *tolerant*: they carry a tolerance
//! within which their geometry is allowed to disagree. All coincidence
//! decisions go through [`BrepArena::coincident`].
//!
//! ```
//! use nalgebra::Point3;
//! use tolbrep_topology::BrepArena;
//!
//! let mut arena = BrepArena::new();
//! let mut tx = arena.begin("block");
//! let body = tx.make_block(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
//! tx.commit();
//!
//! assert_eq!(arena.body_faces(body).len(), 6);
//! assert!(arena.check().is_valid());
//!
//! arena.undo().unwrap();
//! assert_eq!(arena.face_count(), 0);
//! ```

pub mod arena;
pub mod attribute;
pub mod builders;
pub mod check;
pub mod config;
pub mod construction;
pub mod edit;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod history;
pub mod keys;
pub mod query;
pub mod sat;
pub mod spatial;
mod store;
pub mod teardown;
pub mod tolerance;
pub mod transaction;
pub mod transform;
pub mod traversal;

pub use arena::{BrepArena, Record};
pub use attribute::{
    Annotation, AnnotationKind, AttribAction, AttribData, Attribute, AttributeKind, BlendAttrib,
    DictValue, GenericAttrib, HealingAttrib,
};
pub use check::{CheckReport, Issue};
pub use config::ModelingOptions;
pub use entity::{
    CoedgeOwner, Containment, Convexity, LoopType, Modeling, Sense, Sidedness, NEEDS_UPDATE,
};
pub use error::{Error, Result};
pub use geometry::{Aabb, Curve, Interval, Pcurve, Surface};
pub use history::{Bulletin, BulletinKind, DeltaState, History, StateId};
pub use keys::{
    AttribKey, BodyKey, CoedgeKey, CurveKey, EdgeKey, EntityKey, EntityType, FaceKey, LoopKey,
    LumpKey, PcurveKey, PointKey, ShellKey, SurfaceKey, VertexKey, WireKey,
};
pub use sat::CURRENT_VERSION;
pub use spatial::SpatialIndex;
pub use tolerance::Probe;
pub use transaction::Transaction;
