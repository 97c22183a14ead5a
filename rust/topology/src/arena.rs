// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for B-rep entities.
//!
//! The [`BrepArena`] is the central owner of all model data. Every entity
//! (topology, use-counted geometry and attributes) lives in a slot map with
//! stable, generational keys. Back-references (coedge to loop, loop to face)
//! are plain keys; there are no ownership cycles to break.
//!
//! Reading goes through `&BrepArena`. Writing goes through a
//! [`Transaction`] obtained from [`BrepArena::begin`], which records the
//! pre-image of every entity before its first change.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use crate::attribute::AttribData;
use crate::config::ModelingOptions;
use crate::entity::*;
use crate::error::{Error, Result};
use crate::geometry::{Aabb, Counted, Curve, Pcurve, Surface};
use crate::history::History;
use crate::keys::*;
use crate::store::Store;
use crate::transaction::Transaction;

macro_rules! entity_stores {
    ($($variant:ident => $field:ident: $key:ident, $data:ty,
        $get:ident, $get_mut:ident, $insert:ident, $count:ident;)*) => {
        /// Snapshot of one entity, as kept in history bulletins.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            $($variant($data),)*
        }

        impl Record {
            pub fn entity_type(&self) -> EntityType {
                match self {
                    $(Record::$variant(_) => EntityType::$variant,)*
                }
            }
        }

        /// The central arena that owns all entities of one model.
        ///
        /// # Example
        ///
        /// ```
        /// use nalgebra::Point3;
        /// use tolbrep_topology::BrepArena;
        ///
        /// let mut arena = BrepArena::new();
        /// let mut tx = arena.begin("vertex");
        /// let v = tx.make_vertex(Point3::new(1.0, 2.0, 3.0)).unwrap();
        /// tx.commit();
        ///
        /// assert_eq!(arena.vertex_count(), 1);
        /// assert_eq!(arena.vertex_position(v), Some(Point3::new(1.0, 2.0, 3.0)));
        /// ```
        #[derive(Debug)]
        pub struct BrepArena {
            $(pub(crate) $field: Store<$key, $data>,)*
            pub(crate) options: ModelingOptions,
            pub(crate) history: History,
            pub(crate) boxes: FxHashMap<EntityKey, Aabb>,
        }

        impl BrepArena {
            /// Creates an empty arena with the given options.
            pub fn with_options(options: ModelingOptions) -> Self {
                Self {
                    $($field: Store::new(),)*
                    options,
                    history: History::new(),
                    boxes: FxHashMap::default(),
                }
            }

            $(
                pub fn $get(&self, key: $key) -> Option<&$data> {
                    self.$field.get(key)
                }

                pub fn $count(&self) -> usize {
                    self.$field.len()
                }
            )*

            /// Snapshot of a live entity.
            pub fn record(&self, key: EntityKey) -> Option<Record> {
                match key {
                    $(EntityKey::$variant(k) => self.$field.get(k).cloned().map(Record::$variant),)*
                }
            }

            /// Writes a snapshot back, or tombstones the slot for `None`.
            pub(crate) fn write_record(&mut self, key: EntityKey, record: Option<Record>) -> Result<()> {
                let written = match (key, record) {
                    $(
                        (EntityKey::$variant(k), Some(Record::$variant(data))) => self.$field.write(k, Some(data)),
                        (EntityKey::$variant(k), None) => self.$field.write(k, None),
                    )*
                    _ => false,
                };
                if written {
                    Ok(())
                } else {
                    Err(Error::RecordMismatch(key))
                }
            }

            /// Returns `true` if the key refers to a live entity.
            pub fn contains(&self, key: EntityKey) -> bool {
                match key {
                    $(EntityKey::$variant(k) => self.$field.contains(k),)*
                }
            }

            pub(crate) fn reclaim(&mut self, key: EntityKey) -> bool {
                match key {
                    $(EntityKey::$variant(k) => self.$field.reclaim(k),)*
                }
            }

            /// Number of live entities of one type.
            pub fn count(&self, ty: EntityType) -> usize {
                match ty {
                    $(EntityType::$variant => self.$field.len(),)*
                }
            }

            /// Keys of all live entities, grouped by type in top-down order.
            pub fn entities(&self) -> Vec<EntityKey> {
                let mut out = Vec::new();
                $(out.extend(self.$field.keys().map(EntityKey::from));)*
                out
            }

            /// Number of lost entities whose slots are still held for undo.
            pub fn tombstone_count(&self) -> usize {
                0 $(+ self.$field.tombstones())*
            }
        }

        impl Transaction<'_> {
            $(
                /// Backs the entity up and returns it for writing.
                pub(crate) fn $get_mut(&mut self, key: $key) -> Result<&mut $data> {
                    self.backup(key.into())?;
                    self.arena
                        .$field
                        .get_mut(key)
                        .ok_or(Error::NotFound(key.into()))
                }

                pub(crate) fn $insert(&mut self, data: $data) -> $key {
                    let key = self.arena.$field.insert(data);
                    self.created(key.into());
                    key
                }
            )*
        }
    };
}

entity_stores! {
    Body => bodies: BodyKey, BodyData, body, body_mut, insert_body, body_count;
    Lump => lumps: LumpKey, LumpData, lump, lump_mut, insert_lump, lump_count;
    Shell => shells: ShellKey, ShellData, shell, shell_mut, insert_shell, shell_count;
    Face => faces: FaceKey, FaceData, face, face_mut, insert_face, face_count;
    Loop => loops: LoopKey, LoopData, loop_data, loop_mut, insert_loop, loop_count;
    Wire => wires: WireKey, WireData, wire, wire_mut, insert_wire, wire_count;
    Coedge => coedges: CoedgeKey, CoedgeData, coedge, coedge_mut, insert_coedge, coedge_count;
    Edge => edges: EdgeKey, EdgeData, edge, edge_mut, insert_edge, edge_count;
    Vertex => vertices: VertexKey, VertexData, vertex, vertex_mut, insert_vertex, vertex_count;
    Point => points: PointKey, Counted<Point3<f64>>, point, point_mut, insert_point, point_count;
    Curve => curves: CurveKey, Counted<Curve>, curve, curve_mut, insert_curve, curve_count;
    Pcurve => pcurves: PcurveKey, Counted<Pcurve>, pcurve, pcurve_mut, insert_pcurve, pcurve_count;
    Surface => surfaces: SurfaceKey, Counted<Surface>, surface, surface_mut, insert_surface, surface_count;
    Attrib => attribs: AttribKey, AttribData, attrib, attrib_mut, insert_attrib, attrib_count;
}

impl BrepArena {
    /// Creates a new, empty arena with default options.
    pub fn new() -> Self {
        Self::with_options(ModelingOptions::default())
    }

    pub fn options(&self) -> &ModelingOptions {
        &self.options
    }

    /// Absolute resolution of this model.
    pub fn resabs(&self) -> f64 {
        self.options.resabs
    }

    /// Starts a transaction. All changes go through it; dropping it without
    /// [`Transaction::commit`] rolls them back.
    pub fn begin(&mut self, name: impl Into<String>) -> Transaction<'_> {
        self.boxes.clear();
        Transaction::new(self, name.into())
    }

    /// Position of a vertex.
    pub fn vertex_position(&self, key: VertexKey) -> Option<Point3<f64>> {
        let v = self.vertices.get(key)?;
        self.points.get(v.point).map(|p| p.geometry)
    }

    /// Use count of a geometry entity; `None` for other entity types or
    /// dead keys.
    pub fn use_count(&self, key: EntityKey) -> Option<u32> {
        match key {
            EntityKey::Point(k) => self.points.get(k).map(|c| c.use_count),
            EntityKey::Curve(k) => self.curves.get(k).map(|c| c.use_count),
            EntityKey::Pcurve(k) => self.pcurves.get(k).map(|c| c.use_count),
            EntityKey::Surface(k) => self.surfaces.get(k).map(|c| c.use_count),
            _ => None,
        }
    }

    /// Curve geometry of an edge, if any.
    pub fn edge_curve(&self, key: EdgeKey) -> Option<&Curve> {
        let curve = self.edges.get(key)?.curve?;
        self.curves.get(curve).map(|c| &c.geometry)
    }

    /// Surface geometry of a face, if any.
    pub fn face_surface(&self, key: FaceKey) -> Option<&Surface> {
        let surface = self.faces.get(key)?.surface?;
        self.surfaces.get(surface).map(|c| &c.geometry)
    }

    /// Pcurve geometry of a coedge, if any.
    pub fn coedge_pcurve(&self, key: CoedgeKey) -> Option<&Pcurve> {
        let pcurve = self.coedges.get(key)?.pcurve?;
        self.pcurves.get(pcurve).map(|c| &c.geometry)
    }

    /// Modeling state of a tolerance-bearing entity.
    pub fn modeling(&self, key: EntityKey) -> Option<Modeling> {
        match key {
            EntityKey::Vertex(k) => self.vertices.get(k).map(|v| v.modeling),
            EntityKey::Edge(k) => self.edges.get(k).map(|e| e.modeling),
            EntityKey::Coedge(k) => self.coedges.get(k).map(|c| c.modeling),
            _ => None,
        }
    }
}

impl Default for BrepArena {
    fn default() -> Self {
        Self::new()
    }
}
