// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity key types for arena-based storage.
//!
//! Each entity gets a unique, type-safe key for O(1) lookup in the arena.
//! Keys are created by `slotmap::SlotMap` and are generation checked: a key
//! whose slot has been reclaimed never resolves to a different entity.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Key for a body (the root of a solid, sheet or wire model).
    pub struct BodyKey;

    /// Key for a lump (one connected region of a body).
    pub struct LumpKey;

    /// Key for a shell (connected set of faces bounding a lump).
    pub struct ShellKey;

    /// Key for a face (bounded portion of a surface).
    pub struct FaceKey;

    /// Key for a loop (cyclic or open sequence of coedges bounding a face).
    pub struct LoopKey;

    /// Key for a wire (chain of coedges not bounding any face).
    pub struct WireKey;

    /// Key for a coedge (directed use of an edge).
    pub struct CoedgeKey;

    /// Key for an edge (bounded portion of a curve).
    pub struct EdgeKey;

    /// Key for a vertex (end of one or more edges).
    pub struct VertexKey;

    /// Key for a use-counted point.
    pub struct PointKey;

    /// Key for a use-counted 3D curve.
    pub struct CurveKey;

    /// Key for a use-counted parameter-space curve.
    pub struct PcurveKey;

    /// Key for a use-counted surface.
    pub struct SurfaceKey;

    /// Key for an attribute attached to another entity.
    pub struct AttribKey;
}

macro_rules! entity_keys {
    ($($variant:ident($key:ident) => $name:literal),* $(,)?) => {
        /// A key that can reference any entity.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EntityKey {
            $($variant($key),)*
        }

        /// Discriminant for entity types, in top-down ownership order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EntityType {
            $($variant,)*
        }

        impl EntityKey {
            /// Returns the entity type of this key.
            pub fn entity_type(&self) -> EntityType {
                match self {
                    $(EntityKey::$variant(_) => EntityType::$variant,)*
                }
            }
        }

        impl EntityType {
            /// All entity types, in top-down ownership order.
            pub const ALL: &'static [EntityType] = &[$(EntityType::$variant,)*];

            /// Returns the lowercase type name used in saved files.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EntityType::$variant => $name,)*
                }
            }

            pub fn parse(token: &str) -> Option<EntityType> {
                match token {
                    $($name => Some(EntityType::$variant),)*
                    _ => None,
                }
            }
        }

        $(
            impl From<$key> for EntityKey {
                fn from(k: $key) -> Self {
                    EntityKey::$variant(k)
                }
            }

            impl TryFrom<EntityKey> for $key {
                type Error = EntityKey;

                fn try_from(key: EntityKey) -> std::result::Result<Self, EntityKey> {
                    match key {
                        EntityKey::$variant(k) => Ok(k),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

entity_keys! {
    Body(BodyKey) => "body",
    Lump(LumpKey) => "lump",
    Shell(ShellKey) => "shell",
    Face(FaceKey) => "face",
    Loop(LoopKey) => "loop",
    Wire(WireKey) => "wire",
    Coedge(CoedgeKey) => "coedge",
    Edge(EdgeKey) => "edge",
    Vertex(VertexKey) => "vertex",
    Point(PointKey) => "point",
    Curve(CurveKey) => "curve",
    Pcurve(PcurveKey) => "pcurve",
    Surface(SurfaceKey) => "surface",
    Attrib(AttribKey) => "attrib",
}

impl EntityType {
    /// Returns `true` for use-counted geometry.
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            EntityType::Point | EntityType::Curve | EntityType::Pcurve | EntityType::Surface
        )
    }

    /// Returns `true` for entities that may carry a tolerance.
    pub fn is_tolerance_bearing(&self) -> bool {
        matches!(
            self,
            EntityType::Vertex | EntityType::Edge | EntityType::Coedge
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn entity_type_names() {
        assert_eq!(EntityType::Body.as_str(), "body");
        assert_eq!(EntityType::Coedge.as_str(), "coedge");
        assert_eq!(EntityType::Attrib.to_string(), "attrib");
        assert_eq!(EntityType::parse("pcurve"), Some(EntityType::Pcurve));
        assert_eq!(EntityType::parse("cell"), None);
    }

    #[test]
    fn entity_type_ordering_is_top_down() {
        assert!(EntityType::Body < EntityType::Lump);
        assert!(EntityType::Face < EntityType::Loop);
        assert!(EntityType::Coedge < EntityType::Edge);
        assert!(EntityType::Edge < EntityType::Vertex);
        assert_eq!(EntityType::ALL.len(), 14);
    }

    #[test]
    fn key_conversion_keeps_type() {
        let mut map: SlotMap<EdgeKey, ()> = SlotMap::with_key();
        let ek = map.insert(());
        let key: EntityKey = ek.into();
        assert_eq!(key, EntityKey::Edge(ek));
        assert_eq!(key.entity_type(), EntityType::Edge);
        assert_eq!(EdgeKey::try_from(key), Ok(ek));
        assert_eq!(VertexKey::try_from(key), Err(key));
    }

    #[test]
    fn geometry_classification() {
        assert!(EntityType::Curve.is_geometry());
        assert!(!EntityType::Edge.is_geometry());
        assert!(EntityType::Vertex.is_tolerance_bearing());
        assert!(!EntityType::Face.is_tolerance_bearing());
    }
}
