// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attributes: typed side data attached to entities.
//!
//! Attributes are entities in their own right, so they are rolled back with
//! everything else. Topology edits notify them through the four hooks of
//! [`Attribute`]; each hook answers with an [`AttribAction`] that the
//! transaction then applies.

use nalgebra::Similarity3;
use serde::{Deserialize, Serialize};

use crate::arena::BrepArena;
use crate::error::{Error, Result};
use crate::keys::*;
use crate::transaction::Transaction;

/// A typed value stored in a generic attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DictValue {
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<DictValue>),
}

/// What the transaction should do with an attribute after a hook ran.
#[derive(Debug, Clone, PartialEq)]
pub enum AttribAction {
    /// Leave the attribute where it is.
    Keep,
    /// Attach a new attribute with this payload to the other entity.
    Copy(AttributeKind),
    /// Re-own the attribute to the other entity.
    Move,
    /// Delete the attribute.
    Lose,
}

/// Notification hooks invoked by topology edits.
pub trait Attribute {
    /// The owner is being split; `new_entity` is the newly created half.
    fn split_owner(&mut self, new_entity: EntityKey) -> AttribAction {
        let _ = new_entity;
        AttribAction::Keep
    }

    /// The owner is being merged with `other`. When `deleting_owner` is set
    /// the owner is about to be lost.
    fn merge_owner(&mut self, other: EntityKey, deleting_owner: bool) -> AttribAction {
        let _ = other;
        if deleting_owner {
            AttribAction::Lose
        } else {
            AttribAction::Keep
        }
    }

    /// The owner is being transformed.
    fn trans_owner(&mut self, transform: &Similarity3<f64>) -> AttribAction {
        let _ = transform;
        AttribAction::Keep
    }

    /// A referenced member is being lost.
    fn member_lost(&mut self, member: EntityKey) -> AttribAction {
        let _ = member;
        AttribAction::Keep
    }

    /// Entities referenced besides the owner.
    fn members(&self) -> Vec<EntityKey> {
        Vec::new()
    }
}

/// A named value.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericAttrib {
    pub name: String,
    pub value: DictValue,
}

impl Attribute for GenericAttrib {
    fn split_owner(&mut self, _new_entity: EntityKey) -> AttribAction {
        AttribAction::Copy(AttributeKind::Generic(self.clone()))
    }

    fn merge_owner(&mut self, _other: EntityKey, deleting_owner: bool) -> AttribAction {
        if deleting_owner {
            AttribAction::Move
        } else {
            AttribAction::Keep
        }
    }
}

/// Records a repair: the gap that was closed and the tolerance before it.
#[derive(Debug, Clone, PartialEq)]
pub struct HealingAttrib {
    pub gap: f64,
    pub original_tolerance: Option<f64>,
    pub note: String,
}

impl Attribute for HealingAttrib {
    fn split_owner(&mut self, _new_entity: EntityKey) -> AttribAction {
        AttribAction::Copy(AttributeKind::Healing(self.clone()))
    }

    fn merge_owner(&mut self, _other: EntityKey, deleting_owner: bool) -> AttribAction {
        if deleting_owner {
            AttribAction::Move
        } else {
            AttribAction::Keep
        }
    }

    fn trans_owner(&mut self, transform: &Similarity3<f64>) -> AttribAction {
        let s = transform.scaling();
        self.gap *= s;
        if let Some(t) = self.original_tolerance.as_mut() {
            *t *= s;
        }
        AttribAction::Keep
    }
}

/// Marks an edge or vertex for blending with the given radius.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendAttrib {
    pub radius: f64,
}

impl Attribute for BlendAttrib {
    fn split_owner(&mut self, _new_entity: EntityKey) -> AttribAction {
        AttribAction::Copy(AttributeKind::Blend(self.clone()))
    }

    fn trans_owner(&mut self, transform: &Similarity3<f64>) -> AttribAction {
        self.radius *= transform.scaling();
        AttribAction::Keep
    }
}

/// Operation an annotation records provenance for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationKind {
    Sweep,
    Skin,
    Loft,
}

impl AnnotationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Sweep => "sweep",
            AnnotationKind::Skin => "skin",
            AnnotationKind::Loft => "loft",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "sweep" => Some(AnnotationKind::Sweep),
            "skin" => Some(AnnotationKind::Skin),
            "loft" => Some(AnnotationKind::Loft),
            _ => None,
        }
    }
}

/// Provenance of a modeling operation: which entities went in and which
/// came out.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub inputs: Vec<Option<EntityKey>>,
    pub outputs: Vec<Option<EntityKey>>,
}

impl Annotation {
    /// Returns `true` when every reference has been nulled.
    pub fn is_empty(&self) -> bool {
        self.inputs.iter().chain(&self.outputs).all(Option::is_none)
    }
}

impl Attribute for Annotation {
    fn split_owner(&mut self, new_entity: EntityKey) -> AttribAction {
        self.outputs.push(Some(new_entity));
        AttribAction::Keep
    }

    fn merge_owner(&mut self, _other: EntityKey, deleting_owner: bool) -> AttribAction {
        if deleting_owner {
            AttribAction::Move
        } else {
            AttribAction::Keep
        }
    }

    fn member_lost(&mut self, member: EntityKey) -> AttribAction {
        for slot in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            if *slot == Some(member) {
                *slot = None;
            }
        }
        if self.is_empty() {
            AttribAction::Lose
        } else {
            AttribAction::Keep
        }
    }

    fn members(&self) -> Vec<EntityKey> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .flatten()
            .copied()
            .collect()
    }
}

/// Closed set of attribute payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Generic(GenericAttrib),
    Healing(HealingAttrib),
    Blend(BlendAttrib),
    Annotation(Annotation),
}

impl AttributeKind {
    fn hooks(&mut self) -> &mut dyn Attribute {
        match self {
            AttributeKind::Generic(a) => a,
            AttributeKind::Healing(a) => a,
            AttributeKind::Blend(a) => a,
            AttributeKind::Annotation(a) => a,
        }
    }

    /// Type token used in saved files.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeKind::Generic(_) => "generic",
            AttributeKind::Healing(_) => "healing",
            AttributeKind::Blend(_) => "blend",
            AttributeKind::Annotation(_) => "annotation",
        }
    }
}

impl Attribute for AttributeKind {
    fn split_owner(&mut self, new_entity: EntityKey) -> AttribAction {
        self.hooks().split_owner(new_entity)
    }

    fn merge_owner(&mut self, other: EntityKey, deleting_owner: bool) -> AttribAction {
        self.hooks().merge_owner(other, deleting_owner)
    }

    fn trans_owner(&mut self, transform: &Similarity3<f64>) -> AttribAction {
        self.hooks().trans_owner(transform)
    }

    fn member_lost(&mut self, member: EntityKey) -> AttribAction {
        self.hooks().member_lost(member)
    }

    fn members(&self) -> Vec<EntityKey> {
        match self {
            AttributeKind::Annotation(a) => a.members(),
            _ => Vec::new(),
        }
    }
}

/// An attribute record: the owning entity plus the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttribData {
    pub owner: EntityKey,
    pub kind: AttributeKind,
}

impl BrepArena {
    /// Attributes owned by `owner`, in slot order.
    pub fn attributes_of(&self, owner: impl Into<EntityKey>) -> Vec<AttribKey> {
        let owner = owner.into();
        self.attribs
            .iter()
            .filter(|(_, a)| a.owner == owner)
            .map(|(k, _)| k)
            .collect()
    }

    /// First attribute of `owner` whose payload satisfies `pred`.
    pub fn find_attribute(
        &self,
        owner: impl Into<EntityKey>,
        pred: impl Fn(&AttributeKind) -> bool,
    ) -> Option<AttribKey> {
        let owner = owner.into();
        self.attribs
            .iter()
            .find(|(_, a)| a.owner == owner && pred(&a.kind))
            .map(|(k, _)| k)
    }

    /// Attributes that reference `member` other than as owner.
    pub fn attributes_referencing(&self, member: EntityKey) -> Vec<AttribKey> {
        self.attribs
            .iter()
            .filter(|(_, a)| a.kind.members().contains(&member))
            .map(|(k, _)| k)
            .collect()
    }
}

impl Transaction<'_> {
    /// Attaches a new attribute to `owner`.
    pub fn add_attribute(
        &mut self,
        owner: impl Into<EntityKey>,
        kind: AttributeKind,
    ) -> Result<AttribKey> {
        let owner = owner.into();
        if owner.entity_type() == EntityType::Attrib {
            return Err(Error::WrongType(owner));
        }
        if !self.contains(owner) {
            return Err(Error::NotFound(owner));
        }
        Ok(self.insert_attrib(AttribData { owner, kind }))
    }

    fn apply_action(&mut self, key: AttribKey, action: AttribAction, other: EntityKey) -> Result<()> {
        match action {
            AttribAction::Keep => Ok(()),
            AttribAction::Copy(kind) => self.add_attribute(other, kind).map(|_| ()),
            AttribAction::Move => {
                self.attrib_mut(key)?.owner = other;
                Ok(())
            }
            AttribAction::Lose => self.lose(key),
        }
    }

    /// Runs `split_owner` on every attribute of `owner`.
    pub(crate) fn split_attributes(&mut self, owner: EntityKey, new_entity: EntityKey) -> Result<()> {
        for key in self.attributes_of(owner) {
            let action = self.attrib_mut(key)?.kind.split_owner(new_entity);
            self.apply_action(key, action, new_entity)?;
        }
        Ok(())
    }

    /// Runs `merge_owner` on both sides before `absorbed` is lost.
    pub(crate) fn merge_attributes(&mut self, kept: EntityKey, absorbed: EntityKey) -> Result<()> {
        for key in self.attributes_of(absorbed) {
            let action = self.attrib_mut(key)?.kind.merge_owner(kept, true);
            self.apply_action(key, action, kept)?;
        }
        for key in self.attributes_of(kept) {
            let action = self.attrib_mut(key)?.kind.merge_owner(absorbed, false);
            if let AttribAction::Lose = action {
                self.lose(key)?;
            }
        }
        Ok(())
    }

    /// Runs `trans_owner` on every attribute owned by one of `owners`.
    pub(crate) fn transform_attributes(
        &mut self,
        owners: &rustc_hash::FxHashSet<EntityKey>,
        transform: &Similarity3<f64>,
    ) -> Result<()> {
        let keys: Vec<AttribKey> = self
            .attribs
            .iter()
            .filter(|(_, a)| owners.contains(&a.owner))
            .map(|(k, _)| k)
            .collect();
        for key in keys {
            let action = self.attrib_mut(key)?.kind.trans_owner(transform);
            if let AttribAction::Lose = action {
                self.lose(key)?;
            }
        }
        Ok(())
    }

    /// Runs `member_lost` on every attribute referencing `member`.
    pub(crate) fn notify_member_lost(&mut self, member: EntityKey) -> Result<()> {
        for key in self.attributes_referencing(member) {
            if !self.contains(key.into()) {
                continue;
            }
            let action = self.attrib_mut(key)?.kind.member_lost(member);
            if let AttribAction::Lose = action {
                self.lose(key)?;
            }
        }
        Ok(())
    }

    /// Loses every attribute owned by `owner`.
    pub(crate) fn lose_owned_attributes(&mut self, owner: EntityKey) -> Result<()> {
        for key in self.attributes_of(owner) {
            self.lose(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrepArena;
    use nalgebra::{Point3, Translation3, UnitQuaternion};

    fn scale(s: f64) -> Similarity3<f64> {
        Similarity3::from_parts(Translation3::identity(), UnitQuaternion::identity(), s)
    }

    #[test]
    fn generic_attribute_attaches_and_rolls_back() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("vertex");
        let v = tx.make_vertex(Point3::origin()).unwrap();
        tx.commit();

        let mut tx = arena.begin("tag");
        let a = tx
            .add_attribute(
                v,
                AttributeKind::Generic(GenericAttrib {
                    name: "id".into(),
                    value: DictValue::Int(42),
                }),
            )
            .unwrap();
        tx.commit();
        assert_eq!(arena.attributes_of(v), vec![a]);

        arena.undo().unwrap();
        assert!(arena.attributes_of(v).is_empty());
        arena.redo().unwrap();
        assert_eq!(arena.attrib(a).unwrap().owner, EntityKey::Vertex(v));
    }

    #[test]
    fn attributes_cannot_own_attributes() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("nested");
        let v = tx.make_vertex(Point3::origin()).unwrap();
        let a = tx
            .add_attribute(v, AttributeKind::Blend(BlendAttrib { radius: 1.0 }))
            .unwrap();
        let err = tx
            .add_attribute(a, AttributeKind::Blend(BlendAttrib { radius: 1.0 }))
            .unwrap_err();
        assert!(matches!(err, Error::WrongType(_)));
    }

    #[test]
    fn hooks_follow_kind_policies() {
        let mut blend = AttributeKind::Blend(BlendAttrib { radius: 2.0 });
        assert_eq!(blend.trans_owner(&scale(3.0)), AttribAction::Keep);
        assert_eq!(blend, AttributeKind::Blend(BlendAttrib { radius: 6.0 }));

        let dummy = EntityKey::Attrib(AttribKey::default());
        assert_eq!(blend.merge_owner(dummy, true), AttribAction::Lose);
        assert!(matches!(blend.split_owner(dummy), AttribAction::Copy(_)));

        let mut healing = AttributeKind::Healing(HealingAttrib {
            gap: 0.01,
            original_tolerance: None,
            note: String::new(),
        });
        assert_eq!(healing.merge_owner(dummy, true), AttribAction::Move);
        assert_eq!(healing.merge_owner(dummy, false), AttribAction::Keep);
    }

    #[test]
    fn annotation_loses_itself_when_empty() {
        let mut arena = BrepArena::new();
        let mut tx = arena.begin("sweep");
        let a = tx.make_vertex(Point3::origin()).unwrap();
        let b = tx.make_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let owner = tx.make_vertex(Point3::new(2.0, 0.0, 0.0)).unwrap();
        let note = tx
            .add_attribute(
                owner,
                AttributeKind::Annotation(Annotation {
                    kind: AnnotationKind::Sweep,
                    inputs: vec![Some(a.into())],
                    outputs: vec![Some(b.into())],
                }),
            )
            .unwrap();

        tx.lose(a).unwrap();
        match &tx.attrib(note).unwrap().kind {
            AttributeKind::Annotation(ann) => {
                assert_eq!(ann.inputs, vec![None]);
                assert_eq!(ann.outputs, vec![Some(EntityKey::Vertex(b))]);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        tx.lose(b).unwrap();
        assert!(tx.attrib(note).is_none());
        tx.commit();
    }
}
