//! Entity identifiers and the entity store.
//!
//! Entities are identified by caller-supplied string ids. The store keeps
//! them in registration order, which is also the order the behavior pass
//! visits them in. Lookups are linear scans; game worlds hold at most a few
//! thousand entities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A caller-supplied, unique entity identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a string as an entity id. Emptiness is checked by
    /// [`EntityStore::create`], not here.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:?})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&EntityId> for EntityId {
    fn from(id: &EntityId) -> Self {
        id.clone()
    }
}

/// Handle of a body in the physics simulation.
///
/// Allocated by the physics engine. The engine side maps it back to the
/// owning entity, so neither side holds a reference to the other.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(u64);

impl BodyId {
    /// Construct from a raw value.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyId({})", self.0)
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Opaque handle of a visual asset owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle(pub u64);

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// Position and rotation of an entity in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    /// Rotation in radians.
    pub rotation: f64,
}

impl Transform {
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, rotation: 0.0 }
    }
}

/// Width and height, used for hit areas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// The entity side of the entity/body link.
///
/// `pose` mirrors the body's last simulated transform. The built-in sync
/// behavior copies it onto [`Entity::transform`] every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyLink {
    pub id: BodyId,
    pub pose: Transform,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A live game entity.
///
/// `kind` is the classification used by collision filtering and
/// [`EntityStore::get_by_type`]; an empty kind means "untyped" and never
/// matches a collision subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    pub kind: String,
    /// Visual transform. Overwritten from the body pose when a body is linked.
    pub transform: Transform,
    /// Explicit hit area; preferred over the visual bounds by sprite collision.
    pub hit_area: Option<Size>,
    body: Option<BodyLink>,
    asset: Option<AssetHandle>,
}

impl Entity {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            kind: String::new(),
            transform: Transform::default(),
            hit_area: None,
            body: None,
            asset: None,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Whether a physics body is linked to this entity.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&BodyLink> {
        self.body.as_ref()
    }

    pub fn body_id(&self) -> Option<BodyId> {
        self.body.map(|link| link.id)
    }

    pub fn asset(&self) -> Option<AssetHandle> {
        self.asset
    }

    /// Link a physics body, replacing any previous link. Returns the old link.
    pub fn link_body(&mut self, id: BodyId, pose: Transform) -> Option<BodyLink> {
        self.body.replace(BodyLink { id, pose })
    }

    /// Sever the body link. Returns the link that was removed.
    pub fn unlink_body(&mut self) -> Option<BodyLink> {
        self.body.take()
    }

    /// Record the latest simulated pose of the linked body. No-op without a body.
    pub fn set_body_pose(&mut self, pose: Transform) {
        if let Some(link) = self.body.as_mut() {
            link.pose = pose;
        }
    }

    /// Attach or clear the visual asset. Returns the previous handle.
    pub fn set_asset(&mut self, asset: Option<AssetHandle>) -> Option<AssetHandle> {
        std::mem::replace(&mut self.asset, asset)
    }
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Owns the live entities of one game world, in registration order.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an entity.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingId`] if `id` is empty.
    /// - [`CoreError::DuplicateId`] if an entity with `id` already exists.
    pub fn create(&mut self, id: impl Into<String>) -> Result<&mut Entity, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::MissingId);
        }
        if self.contains(&id) {
            return Err(CoreError::DuplicateId { id });
        }
        tracing::debug!(entity = %id, "entity created");
        self.entities.push(Entity::new(EntityId(id)));
        let last = self.entities.len() - 1;
        Ok(&mut self.entities[last])
    }

    /// Deregister an entity and hand it back.
    ///
    /// Removing an absent entity is a no-op and returns `None`. This only
    /// touches the store; body and asset teardown is the engine's job.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.id.as_str() == id)?;
        Some(self.entities.remove(index))
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id.as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id.as_str() == id)
    }

    /// All entities of the given kind, in registration order.
    pub fn get_by_type(&self, kind: &str) -> Vec<&Entity> {
        self.entities.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id.as_str() == id)
    }

    /// Iterate over all entities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    /// Snapshot of all ids in registration order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_registers_entity() {
        let mut store = EntityStore::new();
        let entity = store.create("hero").unwrap();
        assert_eq!(entity.id().as_str(), "hero");
        assert!(!entity.has_body());
        assert!(entity.asset().is_none());
        assert!(store.contains("hero"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut store = EntityStore::new();
        store.create("a").unwrap();
        let err = store.create("a").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { ref id } if id == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut store = EntityStore::new();
        assert!(matches!(store.create(""), Err(CoreError::MissingId)));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = EntityStore::new();
        store.create("a").unwrap();
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert!(store.remove("never-existed").is_none());
    }

    #[test]
    fn get_by_type_keeps_registration_order() {
        let mut store = EntityStore::new();
        for (id, kind) in [("e1", "enemy"), ("p", "player"), ("e2", "enemy"), ("e3", "enemy")] {
            store.create(id).unwrap().kind = kind.to_owned();
        }
        let enemies: Vec<&str> = store
            .get_by_type("enemy")
            .iter()
            .map(|e| e.id().as_str())
            .collect();
        assert_eq!(enemies, vec!["e1", "e2", "e3"]);
        assert!(store.get_by_type("neutral").is_empty());
    }

    #[test]
    fn id_can_be_reused_after_removal() {
        let mut store = EntityStore::new();
        store.create("a").unwrap();
        store.remove("a");
        assert!(store.create("a").is_ok());
    }

    #[test]
    fn body_link_round_trip() {
        let mut store = EntityStore::new();
        let entity = store.create("crate").unwrap();
        entity.link_body(BodyId::from_raw(7), Transform::at(1.0, 2.0));
        assert!(entity.has_body());
        assert_eq!(entity.body_id(), Some(BodyId::from_raw(7)));

        entity.set_body_pose(Transform::at(3.0, 4.0));
        assert_eq!(entity.body().unwrap().pose, Transform::at(3.0, 4.0));

        let link = entity.unlink_body().unwrap();
        assert_eq!(link.id, BodyId::from_raw(7));
        assert!(!entity.has_body());
    }

    #[test]
    fn set_body_pose_without_body_is_noop() {
        let mut store = EntityStore::new();
        let entity = store.create("ghost").unwrap();
        entity.set_body_pose(Transform::at(9.0, 9.0));
        assert!(entity.body().is_none());
    }

    #[test]
    fn display_formats() {
        assert_eq!(EntityId::new("x").to_string(), "x");
        assert_eq!(format!("{:?}", EntityId::new("x")), "EntityId(\"x\")");
        assert_eq!(BodyId::from_raw(3).to_string(), "body#3");
    }
}
