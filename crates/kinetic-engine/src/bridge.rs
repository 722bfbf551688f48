//! Links entities to physics bodies.
//!
//! The link is index based on both sides: the entity stores a
//! [`BodyLink`](kinetic_core::entity::BodyLink) with the body id, and the
//! bridge keeps the body id -> entity id map in [`BodyOwners`]. After each
//! simulation step the bridge writes every linked body's pose into its
//! entity's link; the built-in sync behavior then copies it onto the
//! entity's visual transform.

use std::collections::HashMap;

use kinetic_core::behavior::BehaviorSpec;
use kinetic_core::entity::{BodyId, Entity, EntityId, EntityStore};

use crate::physics::{BodyDesc, ContactEvent, PhysicsEngine};

/// Slot name of the behavior that mirrors body poses onto entity transforms.
pub const SYNC_SLOT: &str = "sync_with_body";

/// Body id -> owning entity id.
#[derive(Debug, Default, Clone)]
pub struct BodyOwners(HashMap<BodyId, EntityId>);

impl BodyOwners {
    pub fn get(&self, body: BodyId) -> Option<&EntityId> {
        self.0.get(&body)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Owns the physics engine and the body side of the entity/body link.
pub struct PhysicsBridge {
    engine: Box<dyn PhysicsEngine>,
    owners: BodyOwners,
}

impl PhysicsBridge {
    pub fn new(engine: Box<dyn PhysicsEngine>) -> Self {
        Self {
            engine,
            owners: BodyOwners::default(),
        }
    }

    /// Create a body for `entity` and link the two.
    ///
    /// A body the entity already had is removed from the simulation first.
    /// The description must have been validated.
    pub fn add_body(&mut self, entity: &mut Entity, desc: &BodyDesc) -> BodyId {
        if let Some(old) = entity.unlink_body() {
            self.remove_body(old.id);
        }
        let id = self.engine.insert_body(desc);
        let pose = self.engine.pose(id).unwrap_or(desc.position);
        entity.link_body(id, pose);
        self.owners.0.insert(id, entity.id().clone());
        tracing::debug!(entity = %entity.id(), body = %id, "body attached");
        id
    }

    /// Remove a body from the simulation and forget its owner.
    ///
    /// The entity's side of the link is left alone. Returns the former
    /// owner, if the body was linked.
    pub fn remove_body(&mut self, body: BodyId) -> Option<EntityId> {
        if !self.engine.remove_body(body) {
            tracing::warn!(body = %body, "tried to remove a body that is not simulated");
        }
        self.owners.0.remove(&body)
    }

    /// Step the simulation and publish the new poses to the linked entities.
    pub fn step(&mut self, dt: f64, entities: &mut EntityStore) -> Vec<ContactEvent> {
        let events = self.engine.step(dt);
        for entity in entities.iter_mut() {
            let Some(body) = entity.body_id() else {
                continue;
            };
            if let Some(pose) = self.engine.pose(body) {
                entity.set_body_pose(pose);
            }
        }
        events
    }

    pub fn owners(&self) -> &BodyOwners {
        &self.owners
    }

    pub fn entity_of(&self, body: BodyId) -> Option<&EntityId> {
        self.owners.get(body)
    }

    pub fn contains(&self, body: BodyId) -> bool {
        self.engine.contains(body)
    }

    pub fn body_count(&self) -> usize {
        self.engine.body_count()
    }

    pub fn engine(&self) -> &dyn PhysicsEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn PhysicsEngine {
        self.engine.as_mut()
    }
}

/// The behavior installed in [`SYNC_SLOT`] by `add_body`: copies the
/// linked body's last pose onto the entity transform.
pub fn sync_behavior() -> BehaviorSpec {
    BehaviorSpec::new().on_update(|ctx| {
        if let Some(entity) = ctx.entity_mut() {
            if let Some(pose) = entity.body().map(|link| link.pose) {
                entity.transform = pose;
            }
        }
        Ok(())
    })
}
