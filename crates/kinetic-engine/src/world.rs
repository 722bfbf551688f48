//! The game world facade.
//!
//! [`GameWorld`] owns one instance of every component: the entity store,
//! the behavior registry, the physics bridge, the collision router and the
//! renderer. Several worlds can coexist; nothing is process-global.
//!
//! One [`step`](GameWorld::step) runs, in order:
//!
//! 1. the physics step, publishing body poses to linked entities,
//! 2. collision dispatch, then the commands its callbacks queued,
//! 3. the behavior pass (sync behaviors copy poses onto transforms here),
//! 4. placing every visible sprite at its entity's transform.

use std::time::{Duration, Instant};

use kinetic_core::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bridge::{sync_behavior, PhysicsBridge, SYNC_SLOT};
use crate::collision::{CollisionContext, CollisionRouter, SubscriptionId};
use crate::physics::{BodyDesc, CollisionPhase, PhysicsEngine, RapierEngine};
use crate::render::{HeadlessRenderer, Renderer, SpriteOptions};
use crate::EngineError;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// World-level settings. Missing JSON fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity vector. Zero by default (top-down games).
    pub gravity: (f64, f64),
    /// Whether bodies are simulated. Sprite collision queries warn when set.
    pub physics: bool,
    /// Device pixels per world unit.
    pub scale: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: (0.0, 0.0),
            physics: true,
            scale: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// WorldStep
// ---------------------------------------------------------------------------

/// What happened during one [`GameWorld::step`].
#[derive(Debug)]
pub struct WorldStep {
    /// Contact events reported by the physics step.
    pub contacts: usize,
    /// Collision callbacks invoked.
    pub collision_callbacks: usize,
    /// The behavior pass result. A hook error skipped the rest of the pass.
    pub pass: Result<PassReport, BehaviorError>,
    pub physics_time: Duration,
    pub behavior_time: Duration,
    pub render_time: Duration,
}

// ---------------------------------------------------------------------------
// Engine command applier
// ---------------------------------------------------------------------------

/// Applies commands with access to physics and rendering.
struct EngineApplier<'a, R: Renderer> {
    physics: &'a mut PhysicsBridge,
    renderer: &'a mut R,
    stop_requested: &'a mut bool,
}

impl<R: Renderer> CommandApplier for EngineApplier<'_, R> {
    fn apply(&mut self, registry: &mut BehaviorRegistry, entities: &mut EntityStore, command: Command) {
        let Some(command) = registry.apply_command(entities, command) else {
            return;
        };
        match command {
            Command::DestroyEntity(id) => {
                destroy_entity(
                    entities,
                    registry,
                    &mut *self.physics,
                    &mut *self.renderer,
                    id.as_str(),
                );
            }
            Command::Stop => *self.stop_requested = true,
            other => tracing::warn!(command = ?other, "unhandled command"),
        }
    }
}

/// Deregister an entity and release everything it holds.
fn destroy_entity<R: Renderer>(
    entities: &mut EntityStore,
    behaviors: &mut BehaviorRegistry,
    physics: &mut PhysicsBridge,
    renderer: &mut R,
    id: &str,
) -> bool {
    let Some(mut entity) = entities.remove(id) else {
        tracing::warn!(entity = id, "tried to destroy non-existent entity");
        return false;
    };
    behaviors.remove_entity_behaviors(id);
    if let Some(asset) = entity.set_asset(None) {
        renderer.remove(asset);
    }
    if let Some(link) = entity.unlink_body() {
        physics.remove_body(link.id);
    }
    tracing::debug!(entity = id, "entity destroyed");
    true
}

// ---------------------------------------------------------------------------
// GameWorld
// ---------------------------------------------------------------------------

/// A self-contained game world.
pub struct GameWorld<R: Renderer = HeadlessRenderer> {
    config: WorldConfig,
    entities: EntityStore,
    behaviors: BehaviorRegistry,
    physics: PhysicsBridge,
    collisions: CollisionRouter,
    renderer: R,
    sprites: SpriteCollisionDetector,
    frame: FrameInfo,
    stop_requested: bool,
}

impl GameWorld<HeadlessRenderer> {
    /// A world rendering into a [`HeadlessRenderer`] with the world's scale.
    pub fn headless(config: WorldConfig) -> Self {
        let renderer = HeadlessRenderer::new(config.scale);
        Self::new(config, renderer)
    }
}

impl<R: Renderer> GameWorld<R> {
    /// A world simulated by rapier2d. See [`with_engine`](Self::with_engine)
    /// for how the sprite collision scale is chosen.
    pub fn new(config: WorldConfig, renderer: R) -> Self {
        let engine = RapierEngine::new(config.gravity.0, config.gravity.1);
        Self::with_engine(config, Box::new(engine), renderer)
    }

    /// A world driven by a custom physics engine.
    ///
    /// Sprite collision converts the renderer's device bounds back to world
    /// units. When the renderer reports its own scale, that scale wins over
    /// `config.scale`; a mismatch is logged.
    pub fn with_engine(config: WorldConfig, engine: Box<dyn PhysicsEngine>, renderer: R) -> Self {
        let scale = match renderer.device_scale() {
            Some(device) if device != config.scale => {
                tracing::warn!(
                    config_scale = config.scale,
                    renderer_scale = device,
                    "world scale differs from the renderer's; using the renderer's"
                );
                device
            }
            Some(device) => device,
            None => config.scale,
        };
        Self {
            sprites: SpriteCollisionDetector::new(scale),
            config,
            entities: EntityStore::new(),
            behaviors: BehaviorRegistry::new(),
            physics: PhysicsBridge::new(engine),
            collisions: CollisionRouter::new(),
            renderer,
            frame: FrameInfo::default(),
            stop_requested: false,
        }
    }

    // -- entities -----------------------------------------------------------

    /// Create and register an entity.
    ///
    /// # Errors
    ///
    /// [`CoreError::DuplicateId`] or [`CoreError::MissingId`], wrapped.
    pub fn create(&mut self, id: impl Into<String>) -> Result<&mut Entity, EngineError> {
        Ok(self.entities.create(id)?)
    }

    /// Destroy an entity: deregister it, remove its behaviors, release its
    /// sprite and remove its body. Destroying an unknown id only warns.
    pub fn destroy(&mut self, id: &str) -> bool {
        destroy_entity(
            &mut self.entities,
            &mut self.behaviors,
            &mut self.physics,
            &mut self.renderer,
            id,
        )
    }

    /// Destroy every entity.
    pub fn remove_all(&mut self) {
        for id in self.entities.ids() {
            self.destroy(id.as_str());
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.get_by_id(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn get_by_type(&self, kind: &str) -> Vec<&Entity> {
        self.entities.get_by_type(kind)
    }

    /// All entities in registration order.
    pub fn get_all(&self) -> Vec<&Entity> {
        self.entities.iter().collect()
    }

    // -- behaviors ----------------------------------------------------------

    pub fn add_behavior(&mut self, spec: BehaviorSpec) -> BehaviorId {
        self.behaviors.add_behavior(spec)
    }

    /// Attach a behavior to an entity slot. `Ok(None)` for an unknown entity.
    pub fn attach_behavior(
        &mut self,
        entity: &str,
        slot: &str,
        spec: BehaviorSpec,
    ) -> Result<Option<BehaviorId>, EngineError> {
        Ok(self.behaviors.attach_behavior(&self.entities, entity, slot, spec)?)
    }

    pub fn remove_behavior(&mut self, id: &str) -> Option<Behavior> {
        self.behaviors.remove_behavior(id)
    }

    // -- sprites ------------------------------------------------------------

    /// Give an entity a visible sprite, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownEntity`] if the entity does not exist.
    /// - [`EngineError::UnknownTexture`] if the renderer has no such texture.
    pub fn show_sprite(&mut self, id: &str, options: SpriteOptions) -> Result<AssetHandle, EngineError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownEntity { id: id.to_owned() })?;
        let handle = self
            .renderer
            .sprite(&options.texture, options.z_index)
            .ok_or_else(|| EngineError::UnknownTexture {
                texture: options.texture.clone(),
            })?;
        if let Some(old) = entity.set_asset(Some(handle)) {
            self.renderer.remove(old);
        }
        self.renderer.place(handle, &entity.transform);
        self.renderer.add(handle);
        Ok(handle)
    }

    /// Remove an entity's sprite. Returns `false` if it had none.
    pub fn hide_sprite(&mut self, id: &str) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            tracing::warn!(entity = id, "tried to hide the sprite of a non-existent entity");
            return false;
        };
        match entity.set_asset(None) {
            Some(asset) => {
                self.renderer.remove(asset);
                true
            }
            None => false,
        }
    }

    // -- physics ------------------------------------------------------------

    /// Give an entity a physics body and install the pose sync behavior.
    ///
    /// A body the entity already had is replaced.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownEntity`] if the entity does not exist.
    /// - [`EngineError::InvalidBody`] if the description is unusable or
    ///   physics is disabled for this world.
    pub fn add_body(&mut self, id: &str, desc: BodyDesc) -> Result<BodyId, EngineError> {
        if !self.config.physics {
            return Err(EngineError::InvalidBody {
                reason: "physics is disabled for this world".to_owned(),
            });
        }
        desc.validate()
            .map_err(|reason| EngineError::InvalidBody { reason })?;
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownEntity { id: id.to_owned() })?;

        let body = self.physics.add_body(entity, &desc);
        entity.transform = desc.position;
        self.behaviors
            .attach_behavior(&self.entities, id, SYNC_SLOT, sync_behavior())?;
        Ok(body)
    }

    /// Remove a body from the simulation.
    ///
    /// If the body belongs to an entity, that entity is unlinked and its
    /// sync behavior removed, so no entity is left pointing at a dead body.
    pub fn remove_body(&mut self, body: BodyId) -> bool {
        let simulated = self.physics.contains(body);
        let Some(owner) = self.physics.remove_body(body) else {
            return simulated;
        };
        if let Some(entity) = self.entities.get_mut(owner.as_str()) {
            if entity.body_id() == Some(body) {
                entity.unlink_body();
                let sync = BehaviorId::for_slot(&owner, SYNC_SLOT);
                if self.behaviors.contains(sync.as_str()) {
                    self.behaviors.remove_behavior(sync.as_str());
                }
            }
        }
        simulated
    }

    // -- collisions ---------------------------------------------------------

    /// Call `callback` for contacts between `source` and any of `targets`.
    pub fn add_collision<I, S>(
        &mut self,
        source: impl Into<String>,
        targets: I,
        phase: CollisionPhase,
        callback: impl FnMut(BodyId, BodyId, &mut CollisionContext<'_>) + 'static,
    ) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collisions.add_collision(source, targets, phase, callback)
    }

    pub fn remove_collision(&mut self, id: SubscriptionId) -> bool {
        self.collisions.remove_collision(id)
    }

    pub fn remove_all_collisions(&mut self) {
        self.collisions.remove_all_collisions();
    }

    /// Sprite overlap test for entities without bodies.
    ///
    /// Entities without a sprite never collide.
    pub fn is_colliding(&self, a: &str, b: &str) -> bool {
        self.warn_if_physics("is_colliding");
        match (self.hitbox(a), self.hitbox(b)) {
            (Some(a), Some(b)) => self.sprites.is_colliding(&a, &b),
            _ => false,
        }
    }

    /// Overlapping sprite area in world units, 0 when not colliding.
    pub fn overlapping_area(&self, a: &str, b: &str) -> f64 {
        self.warn_if_physics("overlapping_area");
        match (self.hitbox(a), self.hitbox(b)) {
            (Some(a), Some(b)) => self.sprites.overlapping_area(&a, &b),
            _ => 0.0,
        }
    }

    fn hitbox(&self, id: &str) -> Option<Hitbox> {
        let entity = self.entities.get_by_id(id)?;
        let bounds = self.renderer.display_bounds(entity.asset()?)?;
        Some(Hitbox {
            bounds,
            hit_area: entity.hit_area,
        })
    }

    fn warn_if_physics(&self, query: &str) {
        if self.config.physics {
            tracing::warn!(
                query,
                "sprite collision detection used while physics is enabled; use add_collision instead"
            );
        }
    }

    // -- frame --------------------------------------------------------------

    /// Run one frame with time step `dt` seconds.
    pub fn step(&mut self, dt: f64) -> WorldStep {
        let physics_start = Instant::now();
        let contacts = if self.config.physics {
            self.physics.step(dt, &mut self.entities)
        } else {
            Vec::new()
        };
        let physics_time = physics_start.elapsed();

        let behavior_start = Instant::now();
        let mut applier = EngineApplier {
            physics: &mut self.physics,
            renderer: &mut self.renderer,
            stop_requested: &mut self.stop_requested,
        };

        let mut commands = Commands::new();
        let collision_callbacks = if contacts.is_empty() {
            0
        } else {
            self.collisions
                .dispatch(&contacts, applier.physics.owners(), &mut self.entities, &mut commands)
        };
        for command in commands.drain() {
            applier.apply(&mut self.behaviors, &mut self.entities, command);
        }

        self.frame.behavior_count = self.behaviors.len();
        let pass = self
            .behaviors
            .run_pass(&mut self.entities, dt, &self.frame, &mut applier);
        let behavior_time = behavior_start.elapsed();

        let render_start = Instant::now();
        for entity in self.entities.iter() {
            if let Some(asset) = entity.asset() {
                self.renderer.place(asset, &entity.transform);
            }
        }
        let render_time = render_start.elapsed();

        self.frame.tick += 1;
        self.frame.last_pass_time = behavior_time;

        WorldStep {
            contacts: contacts.len(),
            collision_callbacks,
            pass,
            physics_time,
            behavior_time,
            render_time,
        }
    }

    /// Whether a hook asked to stop the loop. Clears the request.
    pub fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Number of frames stepped so far.
    pub fn tick(&self) -> u64 {
        self.frame.tick
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn behaviors_mut(&mut self) -> &mut BehaviorRegistry {
        &mut self.behaviors
    }

    pub fn physics(&self) -> &PhysicsBridge {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsBridge {
        &mut self.physics
    }

    pub fn collisions(&self) -> &CollisionRouter {
        &self.collisions
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
