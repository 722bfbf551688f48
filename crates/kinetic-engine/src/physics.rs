//! Physics engine seam and its rapier2d implementation.
//!
//! The runtime talks to physics only through [`PhysicsEngine`]. Bodies are
//! described by a [`BodyDesc`], identified by a [`BodyId`] the engine
//! allocates, and report their contacts each step as [`ContactEvent`]s in
//! three phases:
//!
//! - [`CollisionPhase::Start`]: the pair began touching during this step.
//! - [`CollisionPhase::Active`]: the pair touched before this step and still does.
//! - [`CollisionPhase::End`]: the pair stopped touching during this step.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Body ids are allocated
//! sequentially and every event list is sorted by body pair, so two runs with
//! the same inputs report identical events in identical order.

use std::collections::{BTreeMap, HashMap};

use kinetic_core::entity::{BodyId, Transform};
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Body description
// ---------------------------------------------------------------------------

/// How the solver treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Fully simulated (balls, crates).
    Dynamic,
    /// Moved by game logic through its velocity (paddles, platforms).
    Kinematic,
    /// Immovable (walls).
    Static,
}

/// Collider shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    /// Box given by its half extents.
    Box { half_width: f64, half_height: f64 },
    Circle { radius: f64 },
}

/// Everything needed to create a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub shape: BodyShape,
    /// Initial position and rotation.
    pub position: Transform,
    /// Initial linear velocity. Ignored for static bodies.
    pub velocity: (f64, f64),
    /// Bounciness; 0 absorbs, 1 keeps all energy.
    pub restitution: f64,
    /// Sensors report contacts without a physical response.
    pub sensor: bool,
}

impl BodyDesc {
    pub fn new(kind: BodyKind, shape: BodyShape) -> Self {
        Self {
            kind,
            shape,
            position: Transform::default(),
            velocity: (0.0, 0.0),
            restitution: 0.0,
            sensor: false,
        }
    }

    pub fn dynamic(shape: BodyShape) -> Self {
        Self::new(BodyKind::Dynamic, shape)
    }

    pub fn kinematic(shape: BodyShape) -> Self {
        Self::new(BodyKind::Kinematic, shape)
    }

    pub fn fixed(shape: BodyShape) -> Self {
        Self::new(BodyKind::Static, shape)
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position.x = x;
        self.position.y = y;
        self
    }

    pub fn rotation(mut self, radians: f64) -> Self {
        self.position.rotation = radians;
        self
    }

    pub fn velocity(mut self, dx: f64, dy: f64) -> Self {
        self.velocity = (dx, dy);
        self
    }

    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    /// Check the description for values the solver cannot handle.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            self.position.x,
            self.position.y,
            self.position.rotation,
            self.velocity.0,
            self.velocity.1,
            self.restitution,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err("position, velocity and restitution must be finite".to_owned());
        }
        if self.restitution < 0.0 {
            return Err(format!("restitution must not be negative, got {}", self.restitution));
        }
        match self.shape {
            BodyShape::Box {
                half_width,
                half_height,
            } if !(half_width > 0.0 && half_height > 0.0)
                || !half_width.is_finite()
                || !half_height.is_finite() =>
            {
                Err(format!(
                    "box half extents must be positive, got {half_width}x{half_height}"
                ))
            }
            BodyShape::Circle { radius } if !(radius > 0.0) || !radius.is_finite() => {
                Err(format!("circle radius must be positive, got {radius}"))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Contact events
// ---------------------------------------------------------------------------

/// Contact lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollisionPhase {
    Start,
    Active,
    End,
}

/// A pair of bodies in contact, in the order the simulation reported them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub phase: CollisionPhase,
    pub body_a: BodyId,
    pub body_b: BodyId,
}

impl ContactEvent {
    /// Whether `body` is one of the two bodies.
    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    fn sort_key(&self) -> (CollisionPhase, u64, u64) {
        let (a, b) = (self.body_a.to_raw(), self.body_b.to_raw());
        (self.phase, a.min(b), a.max(b))
    }
}

// ---------------------------------------------------------------------------
// PhysicsEngine
// ---------------------------------------------------------------------------

/// The simulation the runtime drives.
pub trait PhysicsEngine {
    /// Create a body. The description has already been validated.
    fn insert_body(&mut self, desc: &BodyDesc) -> BodyId;

    /// Remove a body. Returns `false` if it was not present.
    fn remove_body(&mut self, body: BodyId) -> bool;

    fn contains(&self, body: BodyId) -> bool;

    /// Advance the simulation by `dt` seconds and report contacts.
    fn step(&mut self, dt: f64) -> Vec<ContactEvent>;

    /// Current position and rotation of a body.
    fn pose(&self, body: BodyId) -> Option<Transform>;

    /// Set the linear velocity. Returns `false` for unknown bodies.
    fn set_velocity(&mut self, body: BodyId, dx: f64, dy: f64) -> bool;

    fn velocity(&self, body: BodyId) -> Option<(f64, f64)>;

    /// Teleport a body. Returns `false` for unknown bodies.
    fn set_pose(&mut self, body: BodyId, pose: &Transform) -> bool;

    fn body_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// RapierEngine
// ---------------------------------------------------------------------------

/// [`PhysicsEngine`] backed by rapier2d.
pub struct RapierEngine {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    next_body: u64,
    bodies: BTreeMap<BodyId, RigidBodyHandle>,
    collider_to_body: HashMap<ColliderHandle, BodyId>,
    /// Pairs currently touching, keyed by (min, max) raw id, holding the
    /// order in which the simulation first reported them.
    touching: BTreeMap<(u64, u64), (BodyId, BodyId)>,
}

impl RapierEngine {
    pub fn new(gravity_x: f64, gravity_y: f64) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity_x as Real, gravity_y as Real],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            next_body: 0,
            bodies: BTreeMap::new(),
            collider_to_body: HashMap::new(),
            touching: BTreeMap::new(),
        }
    }

    /// Top-down world without gravity.
    pub fn new_zero_gravity() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Number of pairs currently in contact.
    pub fn touching_pairs(&self) -> usize {
        self.touching.len()
    }
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::new_zero_gravity()
    }
}

fn pair_key(a: BodyId, b: BodyId) -> (u64, u64) {
    let (a, b) = (a.to_raw(), b.to_raw());
    (a.min(b), a.max(b))
}

impl PhysicsEngine for RapierEngine {
    fn insert_body(&mut self, desc: &BodyDesc) -> BodyId {
        let translation = vector![desc.position.x as Real, desc.position.y as Real];
        let rotation = desc.position.rotation as Real;
        let linvel = vector![desc.velocity.0 as Real, desc.velocity.1 as Real];
        let rb = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .translation(translation)
                .rotation(rotation)
                .linvel(linvel)
                .build(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based()
                .translation(translation)
                .rotation(rotation)
                .linvel(linvel)
                .build(),
            BodyKind::Static => RigidBodyBuilder::fixed()
                .translation(translation)
                .rotation(rotation)
                .build(),
        };
        let body_handle = self.rigid_body_set.insert(rb);

        let shape = match desc.shape {
            BodyShape::Box {
                half_width,
                half_height,
            } => SharedShape::cuboid(half_width as Real, half_height as Real),
            BodyShape::Circle { radius } => SharedShape::ball(radius as Real),
        };
        let collider = ColliderBuilder::new(shape)
            .restitution(desc.restitution as Real)
            .sensor(desc.sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_collision_types(ActiveCollisionTypes::all())
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);

        self.next_body += 1;
        let id = BodyId::from_raw(self.next_body);
        self.bodies.insert(id, body_handle);
        self.collider_to_body.insert(collider_handle, id);
        id
    }

    fn remove_body(&mut self, body: BodyId) -> bool {
        let Some(handle) = self.bodies.remove(&body) else {
            return false;
        };
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.collider_to_body.retain(|_, owner| *owner != body);
        self.touching.retain(|_, (a, b)| *a != body && *b != body);
        true
    }

    fn contains(&self, body: BodyId) -> bool {
        self.bodies.contains_key(&body)
    }

    fn step(&mut self, dt: f64) -> Vec<ContactEvent> {
        self.integration_params.dt = dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let previously_touching: Vec<(u64, u64)> = self.touching.keys().copied().collect();
        let mut events = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (h1, h2) = (event.collider1(), event.collider2());
            let (Some(&a), Some(&b)) = (self.collider_to_body.get(&h1), self.collider_to_body.get(&h2))
            else {
                continue;
            };
            let key = pair_key(a, b);
            match event {
                CollisionEvent::Started(..) => {
                    if self.touching.insert(key, (a, b)).is_none() {
                        events.push(ContactEvent {
                            phase: CollisionPhase::Start,
                            body_a: a,
                            body_b: b,
                        });
                    }
                }
                CollisionEvent::Stopped(..) => {
                    if self.touching.remove(&key).is_some() {
                        events.push(ContactEvent {
                            phase: CollisionPhase::End,
                            body_a: a,
                            body_b: b,
                        });
                    }
                }
            }
        }

        for key in previously_touching {
            if let Some(&(a, b)) = self.touching.get(&key) {
                events.push(ContactEvent {
                    phase: CollisionPhase::Active,
                    body_a: a,
                    body_b: b,
                });
            }
        }

        events.sort_by_key(ContactEvent::sort_key);
        events
    }

    fn pose(&self, body: BodyId) -> Option<Transform> {
        let rb = self.rigid_body_set.get(*self.bodies.get(&body)?)?;
        let translation = rb.translation();
        Some(Transform {
            x: translation.x as f64,
            y: translation.y as f64,
            rotation: rb.rotation().angle() as f64,
        })
    }

    fn set_velocity(&mut self, body: BodyId, dx: f64, dy: f64) -> bool {
        let Some(&handle) = self.bodies.get(&body) else {
            return false;
        };
        match self.rigid_body_set.get_mut(handle) {
            Some(rb) => {
                rb.set_linvel(vector![dx as Real, dy as Real], true);
                true
            }
            None => false,
        }
    }

    fn velocity(&self, body: BodyId) -> Option<(f64, f64)> {
        let rb = self.rigid_body_set.get(*self.bodies.get(&body)?)?;
        let linvel = rb.linvel();
        Some((linvel.x as f64, linvel.y as f64))
    }

    fn set_pose(&mut self, body: BodyId, pose: &Transform) -> bool {
        let Some(&handle) = self.bodies.get(&body) else {
            return false;
        };
        match self.rigid_body_set.get_mut(handle) {
            Some(rb) => {
                rb.set_translation(vector![pose.x as Real, pose.y as Real], true);
                rb.set_rotation(Rotation::new(pose.rotation as Real), true);
                true
            }
            None => false,
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
