//! Kinetic Engine -- physics, rendering and the frame loop around
//! [`kinetic_core`].
//!
//! A [`GameWorld`](world::GameWorld) owns the entity store, the behavior
//! registry, a [`PhysicsBridge`](bridge::PhysicsBridge) over rapier2d, the
//! [`CollisionRouter`](collision::CollisionRouter) and a
//! [`Renderer`](render::Renderer). The [`TickScheduler`](tick::TickScheduler)
//! drives it one frame at a time: physics step, collision dispatch, behavior
//! pass, then drawing.
//!
//! # Quick Start
//!
//! ```
//! use kinetic_engine::prelude::*;
//!
//! let renderer = HeadlessRenderer::default().with_texture("ball", 1.0, 1.0);
//! let world = GameWorld::new(WorldConfig::default(), renderer);
//! let config = TickConfig { headless: true, ..Default::default() };
//! let mut scheduler = TickScheduler::new(world, config);
//!
//! let world = scheduler.world_mut();
//! world.create("ball").unwrap().kind = "ball".to_owned();
//! world
//!     .add_body("ball", BodyDesc::dynamic(BodyShape::Circle { radius: 0.5 }).velocity(6.0, 0.0))
//!     .unwrap();
//! world.show_sprite("ball", SpriteOptions::new("ball")).unwrap();
//!
//! scheduler.run_ticks(60);
//! assert_eq!(scheduler.tick_count(), 60);
//! assert!(scheduler.world().get_by_id("ball").unwrap().transform.x > 5.0);
//! ```

#![deny(unsafe_code)]

pub mod bridge;
pub mod collision;
pub mod physics;
pub mod render;
pub mod tick;
pub mod world;

/// Re-export the core crate for convenience.
pub use kinetic_core;

use kinetic_core::CoreError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by [`GameWorld`](world::GameWorld) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The renderer has no texture with this id.
    #[error("unknown texture {texture:?}")]
    UnknownTexture { texture: String },

    /// No entity is registered under this id.
    #[error("unknown entity {id:?}")]
    UnknownEntity { id: String },

    /// A body description cannot be simulated.
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use kinetic_core::prelude::*;

    pub use crate::bridge::{sync_behavior, BodyOwners, PhysicsBridge, SYNC_SLOT};
    pub use crate::collision::{CollisionContext, CollisionRouter, SubscriptionId};
    pub use crate::physics::{
        BodyDesc, BodyKind, BodyShape, CollisionPhase, ContactEvent, PhysicsEngine, RapierEngine,
    };
    pub use crate::render::{HeadlessRenderer, Renderer, SpriteOptions, SpriteState};
    pub use crate::tick::{FrameReport, TickConfig, TickDiagnostics, TickScheduler};
    pub use crate::world::{GameWorld, WorldConfig, WorldStep};
    pub use crate::EngineError;
}
