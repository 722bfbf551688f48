//! Kinetic Core -- entity store and per-tick behavior scheduling.
//!
//! This crate holds the engine-independent state of a Kinetic game world:
//! the [`EntityStore`](entity::EntityStore) of live entities, the
//! [`BehaviorRegistry`](registry::BehaviorRegistry) that runs stateful
//! per-tick behaviors, the deferred [`Commands`](command::Commands) queue
//! hooks use to mutate those collections, and the geometry-only
//! [`SpriteCollisionDetector`](sprite::SpriteCollisionDetector).
//!
//! Physics, rendering and the real-time loop live in `kinetic-engine`.
//!
//! # Quick Start
//!
//! ```
//! use kinetic_core::prelude::*;
//!
//! let mut entities = EntityStore::new();
//! let mut behaviors = BehaviorRegistry::new();
//!
//! entities.create("player").unwrap().kind = "player".to_owned();
//!
//! behaviors.add_behavior(
//!     BehaviorSpec::new()
//!         .id("blink")
//!         .duration(3.0)
//!         .on_update(|ctx| {
//!             ctx.data["seen"] = serde_json::json!(ctx.counter());
//!             Ok(())
//!         }),
//! );
//!
//! let frame = FrameInfo::default();
//! behaviors
//!     .run_pass(&mut entities, 1.0 / 60.0, &frame, &mut CoreApplier)
//!     .unwrap();
//!
//! assert_eq!(behaviors.get_behavior("blink").unwrap().counter(), 1);
//! ```

#![deny(unsafe_code)]

pub mod behavior;
pub mod command;
pub mod entity;
pub mod registry;
pub mod sprite;
pub mod util;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity and behavior construction.
///
/// These abort the call that produced them. Recoverable situations (unknown
/// spec fields, removal of something already gone) are logged through
/// `tracing` instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity with this id is already registered.
    #[error("entity id {id:?} is already in use")]
    DuplicateId { id: String },

    /// An entity was created with an empty id.
    #[error("entities must be created with a unique, non-empty id")]
    MissingId,

    /// An entity slot behavior was declared without an update hook.
    #[error("behavior {behavior:?} is attached to an entity but has no on_update hook")]
    MissingUpdateHook { behavior: String },

    /// A behavior spec read from JSON could not be interpreted.
    #[error("invalid behavior spec: {reason}")]
    InvalidSpec { reason: String },
}

/// Which lifecycle hook of a behavior failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Init,
    Update,
    Complete,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::Init => f.write_str("on_init"),
            HookKind::Update => f.write_str("on_update"),
            HookKind::Complete => f.write_str("on_complete"),
        }
    }
}

/// A behavior hook returned an error during the per-tick pass.
///
/// The pass stops at the failing behavior; the remaining behaviors are
/// skipped for this tick only.
#[derive(Debug, thiserror::Error)]
#[error("behavior {behavior} failed in {hook}: {source}")]
pub struct BehaviorError {
    /// Id of the behavior whose hook failed.
    pub behavior: behavior::BehaviorId,
    /// The hook that failed.
    pub hook: HookKind,
    /// The error returned by the hook.
    #[source]
    pub source: anyhow::Error,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::behavior::{
        Behavior, BehaviorId, BehaviorSpec, FrameInfo, HookContext, HookResult,
    };
    pub use crate::command::{Command, CommandApplier, Commands, CoreApplier};
    pub use crate::entity::{
        AssetHandle, BodyId, BodyLink, Entity, EntityId, EntityStore, Size, Transform,
    };
    pub use crate::registry::{BehaviorRegistry, PassReport, DEBUG_BEHAVIOR_ID};
    pub use crate::sprite::{Hitbox, Rect, SpriteCollisionDetector};
    pub use crate::{BehaviorError, CoreError, HookKind};
}
