//! Deferred mutations queued by hooks and collision callbacks.
//!
//! A hook cannot remove behaviors or destroy entities while the registry is
//! in the middle of running it. Instead it records a [`Command`] in its
//! [`Commands`] queue. The registry drains the queue after the behavior's
//! step and hands each command to a [`CommandApplier`]:
//!
//! - behavior commands are applied by the registry itself,
//! - entity destruction and loop control need the engine (physics bodies,
//!   render assets), so the engine supplies its own applier.
//!
//! [`CoreApplier`] is the applier for worlds without an engine attached.

use crate::behavior::{BehaviorId, BehaviorSpec};
use crate::entity::{EntityId, EntityStore};
use crate::registry::BehaviorRegistry;

/// A single deferred mutation.
#[derive(Debug)]
pub enum Command {
    AddBehavior(BehaviorSpec),
    AttachBehavior {
        entity: EntityId,
        slot: String,
        spec: BehaviorSpec,
    },
    RemoveBehavior(BehaviorId),
    ResetBehavior(BehaviorId),
    SetEnabled(BehaviorId, bool),
    DestroyEntity(EntityId),
    /// Stop the real-time loop at the end of the current frame.
    Stop,
}

/// FIFO queue of [`Command`]s.
#[derive(Debug, Default)]
pub struct Commands {
    queue: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.queue.push(command);
    }

    pub fn add_behavior(&mut self, spec: BehaviorSpec) {
        self.push(Command::AddBehavior(spec));
    }

    pub fn attach_behavior(&mut self, entity: &EntityId, slot: &str, spec: BehaviorSpec) {
        self.push(Command::AttachBehavior {
            entity: entity.clone(),
            slot: slot.to_owned(),
            spec,
        });
    }

    pub fn remove_behavior(&mut self, id: impl Into<BehaviorId>) {
        self.push(Command::RemoveBehavior(id.into()));
    }

    pub fn reset_behavior(&mut self, id: impl Into<BehaviorId>) {
        self.push(Command::ResetBehavior(id.into()));
    }

    pub fn set_enabled(&mut self, id: impl Into<BehaviorId>, enabled: bool) {
        self.push(Command::SetEnabled(id.into(), enabled));
    }

    pub fn destroy_entity(&mut self, id: impl Into<EntityId>) {
        self.push(Command::DestroyEntity(id.into()));
    }

    pub fn stop(&mut self) {
        self.push(Command::Stop);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove and return every queued command in FIFO order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Command> {
        self.queue.drain(..)
    }
}

/// Applies commands drained from a [`Commands`] queue.
pub trait CommandApplier {
    fn apply(&mut self, registry: &mut BehaviorRegistry, entities: &mut EntityStore, command: Command);
}

/// Applier for a registry and store without physics or rendering.
///
/// Entity destruction removes the entity's behaviors and deregisters it.
/// [`Command::Stop`] has no loop to stop and is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreApplier;

impl CommandApplier for CoreApplier {
    fn apply(&mut self, registry: &mut BehaviorRegistry, entities: &mut EntityStore, command: Command) {
        let Some(command) = registry.apply_command(entities, command) else {
            return;
        };
        match command {
            Command::DestroyEntity(id) => {
                registry.remove_entity_behaviors(id.as_str());
                if entities.remove(id.as_str()).is_none() {
                    tracing::warn!(entity = %id, "tried to destroy non-existent entity");
                }
            }
            Command::Stop => {
                tracing::debug!("stop requested without a running loop");
            }
            other => {
                tracing::warn!(command = ?other, "command not handled by core applier");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_drain_in_fifo_order() {
        let mut cmds = Commands::new();
        cmds.remove_behavior("a");
        cmds.reset_behavior("b");
        cmds.destroy_entity("c");
        cmds.stop();
        assert_eq!(cmds.len(), 4);

        let drained: Vec<Command> = cmds.drain().collect();
        assert!(matches!(&drained[0], Command::RemoveBehavior(id) if id.as_str() == "a"));
        assert!(matches!(&drained[1], Command::ResetBehavior(id) if id.as_str() == "b"));
        assert!(matches!(&drained[2], Command::DestroyEntity(id) if id.as_str() == "c"));
        assert!(matches!(drained[3], Command::Stop));
        assert!(cmds.is_empty());
    }

    #[test]
    fn core_applier_destroys_entity_and_its_behaviors() {
        let mut entities = EntityStore::new();
        let mut registry = BehaviorRegistry::new();
        entities.create("bullet").unwrap();
        registry
            .attach_behavior(&entities, "bullet", "move", BehaviorSpec::new().on_update(|_| Ok(())))
            .unwrap();

        CoreApplier.apply(
            &mut registry,
            &mut entities,
            Command::DestroyEntity(EntityId::new("bullet")),
        );

        assert!(!entities.contains("bullet"));
        assert!(registry.get_behavior("bullet.move").is_none());
    }

    #[test]
    fn core_applier_tolerates_unknown_entity() {
        let mut entities = EntityStore::new();
        let mut registry = BehaviorRegistry::new();
        CoreApplier.apply(
            &mut registry,
            &mut entities,
            Command::DestroyEntity(EntityId::new("nobody")),
        );
        assert!(entities.is_empty());
    }
}
