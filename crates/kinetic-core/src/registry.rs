//! The behavior registry and its per-tick pass.
//!
//! The [`BehaviorRegistry`] owns every scheduled [`Behavior`]. Once per frame
//! [`run_pass`](BehaviorRegistry::run_pass) steps each behavior:
//!
//! 1. Disabled behaviors are skipped entirely.
//! 2. `on_init` runs once per active lifetime, before the first `on_update`.
//! 3. `on_update` runs with the counter value from *before* this tick.
//! 4. When `duration > 0` and the counter equals the duration, the behavior
//!    finishes: `on_complete` fires, then it either resets (looping) or is
//!    removed (`remove_on_complete`, still enabled).
//! 5. The counter is incremented, also on the completion tick.
//!
//! The order is snapshotted at the start of the pass: behaviors attached to
//! entities come first, grouped by entity registration order, followed by
//! unattached behaviors in insertion order. Behaviors removed mid-pass are
//! skipped when reached; behaviors added mid-pass first run next tick.
//!
//! A hook that returns an error stops the pass. The caller reports the error
//! and runs the next pass normally.

use std::collections::HashMap;

use crate::behavior::{Behavior, BehaviorId, BehaviorSpec, FrameInfo, HookContext};
use crate::command::{Command, CommandApplier, Commands};
use crate::entity::EntityStore;
use crate::{BehaviorError, CoreError, HookKind};

/// Id reserved for the engine's debug-statistics behavior. Hidden from
/// [`BehaviorRegistry::get_all_behaviors`].
pub const DEBUG_BEHAVIOR_ID: &str = "_internal_debug_info";

// ---------------------------------------------------------------------------
// PassReport
// ---------------------------------------------------------------------------

/// Summary of one behavior pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Behaviors whose step ran.
    pub ran: usize,
    /// Behaviors that were disabled or removed before their turn.
    pub skipped: usize,
    /// Behaviors that completed this tick, in pass order.
    pub completed: Vec<BehaviorId>,
}

enum StepOutcome {
    Missing,
    Disabled,
    Ran { completed: bool },
}

// ---------------------------------------------------------------------------
// BehaviorRegistry
// ---------------------------------------------------------------------------

/// Owns the live behaviors of one game world, in insertion order.
#[derive(Debug, Default)]
pub struct BehaviorRegistry {
    behaviors: Vec<Behavior>,
    next_auto_id: u64,
    next_serial: u64,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- registration -------------------------------------------------------

    /// Schedule a behavior and return its id.
    ///
    /// An existing behavior with the same id is removed first (its
    /// `on_remove` fires), so re-adding an id restarts the behavior.
    /// Warnings are logged for unknown spec fields, a non-integer duration
    /// and an `on_complete` hook that can never fire.
    pub fn add_behavior(&mut self, spec: BehaviorSpec) -> BehaviorId {
        let id = match (&spec.id, &spec.owner) {
            (Some(id), _) => id.clone(),
            (None, Some((entity, slot))) => BehaviorId::for_slot(entity, slot),
            (None, None) => self.next_id(),
        };

        if self.contains(id.as_str()) {
            tracing::warn!(behavior = %id, "behavior already exists, replacing it");
            self.remove_behavior(id.as_str());
        }

        if !spec.unknown_fields.is_empty() {
            tracing::warn!(
                behavior = %id,
                fields = ?spec.unknown_fields,
                "unknown properties on behavior spec"
            );
        }

        let duration = round_duration(spec.duration);
        if !spec.duration.is_finite() || spec.duration.fract() != 0.0 {
            tracing::warn!(
                behavior = %id,
                requested = spec.duration,
                rounded = duration,
                "behavior duration was not an integer and was rounded"
            );
        }
        if duration == 0 && spec.hooks.on_complete.is_some() {
            tracing::warn!(
                behavior = %id,
                "behavior has an on_complete hook but no duration; on_complete will never be called"
            );
        }

        tracing::trace!(behavior = %id, duration, "behavior added");
        self.next_serial += 1;
        let mut behavior = Behavior::from_spec(id.clone(), duration, spec);
        behavior.serial = self.next_serial;
        self.behaviors.push(behavior);
        id
    }

    /// Attach a behavior to an entity slot.
    ///
    /// The behavior gets the id `<entity>.<slot>` unless the spec names one,
    /// and replaces whatever occupied the slot before.
    ///
    /// Returns `Ok(None)` (with a warning) when the entity does not exist.
    ///
    /// # Errors
    ///
    /// [`CoreError::MissingUpdateHook`] if the spec has no `on_update` hook.
    pub fn attach_behavior(
        &mut self,
        entities: &EntityStore,
        entity: &str,
        slot: &str,
        spec: BehaviorSpec,
    ) -> Result<Option<BehaviorId>, CoreError> {
        if !spec.has_update_hook() {
            return Err(CoreError::MissingUpdateHook {
                behavior: format!("{entity}.{slot}"),
            });
        }
        let Some(owner) = entities.get_by_id(entity) else {
            tracing::warn!(entity, slot, "tried to attach a behavior to a non-existent entity");
            return Ok(None);
        };
        let owner = owner.id().clone();

        let occupant = self
            .behaviors
            .iter()
            .find(|b| b.owner() == Some(&owner) && b.slot() == Some(slot))
            .map(|b| b.id.clone());
        if let Some(occupant) = occupant {
            self.remove_behavior(occupant.as_str());
        }

        Ok(Some(self.add_behavior(spec.with_owner(owner, slot.to_owned()))))
    }

    /// Remove a behavior, firing its `on_remove` hook.
    ///
    /// Removing an unknown id logs a warning and returns `None`; it never
    /// fails, so teardown code may call it speculatively.
    pub fn remove_behavior(&mut self, id: &str) -> Option<Behavior> {
        let Some(index) = self.position(id) else {
            tracing::warn!(behavior = id, "tried to remove non-existent behavior");
            return None;
        };
        let mut behavior = self.behaviors.remove(index);
        behavior.enabled = false;
        if let Some(on_remove) = behavior.hooks.on_remove.as_mut() {
            on_remove(&mut behavior.data);
        }
        Some(behavior)
    }

    /// Remove every behavior carrying `label`. Returns how many were removed.
    pub fn remove_by_label(&mut self, label: &str) -> usize {
        let ids: Vec<BehaviorId> = self
            .behaviors
            .iter()
            .filter(|b| b.has_label(label))
            .map(|b| b.id.clone())
            .collect();
        for id in &ids {
            self.remove_behavior(id.as_str());
        }
        ids.len()
    }

    /// Remove every behavior attached to `entity`. Returns how many were removed.
    pub fn remove_entity_behaviors(&mut self, entity: &str) -> usize {
        let ids: Vec<BehaviorId> = self
            .behaviors
            .iter()
            .filter(|b| b.owner().is_some_and(|owner| owner.as_str() == entity))
            .map(|b| b.id.clone())
            .collect();
        for id in &ids {
            self.remove_behavior(id.as_str());
        }
        ids.len()
    }

    /// Restart a behavior's counter. `on_init` does not fire again.
    pub fn reset_behavior(&mut self, id: &str) -> bool {
        match self.get_behavior_mut(id) {
            Some(behavior) => {
                behavior.reset();
                true
            }
            None => {
                tracing::warn!(behavior = id, "tried to reset non-existent behavior");
                false
            }
        }
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.get_behavior_mut(id) {
            Some(behavior) => {
                behavior.enabled = enabled;
                true
            }
            None => {
                tracing::warn!(behavior = id, enabled, "tried to toggle non-existent behavior");
                false
            }
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn get_behavior(&self, id: &str) -> Option<&Behavior> {
        self.behaviors.iter().find(|b| b.id.as_str() == id)
    }

    pub fn get_behavior_mut(&mut self, id: &str) -> Option<&mut Behavior> {
        self.behaviors.iter_mut().find(|b| b.id.as_str() == id)
    }

    pub fn get_by_label(&self, label: &str) -> Vec<&Behavior> {
        self.behaviors.iter().filter(|b| b.has_label(label)).collect()
    }

    /// Every behavior except the reserved debug behavior, in insertion order.
    pub fn get_all_behaviors(&self) -> Vec<&Behavior> {
        self.behaviors
            .iter()
            .filter(|b| b.id.as_str() != DEBUG_BEHAVIOR_ID)
            .collect()
    }

    /// The slot -> behavior mapping of one entity, in insertion order.
    pub fn behaviors_of(&self, entity: &str) -> Vec<(&str, &Behavior)> {
        self.behaviors
            .iter()
            .filter_map(|b| match &b.owner {
                Some((owner, slot)) if owner.as_str() == entity => Some((slot.as_str(), b)),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Number of behaviors, including the debug behavior.
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    // -- per-tick pass ------------------------------------------------------

    /// The order in which the next pass visits behaviors.
    ///
    /// Entity-attached behaviors come first, grouped by entity registration
    /// order. Unattached behaviors, and behaviors whose entity is no longer
    /// registered, follow in insertion order.
    pub fn pass_order(&self, entities: &EntityStore) -> Vec<BehaviorId> {
        self.snapshot(entities).into_iter().map(|(id, _)| id).collect()
    }

    /// [`pass_order`](Self::pass_order) with each behavior's instance
    /// serial, so a behavior replaced mid-pass is not mistaken for the one
    /// that was scheduled.
    fn snapshot(&self, entities: &EntityStore) -> Vec<(BehaviorId, u64)> {
        let mut by_owner: HashMap<&str, Vec<&Behavior>> = HashMap::new();
        for behavior in &self.behaviors {
            if let Some(owner) = behavior.owner() {
                by_owner.entry(owner.as_str()).or_default().push(behavior);
            }
        }

        let mut order = Vec::with_capacity(self.behaviors.len());
        for entity in entities.iter() {
            if let Some(owned) = by_owner.remove(entity.id().as_str()) {
                order.extend(owned.into_iter().map(|b| (b.id.clone(), b.serial)));
            }
        }
        order.extend(
            self.behaviors
                .iter()
                .filter(|b| b.owner().map_or(true, |o| by_owner.contains_key(o.as_str())))
                .map(|b| (b.id.clone(), b.serial)),
        );
        order
    }

    /// Run one tick of every behavior.
    ///
    /// Commands queued by a behavior's hooks are handed to `applier` right
    /// after that behavior's step.
    ///
    /// # Errors
    ///
    /// Returns the first [`BehaviorError`]. Behaviors after the failing one
    /// are not run this tick, and the failing hook's queued commands are
    /// discarded.
    pub fn run_pass(
        &mut self,
        entities: &mut EntityStore,
        delta_time: f64,
        frame: &FrameInfo,
        applier: &mut dyn CommandApplier,
    ) -> Result<PassReport, BehaviorError> {
        let order = self.snapshot(entities);
        let mut report = PassReport::default();
        let mut commands = Commands::new();

        for (id, serial) in &order {
            match self.step(id, *serial, entities, &mut commands, delta_time, frame)? {
                StepOutcome::Missing | StepOutcome::Disabled => report.skipped += 1,
                StepOutcome::Ran { completed } => {
                    report.ran += 1;
                    if completed {
                        report.completed.push(id.clone());
                    }
                }
            }
            for command in commands.drain() {
                applier.apply(self, entities, command);
            }
        }

        Ok(report)
    }

    /// Apply a behavior-level command. Entity-level commands
    /// ([`Command::DestroyEntity`], [`Command::Stop`]) are handed back.
    pub fn apply_command(&mut self, entities: &EntityStore, command: Command) -> Option<Command> {
        match command {
            Command::AddBehavior(spec) => {
                self.add_behavior(spec);
            }
            Command::AttachBehavior { entity, slot, spec } => {
                if let Err(e) = self.attach_behavior(entities, entity.as_str(), &slot, spec) {
                    tracing::warn!(entity = %entity, slot = %slot, error = %e, "deferred attach failed");
                }
            }
            Command::RemoveBehavior(id) => {
                self.remove_behavior(id.as_str());
            }
            Command::ResetBehavior(id) => {
                self.reset_behavior(id.as_str());
            }
            Command::SetEnabled(id, enabled) => {
                self.set_enabled(id.as_str(), enabled);
            }
            other => return Some(other),
        }
        None
    }

    fn step(
        &mut self,
        id: &BehaviorId,
        serial: u64,
        entities: &mut EntityStore,
        commands: &mut Commands,
        delta_time: f64,
        frame: &FrameInfo,
    ) -> Result<StepOutcome, BehaviorError> {
        let Some(index) = self
            .position(id.as_str())
            .filter(|&i| self.behaviors[i].serial == serial)
        else {
            return Ok(StepOutcome::Missing);
        };
        let Behavior {
            id,
            owner,
            data,
            counter,
            duration,
            looping,
            remove_on_complete,
            enabled,
            init_has_been_called,
            finished,
            hooks,
            ..
        } = &mut self.behaviors[index];

        if !*enabled {
            return Ok(StepOutcome::Disabled);
        }

        let behavior_id: &BehaviorId = id;
        let mut ctx = HookContext {
            behavior: behavior_id,
            owner: owner.as_ref().map(|(entity, _)| entity),
            counter: *counter,
            delta_time,
            frame,
            enabled: &mut *enabled,
            data,
            entities,
            commands,
        };

        if !*init_has_been_called {
            if let Some(on_init) = hooks.on_init.as_mut() {
                on_init(&mut ctx).map_err(|e| hook_error(behavior_id, HookKind::Init, e))?;
            }
            *init_has_been_called = true;
        }

        if let Some(on_update) = hooks.on_update.as_mut() {
            on_update(&mut ctx).map_err(|e| hook_error(behavior_id, HookKind::Update, e))?;
        }

        let mut completed = false;
        let mut remove = false;
        if *duration > 0 && *counter == *duration && !*finished {
            *finished = true;
            completed = true;
            if let Some(on_complete) = hooks.on_complete.as_mut() {
                on_complete(&mut ctx)
                    .map_err(|e| hook_error(behavior_id, HookKind::Complete, e))?;
            }
            if *looping {
                *counter = 0;
                *finished = false;
            } else if *remove_on_complete && *enabled {
                remove = true;
            }
        }

        *counter += 1;

        let removed_id = remove.then(|| behavior_id.clone());
        if let Some(removed_id) = removed_id {
            self.remove_behavior(removed_id.as_str());
        }

        Ok(StepOutcome::Ran { completed })
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.behaviors.iter().position(|b| b.id.as_str() == id)
    }

    fn next_id(&mut self) -> BehaviorId {
        loop {
            self.next_auto_id += 1;
            let id = BehaviorId::new(format!("behavior-{}", self.next_auto_id));
            if !self.contains(id.as_str()) {
                return id;
            }
        }
    }
}

fn hook_error(id: &BehaviorId, hook: HookKind, source: anyhow::Error) -> BehaviorError {
    BehaviorError {
        behavior: id.clone(),
        hook,
        source,
    }
}

/// Round a requested duration to whole ticks. Non-finite and non-positive
/// durations mean "never completes".
fn round_duration(duration: f64) -> u64 {
    if duration.is_finite() && duration > 0.0 {
        duration.round() as u64
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
