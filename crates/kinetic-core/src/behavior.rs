//! Behavior specs, records and the context handed to lifecycle hooks.
//!
//! A behavior is a named, stateful unit of per-tick logic. Callers describe
//! one with a [`BehaviorSpec`] and hand it to the
//! [`BehaviorRegistry`](crate::registry::BehaviorRegistry), which owns the
//! resulting [`Behavior`] record for the rest of its life.
//!
//! All four hooks are optional. `on_init`, `on_update` and `on_complete`
//! receive a [`HookContext`] and may fail; `on_remove` only sees the
//! behavior's data and cannot fail, so removal always succeeds.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::Commands;
use crate::entity::{Entity, EntityId, EntityStore};
use crate::CoreError;

// ---------------------------------------------------------------------------
// BehaviorId
// ---------------------------------------------------------------------------

/// Unique id of a behavior inside one registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BehaviorId(String);

impl BehaviorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id used for an entity's slot behavior: `<entity>.<slot>`.
    pub fn for_slot(entity: &EntityId, slot: &str) -> Self {
        Self(format!("{entity}.{slot}"))
    }
}

impl fmt::Debug for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BehaviorId({:?})", self.0)
    }
}

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BehaviorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BehaviorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&BehaviorId> for BehaviorId {
    fn from(id: &BehaviorId) -> Self {
        id.clone()
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Result of a fallible hook. An `Err` aborts the rest of the tick's pass.
pub type HookResult = anyhow::Result<()>;

/// A fallible lifecycle hook (`on_init`, `on_update`, `on_complete`).
pub type Hook = Box<dyn FnMut(&mut HookContext<'_>) -> HookResult>;

/// The removal hook. Receives the behavior's data.
pub type RemoveHook = Box<dyn FnMut(&mut serde_json::Value)>;

#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) on_init: Option<Hook>,
    pub(crate) on_update: Option<Hook>,
    pub(crate) on_complete: Option<Hook>,
    pub(crate) on_remove: Option<RemoveHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_init", &self.on_init.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_remove", &self.on_remove.is_some())
            .finish()
    }
}

/// Per-frame information shared by every hook in a pass.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Index of the tick being executed (0 for the first tick).
    pub tick: u64,
    /// Wall-clock duration of the previous behavior pass.
    pub last_pass_time: Duration,
    /// Number of registered behaviors when the pass started.
    pub behavior_count: usize,
}

/// What a hook can see and touch while it runs.
///
/// Structural changes to the behavior or entity collections (adding or
/// removing behaviors, destroying entities) go through [`Commands`] and are
/// applied once the current behavior has finished its step.
pub struct HookContext<'a> {
    pub(crate) behavior: &'a BehaviorId,
    pub(crate) owner: Option<&'a EntityId>,
    pub(crate) counter: u64,
    pub(crate) delta_time: f64,
    pub(crate) frame: &'a FrameInfo,
    pub(crate) enabled: &'a mut bool,
    /// The behavior's opaque payload.
    pub data: &'a mut serde_json::Value,
    /// All live entities.
    pub entities: &'a mut EntityStore,
    /// Deferred mutations, applied after this behavior's step.
    pub commands: &'a mut Commands,
}

impl HookContext<'_> {
    pub fn behavior_id(&self) -> &BehaviorId {
        self.behavior
    }

    /// The entity this behavior is attached to, if any.
    pub fn entity_id(&self) -> Option<&EntityId> {
        self.owner
    }

    /// Ticks elapsed since the last reset, before this tick's increment.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    pub fn frame(&self) -> &FrameInfo {
        self.frame
    }

    /// Mutable access to the owning entity, if it is still registered.
    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        let owner = self.owner?;
        self.entities.get_mut(owner.as_str())
    }

    /// Enable or disable this behavior. Takes effect immediately: a behavior
    /// disabled from `on_complete` is not removed on completion.
    pub fn set_enabled(&mut self, enabled: bool) {
        *self.enabled = enabled;
    }
}

// ---------------------------------------------------------------------------
// BehaviorSpec
// ---------------------------------------------------------------------------

/// Description of a behavior to be scheduled.
///
/// Defaults: no id (one is generated), no labels, `duration = 0` (never
/// completes), not looping, `remove_on_complete = true`, enabled, empty
/// object as data.
pub struct BehaviorSpec {
    pub(crate) id: Option<BehaviorId>,
    pub(crate) labels: Vec<String>,
    pub(crate) duration: f64,
    pub(crate) looping: bool,
    pub(crate) remove_on_complete: bool,
    pub(crate) enabled: bool,
    pub(crate) data: serde_json::Value,
    pub(crate) owner: Option<(EntityId, String)>,
    pub(crate) unknown_fields: Vec<String>,
    pub(crate) hooks: Hooks,
}

impl Default for BehaviorSpec {
    fn default() -> Self {
        Self {
            id: None,
            labels: Vec::new(),
            duration: 0.0,
            looping: false,
            remove_on_complete: true,
            enabled: true,
            data: serde_json::json!({}),
            owner: None,
            unknown_fields: Vec::new(),
            hooks: Hooks::default(),
        }
    }
}

impl fmt::Debug for BehaviorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSpec")
            .field("id", &self.id)
            .field("labels", &self.labels)
            .field("duration", &self.duration)
            .field("looping", &self.looping)
            .field("remove_on_complete", &self.remove_on_complete)
            .field("enabled", &self.enabled)
            .field("owner", &self.owner)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Wire shape of a behavior spec. Unrecognised keys land in `unknown`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpec {
    id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    duration: f64,
    #[serde(default, rename = "loop")]
    looping: bool,
    remove_on_complete: Option<bool>,
    enabled: Option<bool>,
    data: Option<serde_json::Value>,
    #[serde(flatten)]
    unknown: serde_json::Map<String, serde_json::Value>,
}

impl BehaviorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the declarative part of a spec from JSON.
    ///
    /// Keys are camelCase (`removeOnComplete`). Unknown keys do not fail;
    /// they are reported as a warning when the spec is added. Hooks are
    /// attached afterwards with the builder methods.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: RawSpec =
            serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidSpec {
                reason: e.to_string(),
            })?;
        let defaults = Self::default();
        Ok(Self {
            id: raw.id.map(BehaviorId),
            labels: raw.labels,
            duration: raw.duration,
            looping: raw.looping,
            remove_on_complete: raw.remove_on_complete.unwrap_or(defaults.remove_on_complete),
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            data: raw.data.unwrap_or(defaults.data),
            unknown_fields: raw.unknown.into_iter().map(|(key, _)| key).collect(),
            ..defaults
        })
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(BehaviorId(id.into()));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Tick count after which `on_complete` fires. Rounded to the nearest
    /// integer when added; 0 means the behavior never completes.
    pub fn duration(mut self, ticks: f64) -> Self {
        self.duration = ticks;
        self
    }

    /// Restart from counter 0 after completing instead of finishing.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn on_init(
        mut self,
        hook: impl FnMut(&mut HookContext<'_>) -> HookResult + 'static,
    ) -> Self {
        self.hooks.on_init = Some(Box::new(hook));
        self
    }

    pub fn on_update(
        mut self,
        hook: impl FnMut(&mut HookContext<'_>) -> HookResult + 'static,
    ) -> Self {
        self.hooks.on_update = Some(Box::new(hook));
        self
    }

    pub fn on_complete(
        mut self,
        hook: impl FnMut(&mut HookContext<'_>) -> HookResult + 'static,
    ) -> Self {
        self.hooks.on_complete = Some(Box::new(hook));
        self
    }

    pub fn on_remove(mut self, hook: impl FnMut(&mut serde_json::Value) + 'static) -> Self {
        self.hooks.on_remove = Some(Box::new(hook));
        self
    }

    pub fn has_update_hook(&self) -> bool {
        self.hooks.on_update.is_some()
    }

    pub(crate) fn with_owner(mut self, entity: EntityId, slot: String) -> Self {
        self.owner = Some((entity, slot));
        self
    }
}

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// A scheduled behavior, owned by a registry.
#[derive(Debug)]
pub struct Behavior {
    pub(crate) id: BehaviorId,
    pub(crate) labels: Vec<String>,
    pub(crate) data: serde_json::Value,
    pub(crate) counter: u64,
    pub(crate) duration: u64,
    pub(crate) looping: bool,
    pub(crate) remove_on_complete: bool,
    pub(crate) enabled: bool,
    pub(crate) init_has_been_called: bool,
    pub(crate) finished: bool,
    pub(crate) owner: Option<(EntityId, String)>,
    pub(crate) hooks: Hooks,
    /// Registry-assigned instance number. A replacement under the same id
    /// gets a new one.
    pub(crate) serial: u64,
}

impl Behavior {
    pub(crate) fn from_spec(id: BehaviorId, duration: u64, spec: BehaviorSpec) -> Self {
        Self {
            id,
            labels: spec.labels,
            data: spec.data,
            counter: 0,
            duration,
            looping: spec.looping,
            remove_on_complete: spec.remove_on_complete,
            enabled: spec.enabled,
            init_has_been_called: false,
            finished: false,
            owner: spec.owner,
            hooks: spec.hooks,
            serial: 0,
        }
    }

    pub fn id(&self) -> &BehaviorId {
        &self.id
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut serde_json::Value {
        &mut self.data
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn removes_on_complete(&self) -> bool {
        self.remove_on_complete
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn init_has_been_called(&self) -> bool {
        self.init_has_been_called
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The entity this behavior is attached to.
    pub fn owner(&self) -> Option<&EntityId> {
        self.owner.as_ref().map(|(entity, _)| entity)
    }

    /// The entity slot name this behavior occupies.
    pub fn slot(&self) -> Option<&str> {
        self.owner.as_ref().map(|(_, slot)| slot.as_str())
    }

    pub(crate) fn reset(&mut self) {
        self.counter = 0;
        self.finished = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
