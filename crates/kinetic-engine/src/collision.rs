//! Routes physics contacts to per-type collision callbacks.
//!
//! A subscription names a source entity kind, a list of target kinds and a
//! [`CollisionPhase`]. A contact pair matches when one body's entity has the
//! source kind and the other's has one of the target kinds, in either order.
//! The callback receives the bodies in the order the simulation reported
//! them, so it must re-check kinds if the order matters.
//!
//! Bodies without an owning entity, or whose entity has an empty kind, never
//! match. Physics worlds commonly contain untyped geometry such as walls.

use kinetic_core::command::Commands;
use kinetic_core::entity::{BodyId, Entity, EntityId, EntityStore};

use crate::bridge::BodyOwners;
use crate::physics::{CollisionPhase, ContactEvent};

/// Handle returned by [`CollisionRouter::add_collision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// What a collision callback can see and touch.
pub struct CollisionContext<'a> {
    owners: &'a BodyOwners,
    /// All live entities.
    pub entities: &'a mut EntityStore,
    /// Deferred mutations, applied after dispatch.
    pub commands: &'a mut Commands,
}

impl CollisionContext<'_> {
    /// The entity owning `body`.
    pub fn entity_of(&self, body: BodyId) -> Option<&EntityId> {
        self.owners.get(body)
    }

    pub fn entity(&self, body: BodyId) -> Option<&Entity> {
        let id = self.owners.get(body)?;
        self.entities.get_by_id(id.as_str())
    }

    pub fn entity_mut(&mut self, body: BodyId) -> Option<&mut Entity> {
        let id = self.owners.get(body)?;
        self.entities.get_mut(id.as_str())
    }

    /// Kind of the entity owning `body`, if any.
    pub fn kind_of(&self, body: BodyId) -> Option<&str> {
        self.entity(body).map(|e| e.kind.as_str())
    }
}

pub type CollisionCallback = Box<dyn FnMut(BodyId, BodyId, &mut CollisionContext<'_>)>;

struct Subscription {
    id: SubscriptionId,
    source: String,
    targets: Vec<String>,
    phase: CollisionPhase,
    callback: CollisionCallback,
}

impl Subscription {
    fn matches(&self, kind_a: &str, kind_b: &str) -> bool {
        let is_target = |kind: &str| self.targets.iter().any(|t| t == kind);
        (kind_a == self.source && is_target(kind_b)) || (kind_b == self.source && is_target(kind_a))
    }
}

/// Collision subscriptions, dispatched in registration order.
#[derive(Default)]
pub struct CollisionRouter {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl std::fmt::Debug for CollisionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionRouter")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl CollisionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to contacts between `source` and any of `targets`.
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
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let source = source.into();
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        tracing::debug!(source = %source, targets = ?targets, ?phase, "collision subscription added");
        self.subscriptions.push(Subscription {
            id,
            source,
            targets,
            phase,
            callback: Box::new(callback),
        });
        id
    }

    /// Drop one subscription. Returns `false` if it was already gone.
    pub fn remove_collision(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        let removed = self.subscriptions.len() != before;
        if !removed {
            tracing::warn!(subscription = id.0, "tried to remove non-existent collision subscription");
        }
        removed
    }

    pub fn remove_all_collisions(&mut self) {
        self.subscriptions.clear();
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Invoke every matching callback. Returns the number of invocations.
    pub fn dispatch(
        &mut self,
        events: &[ContactEvent],
        owners: &BodyOwners,
        entities: &mut EntityStore,
        commands: &mut Commands,
    ) -> usize {
        let mut invoked = 0;
        let mut ctx = CollisionContext {
            owners,
            entities,
            commands,
        };
        for subscription in &mut self.subscriptions {
            for event in events.iter().filter(|e| e.phase == subscription.phase) {
                let (Some(kind_a), Some(kind_b)) =
                    (ctx.kind_of(event.body_a), ctx.kind_of(event.body_b))
                else {
                    continue;
                };
                if kind_a.is_empty() || kind_b.is_empty() || !subscription.matches(kind_a, kind_b) {
                    continue;
                }
                (subscription.callback)(event.body_a, event.body_b, &mut ctx);
                invoked += 1;
            }
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PhysicsBridge;
    use crate::physics::{BodyDesc, BodyShape, RapierEngine};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        bridge: PhysicsBridge,
        entities: EntityStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                bridge: PhysicsBridge::new(Box::new(RapierEngine::new_zero_gravity())),
                entities: EntityStore::new(),
            }
        }

        fn spawn(&mut self, id: &str, kind: &str) -> BodyId {
            let entity = self.entities.create(id).unwrap();
            entity.kind = kind.to_owned();
            self.bridge
                .add_body(entity, &BodyDesc::dynamic(BodyShape::Circle { radius: 1.0 }))
        }

        fn dispatch(&mut self, router: &mut CollisionRouter, events: &[ContactEvent]) -> usize {
            let mut commands = Commands::new();
            router.dispatch(events, self.bridge.owners(), &mut self.entities, &mut commands)
        }
    }

    fn active(a: BodyId, b: BodyId) -> ContactEvent {
        ContactEvent {
            phase: CollisionPhase::Active,
            body_a: a,
            body_b: b,
        }
    }

    type Calls = Rc<RefCell<Vec<(BodyId, BodyId)>>>;

    fn recorder(calls: &Calls) -> impl FnMut(BodyId, BodyId, &mut CollisionContext<'_>) + 'static {
        let calls = Rc::clone(calls);
        move |a, b, _| calls.borrow_mut().push((a, b))
    }

    #[test]
    fn reversed_pair_matches_in_original_order() {
        let mut fx = Fixture::new();
        let enemy = fx.spawn("e", "enemy");
        let player = fx.spawn("p", "player");
        let calls: Calls = Rc::default();
        let mut router = CollisionRouter::new();
        router.add_collision("player", ["enemy"], CollisionPhase::Active, recorder(&calls));

        assert_eq!(fx.dispatch(&mut router, &[active(enemy, player)]), 1);
        assert_eq!(*calls.borrow(), vec![(enemy, player)]);
    }

    #[test]
    fn non_matching_kinds_are_ignored() {
        let mut fx = Fixture::new();
        let neutral = fx.spawn("n", "neutral");
        let enemy = fx.spawn("e", "enemy");
        let calls: Calls = Rc::default();
        let mut router = CollisionRouter::new();
        router.add_collision("player", ["enemy"], CollisionPhase::Active, recorder(&calls));

        assert_eq!(fx.dispatch(&mut router, &[active(neutral, enemy)]), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn untyped_and_unowned_bodies_are_filtered() {
        let mut fx = Fixture::new();
        let player = fx.spawn("p", "player");
        let wall = fx.spawn("wall", "");
        let stray = BodyId::from_raw(999);
        let calls: Calls = Rc::default();
        let mut router = CollisionRouter::new();
        router.add_collision("player", ["", "enemy"], CollisionPhase::Active, recorder(&calls));

        let events = [active(player, wall), active(stray, player)];
        assert_eq!(fx.dispatch(&mut router, &events), 0);
    }

    #[test]
    fn phase_filters_events() {
        let mut fx = Fixture::new();
        let a = fx.spawn("a", "ball");
        let b = fx.spawn("b", "brick");
        let starts: Calls = Rc::default();
        let ends: Calls = Rc::default();
        let mut router = CollisionRouter::new();
        router.add_collision("ball", ["brick"], CollisionPhase::Start, recorder(&starts));
        router.add_collision("ball", ["brick"], CollisionPhase::End, recorder(&ends));

        let events = [
            ContactEvent {
                phase: CollisionPhase::Start,
                body_a: a,
                body_b: b,
            },
            active(a, b),
        ];
        fx.dispatch(&mut router, &events);
        assert_eq!(starts.borrow().len(), 1);
        assert!(ends.borrow().is_empty());
    }

    #[test]
    fn subscriptions_fire_in_registration_order() {
        let mut fx = Fixture::new();
        let a = fx.spawn("a", "ship");
        let b = fx.spawn("b", "rock");
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut router = CollisionRouter::new();
        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            router.add_collision("ship", ["rock"], CollisionPhase::Active, move |_, _, _| {
                order.borrow_mut().push(name)
            });
        }
        fx.dispatch(&mut router, &[active(a, b)]);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_single_and_all_subscriptions() {
        let mut fx = Fixture::new();
        let a = fx.spawn("a", "ship");
        let b = fx.spawn("b", "rock");
        let calls: Calls = Rc::default();
        let mut router = CollisionRouter::new();
        let first = router.add_collision("ship", ["rock"], CollisionPhase::Active, recorder(&calls));
        router.add_collision("rock", ["ship"], CollisionPhase::Active, recorder(&calls));

        assert!(router.remove_collision(first));
        assert!(!router.remove_collision(first));
        assert_eq!(fx.dispatch(&mut router, &[active(a, b)]), 1);

        router.remove_all_collisions();
        assert!(router.is_empty());
        assert_eq!(fx.dispatch(&mut router, &[active(a, b)]), 0);
    }

    #[test]
    fn callbacks_can_queue_commands_and_edit_entities() {
        let mut fx = Fixture::new();
        let bullet = fx.spawn("bullet", "bullet");
        let target = fx.spawn("target", "target");
        let mut router = CollisionRouter::new();
        router.add_collision("bullet", ["target"], CollisionPhase::Active, |a, b, ctx| {
            let (bullet, target) = if ctx.kind_of(a) == Some("bullet") { (a, b) } else { (b, a) };
            if let Some(entity) = ctx.entity_mut(target) {
                entity.kind = "wreck".to_owned();
            }
            if let Some(id) = ctx.entity_of(bullet).cloned() {
                ctx.commands.destroy_entity(id);
            }
        });

        let mut commands = Commands::new();
        router.dispatch(
            &[active(target, bullet)],
            fx.bridge.owners(),
            &mut fx.entities,
            &mut commands,
        );
        assert_eq!(fx.entities.get_by_id("target").unwrap().kind, "wreck");
        assert_eq!(commands.len(), 1);
    }
}
