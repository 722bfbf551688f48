//! Property tests for the behavior registry and sprite geometry.
//!
//! Random sequences of add/remove/reset/tick operations are applied to a
//! registry and the lifecycle invariants are checked after every step.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use kinetic_core::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum RegistryOp {
    Add { slot: usize, duration: u8, looping: bool },
    Remove(usize),
    Reset(usize),
    Tick,
}

fn registry_op_strategy() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (0..6usize, 0..4u8, any::<bool>()).prop_map(|(slot, duration, looping)| {
            RegistryOp::Add {
                slot,
                duration,
                looping,
            }
        }),
        (0..6usize).prop_map(RegistryOp::Remove),
        (0..6usize).prop_map(RegistryOp::Reset),
        Just(RegistryOp::Tick),
    ]
}

fn behavior_name(slot: usize) -> String {
    format!("b{slot}")
}

/// Removal counts per incarnation. Every add creates a new incarnation.
type RemovalLog = Rc<RefCell<HashMap<u64, u32>>>;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every incarnation is either still registered with no removal
    /// recorded, or gone with exactly one `on_remove` call.
    #[test]
    fn on_remove_fires_exactly_once_per_incarnation(
        ops in prop::collection::vec(registry_op_strategy(), 1..80),
    ) {
        let mut registry = BehaviorRegistry::new();
        let mut entities = EntityStore::new();
        let removals: RemovalLog = Rc::new(RefCell::new(HashMap::new()));
        let mut next_incarnation = 0u64;
        let frame = FrameInfo::default();

        for op in &ops {
            match *op {
                RegistryOp::Add { slot, duration, looping } => {
                    let incarnation = next_incarnation;
                    next_incarnation += 1;
                    removals.borrow_mut().insert(incarnation, 0);
                    let log = Rc::clone(&removals);
                    let id = registry.add_behavior(
                        BehaviorSpec::new()
                            .id(behavior_name(slot))
                            .duration(f64::from(duration))
                            .looping(looping)
                            .data(serde_json::json!({ "incarnation": incarnation }))
                            .on_remove(move |data| {
                                let key = data["incarnation"].as_u64().unwrap_or(u64::MAX);
                                *log.borrow_mut().entry(key).or_insert(0) += 1;
                            }),
                    );
                    let behavior = registry.get_behavior(id.as_str()).unwrap();
                    prop_assert_eq!(behavior.counter(), 0);
                    prop_assert!(!behavior.is_finished());
                }
                RegistryOp::Remove(slot) => {
                    registry.remove_behavior(&behavior_name(slot));
                    prop_assert!(registry.get_behavior(&behavior_name(slot)).is_none());
                }
                RegistryOp::Reset(slot) => {
                    registry.reset_behavior(&behavior_name(slot));
                    if let Some(behavior) = registry.get_behavior(&behavior_name(slot)) {
                        prop_assert_eq!(behavior.counter(), 0);
                        prop_assert!(!behavior.is_finished());
                    }
                }
                RegistryOp::Tick => {
                    registry
                        .run_pass(&mut entities, 1.0 / 60.0, &frame, &mut CoreApplier)
                        .unwrap();
                }
            }

            let alive: HashMap<u64, ()> = registry
                .get_all_behaviors()
                .iter()
                .filter_map(|b| b.data()["incarnation"].as_u64())
                .map(|inc| (inc, ()))
                .collect();
            for (incarnation, count) in removals.borrow().iter() {
                if alive.contains_key(incarnation) {
                    prop_assert_eq!(*count, 0, "live incarnation {} was removed", incarnation);
                } else {
                    prop_assert_eq!(*count, 1, "dead incarnation {} removed {} times", incarnation, count);
                }
            }
        }
    }

    /// Ids stay unique no matter how adds and removals interleave.
    #[test]
    fn behavior_ids_stay_unique(
        ops in prop::collection::vec(registry_op_strategy(), 1..60),
    ) {
        let mut registry = BehaviorRegistry::new();
        let mut entities = EntityStore::new();
        let frame = FrameInfo::default();

        for op in &ops {
            match *op {
                RegistryOp::Add { slot, duration, .. } if slot % 2 == 0 => {
                    registry.add_behavior(BehaviorSpec::new().duration(f64::from(duration)));
                }
                RegistryOp::Add { slot, duration, looping } => {
                    registry.add_behavior(
                        BehaviorSpec::new()
                            .id(behavior_name(slot))
                            .duration(f64::from(duration))
                            .looping(looping),
                    );
                }
                RegistryOp::Remove(slot) => {
                    registry.remove_behavior(&behavior_name(slot));
                }
                RegistryOp::Reset(slot) => {
                    registry.reset_behavior(&behavior_name(slot));
                }
                RegistryOp::Tick => {
                    registry
                        .run_pass(&mut entities, 1.0 / 60.0, &frame, &mut CoreApplier)
                        .unwrap();
                }
            }

            let mut ids: Vec<&str> = registry
                .get_all_behaviors()
                .iter()
                .map(|b| b.id().as_str())
                .collect();
            let total = ids.len();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);
        }
    }

    /// Rectangle overlap is symmetric and the area never exceeds either rectangle.
    #[test]
    fn sprite_overlap_is_symmetric(
        ax in -100.0..100.0f64, ay in -100.0..100.0f64,
        aw in 0.0..50.0f64, ah in 0.0..50.0f64,
        bx in -100.0..100.0f64, by in -100.0..100.0f64,
        bw in 0.0..50.0f64, bh in 0.0..50.0f64,
        scale in 0.5..4.0f64,
    ) {
        let detector = SpriteCollisionDetector::new(scale);
        let a: Hitbox = Rect::new(ax, ay, aw, ah).into();
        let b: Hitbox = Rect::new(bx, by, bw, bh).into();

        prop_assert_eq!(detector.is_colliding(&a, &b), detector.is_colliding(&b, &a));
        let area = detector.overlapping_area(&a, &b);
        prop_assert_eq!(area, detector.overlapping_area(&b, &a));
        prop_assert!(area >= 0.0);

        let world_a = detector.world_rect(&a);
        let world_b = detector.world_rect(&b);
        let smallest = (world_a.width * world_a.height).min(world_b.width * world_b.height);
        prop_assert!(area <= smallest + 1e-9);
    }
}
