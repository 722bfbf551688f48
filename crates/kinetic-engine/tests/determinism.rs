//! Determinism: a seeded arena of bouncing balls, run twice, must end in
//! bit-identical state. The final entity state is hashed with blake3.

use std::cell::Cell;
use std::rc::Rc;

use kinetic_core::util::{random_in_range, seeded_rng};
use kinetic_engine::prelude::*;

const BALLS: usize = 24;
const TICKS: u64 = 600;

fn wall(world: &mut GameWorld, id: &str, x: f64, y: f64, half_width: f64, half_height: f64) {
    world.create(id).unwrap().kind = "wall".to_owned();
    world
        .add_body(
            id,
            BodyDesc::fixed(BodyShape::Box {
                half_width,
                half_height,
            })
            .at(x, y),
        )
        .unwrap();
}

/// Build the arena, run it and return (state hash, wall hits).
fn run_arena(seed: u64) -> (String, u64) {
    let mut rng = seeded_rng(seed);
    let world = GameWorld::headless(WorldConfig::default());
    let mut scheduler = TickScheduler::new(
        world,
        TickConfig {
            headless: true,
            ..Default::default()
        },
    );

    let world = scheduler.world_mut();
    wall(world, "north", 0.0, 21.0, 21.0, 1.0);
    wall(world, "south", 0.0, -21.0, 21.0, 1.0);
    wall(world, "east", 21.0, 0.0, 1.0, 21.0);
    wall(world, "west", -21.0, 0.0, 1.0, 21.0);

    for i in 0..BALLS {
        let id = format!("ball-{i}");
        let x = random_in_range(&mut rng, -18, 18) as f64;
        let y = random_in_range(&mut rng, -18, 18) as f64;
        let dx = random_in_range(&mut rng, -10, 10) as f64;
        let dy = random_in_range(&mut rng, -10, 10) as f64;
        world.create(id.as_str()).unwrap().kind = "ball".to_owned();
        world
            .add_body(
                &id,
                BodyDesc::dynamic(BodyShape::Circle { radius: 0.5 })
                    .at(x, y)
                    .velocity(dx, dy)
                    .restitution(1.0),
            )
            .unwrap();
        world
            .attach_behavior(
                &id,
                "age",
                BehaviorSpec::new()
                    .data(serde_json::json!({ "ticks": 0 }))
                    .on_update(|ctx| {
                        let ticks = ctx.data["ticks"].as_u64().unwrap_or(0);
                        ctx.data["ticks"] = serde_json::json!(ticks + 1);
                        Ok(())
                    }),
            )
            .unwrap();
    }

    let hits = Rc::new(Cell::new(0u64));
    let h = Rc::clone(&hits);
    world.add_collision("ball", ["wall"], CollisionPhase::Start, move |_, _, _| {
        h.set(h.get() + 1)
    });

    assert_eq!(scheduler.run_ticks(TICKS), 0);
    (hash_world(scheduler.world()), hits.get())
}

/// Hash every entity's id, kind and transform, in registration order.
fn hash_world(world: &GameWorld) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(world.get_all().len() as u64).to_le_bytes());
    for entity in world.get_all() {
        hasher.update(entity.id().as_str().as_bytes());
        hasher.update(entity.kind.as_bytes());
        hasher.update(&entity.transform.x.to_le_bytes());
        hasher.update(&entity.transform.y.to_le_bytes());
        hasher.update(&entity.transform.rotation.to_le_bytes());
    }
    for (_, behavior) in world.behaviors().behaviors_of("ball-0") {
        hasher.update(behavior.data().to_string().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[test]
fn identical_runs_hash_identically() {
    let (hash_a, hits_a) = run_arena(42);
    let (hash_b, hits_b) = run_arena(42);
    assert_eq!(hash_a, hash_b, "two runs with the same seed diverged");
    assert_eq!(hits_a, hits_b);
    assert!(hits_a > 0, "balls should reach the walls within {TICKS} ticks");
}

#[test]
fn different_seeds_diverge() {
    let (hash_a, _) = run_arena(1);
    let (hash_b, _) = run_arena(2);
    assert_ne!(hash_a, hash_b);
}

#[test]
fn sync_behavior_keeps_transforms_on_bodies() {
    let mut scheduler = TickScheduler::new(
        GameWorld::headless(WorldConfig {
            gravity: (0.0, -9.81),
            ..WorldConfig::default()
        }),
        TickConfig {
            headless: true,
            ..Default::default()
        },
    );
    let world = scheduler.world_mut();
    world.create("rock").unwrap();
    world
        .add_body("rock", BodyDesc::dynamic(BodyShape::Circle { radius: 1.0 }).at(0.0, 100.0))
        .unwrap();

    scheduler.run_ticks(60);
    let rock = scheduler.world().get_by_id("rock").unwrap();
    assert!(rock.transform.y < 100.0);
    assert_eq!(rock.transform, rock.body().unwrap().pose);
}
