//! Headless arena demo -- bullets fly across a grid of targets, targets are
//! destroyed on contact, and the loop stops once every target is gone.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example arena_headless -p kinetic-engine

use std::cell::Cell;
use std::rc::Rc;

use kinetic_core::util::{random_in_range, seeded_rng, Grid};
use kinetic_engine::prelude::*;

const TARGETS: usize = 12;
const BULLETS: usize = 40;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let renderer = HeadlessRenderer::default()
        .with_texture("target", 2.0, 2.0)
        .with_texture("bullet", 0.5, 0.5);
    let world = GameWorld::new(WorldConfig::default(), renderer);
    let mut scheduler = TickScheduler::new(
        world,
        TickConfig {
            headless: true,
            debug: true,
            ..Default::default()
        },
    );
    scheduler.set_error_handler(|err| eprintln!("frame skipped: {err}"));

    let world = scheduler.world_mut();

    // -- targets on a grid ---------------------------------------------------
    let grid = Grid {
        x: -10.0,
        y: 10.0,
        margin_x: 5.0,
        margin_y: -5.0,
        items_per_row: 4,
    };
    for i in 0..TARGETS {
        let id = format!("target-{i}");
        let (x, y) = grid.position(i);
        world.create(id.as_str())?.kind = "target".to_owned();
        world.add_body(
            &id,
            BodyDesc::fixed(BodyShape::Box {
                half_width: 1.0,
                half_height: 1.0,
            })
            .at(x, y),
        )?;
        world.show_sprite(&id, SpriteOptions::new("target"))?;
    }

    // -- bullets from the bottom, seeded ------------------------------------
    let mut rng = seeded_rng(7);
    for i in 0..BULLETS {
        let id = format!("bullet-{i}");
        let x = random_in_range(&mut rng, -12, 6) as f64;
        world.create(id.as_str())?.kind = "bullet".to_owned();
        world.add_body(
            &id,
            BodyDesc::kinematic(BodyShape::Circle { radius: 0.25 })
                .at(x, -20.0 - i as f64 * 2.0)
                .velocity(0.0, 15.0)
                .sensor(true),
        )?;
        world.show_sprite(&id, SpriteOptions::new("bullet").z_index(1))?;
        world.attach_behavior(
            &id,
            "expire",
            BehaviorSpec::new().duration(600.0).on_update(|_| Ok(())).on_complete(|ctx| {
                if let Some(id) = ctx.entity_id().cloned() {
                    ctx.commands.destroy_entity(id);
                }
                Ok(())
            }),
        )?;
    }

    // -- rules ---------------------------------------------------------------
    let destroyed = Rc::new(Cell::new(0usize));
    let d = Rc::clone(&destroyed);
    world.add_collision("bullet", ["target"], CollisionPhase::Start, move |a, b, ctx| {
        let target = if ctx.kind_of(a) == Some("target") { a } else { b };
        if let Some(id) = ctx.entity_of(target).cloned() {
            tracing::info!(target = %id, "target destroyed");
            ctx.commands.destroy_entity(id);
            d.set(d.get() + 1);
        }
    });
    world.add_behavior(BehaviorSpec::new().id("referee").on_update(|ctx| {
        if ctx.entities.get_by_type("target").is_empty() {
            ctx.commands.stop();
        }
        Ok(())
    }));

    let frames = scheduler.run_for(3_000);
    let world = scheduler.world();
    println!(
        "{frames} frames, {:.2}s simulated, {} of {TARGETS} targets destroyed, {} entities left",
        scheduler.sim_time(),
        destroyed.get(),
        world.get_all().len(),
    );
    Ok(())
}
