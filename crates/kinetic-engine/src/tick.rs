//! The frame loop.
//!
//! The [`TickScheduler`] drives a [`GameWorld`] forward one frame at a time.
//! Each frame:
//!
//! 1. The world steps: physics, collision dispatch, behavior pass, placing
//!    visuals (see [`GameWorld::step`]).
//! 2. A failed behavior hook is logged, reported to the error handler and
//!    returned in the [`FrameReport`]. The next frame runs normally.
//! 3. The draw callback runs, unless the scheduler is headless.
//! 4. The tick counter advances. A stop requested by game logic takes
//!    effect here.
//!
//! Frames can be driven with a fixed time step ([`run_ticks`]) or in real
//! time ([`frame`] / [`run_for`]), paced to `max_fps` with the measured
//! time step clamped to `max_frame_dt`.
//!
//! # Example
//!
//! ```
//! use kinetic_engine::prelude::*;
//!
//! let world = GameWorld::headless(WorldConfig::default());
//! let mut scheduler = TickScheduler::new(world, TickConfig::default());
//!
//! scheduler.world_mut().add_behavior(
//!     BehaviorSpec::new().id("timer").duration(10.0).on_update(|_| Ok(())),
//! );
//!
//! assert_eq!(scheduler.run_ticks(11), 0);
//! assert!(scheduler.world().behaviors().get_behavior("timer").is_none());
//! ```
//!
//! [`run_ticks`]: TickScheduler::run_ticks
//! [`frame`]: TickScheduler::frame
//! [`run_for`]: TickScheduler::run_for

use std::time::{Duration, Instant};

use serde_json::json;

use kinetic_core::prelude::*;

use crate::render::{HeadlessRenderer, Renderer};
use crate::world::GameWorld;

/// Ticks between two debug statistics reports.
const DEBUG_STATS_PERIOD: u64 = 30;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time step in seconds used by [`TickScheduler::run_ticks`]. Must be
    /// positive and finite.
    pub fixed_dt: f64,
    /// Real-time frame rate cap. Zero or non-finite disables pacing.
    pub max_fps: f64,
    /// Upper bound for a measured real-time step, in seconds.
    pub max_frame_dt: f64,
    /// Headless mode: no draw callback, no pacing, fixed time steps.
    pub headless: bool,
    /// Install the debug statistics behavior.
    pub debug: bool,
}

impl Default for TickConfig {
    /// 60 Hz, capped at 60 fps, not headless, no debug statistics.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_fps: 60.0,
            max_frame_dt: 0.25,
            headless: false,
            debug: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics / FrameReport
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last frame.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    pub physics_time: Duration,
    /// Collision dispatch plus the behavior pass.
    pub behavior_time: Duration,
    /// Placing visuals plus the draw callback.
    pub render_time: Duration,
    pub total_time: Duration,
}

/// Outcome of one frame.
#[derive(Debug)]
pub struct FrameReport {
    /// Index of the frame (0 for the first).
    pub tick: u64,
    pub dt: f64,
    pub contacts: usize,
    pub collision_callbacks: usize,
    /// The behavior pass, or the hook error that cut it short.
    pub pass: Result<PassReport, BehaviorError>,
    /// Game logic asked the loop to stop during this frame.
    pub stopped: bool,
}

impl FrameReport {
    pub fn is_ok(&self) -> bool {
        self.pass.is_ok()
    }
}

type DrawFn<R> = Box<dyn FnMut(&GameWorld<R>)>;
type ErrorHandler = Box<dyn FnMut(&BehaviorError)>;

// ---------------------------------------------------------------------------
// TickScheduler
// ---------------------------------------------------------------------------

/// Drives a [`GameWorld`] frame by frame.
pub struct TickScheduler<R: Renderer = HeadlessRenderer> {
    world: GameWorld<R>,
    config: TickConfig,
    /// Number of frames executed so far.
    tick_counter: u64,
    running: bool,
    last_frame: Option<Instant>,
    draw: Option<DrawFn<R>>,
    error_handler: Option<ErrorHandler>,
    last_diagnostics: TickDiagnostics,
}

impl<R: Renderer> TickScheduler<R> {
    /// Wrap `world`. Installs the debug statistics behavior if
    /// `config.debug` is set.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(mut world: GameWorld<R>, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        if config.debug {
            world.add_behavior(debug_stats_behavior());
        }
        Self {
            world,
            config,
            tick_counter: 0,
            running: false,
            last_frame: None,
            draw: None,
            error_handler: None,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Install the render callback, called once per frame after the
    /// behavior pass. Never called in headless mode.
    pub fn set_draw(&mut self, draw: impl FnMut(&GameWorld<R>) + 'static) {
        self.draw = Some(Box::new(draw));
    }

    /// Install the handler called once per frame in which a hook fails.
    pub fn set_error_handler(&mut self, handler: impl FnMut(&BehaviorError) + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    /// Run one frame with time step `dt` seconds.
    ///
    /// Hook failures never propagate: they are logged, passed to the error
    /// handler and returned in the report.
    pub fn step(&mut self, dt: f64) -> FrameReport {
        let frame_start = Instant::now();
        let tick = self.tick_counter;

        let outcome = self.world.step(dt);
        if let Err(err) = &outcome.pass {
            tracing::error!(
                tick,
                behavior = %err.behavior,
                hook = %err.hook,
                error = %format!("{:#}", err.source),
                "behavior hook failed; rest of the pass skipped"
            );
            if let Some(handler) = self.error_handler.as_mut() {
                handler(err);
            }
        }

        let draw_start = Instant::now();
        if !self.config.headless {
            if let Some(draw) = self.draw.as_mut() {
                draw(&self.world);
            }
        }
        let draw_time = draw_start.elapsed();

        self.tick_counter += 1;
        let stopped = self.world.take_stop_request();
        if stopped {
            tracing::debug!(tick, "stop requested by game logic");
            self.running = false;
        }

        self.last_diagnostics = TickDiagnostics {
            physics_time: outcome.physics_time,
            behavior_time: outcome.behavior_time,
            render_time: outcome.render_time + draw_time,
            total_time: frame_start.elapsed(),
        };

        FrameReport {
            tick,
            dt,
            contacts: outcome.contacts,
            collision_callbacks: outcome.collision_callbacks,
            pass: outcome.pass,
            stopped,
        }
    }

    /// Run `count` frames with the fixed time step. Returns the number of
    /// frames in which a hook failed.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut failed = 0u64;
        for _ in 0..count {
            if !self.step(self.config.fixed_dt).is_ok() {
                failed += 1;
            }
        }
        failed
    }

    // -- real-time loop -----------------------------------------------------

    /// Start the real-time loop.
    pub fn start(&mut self) {
        self.running = true;
        self.last_frame = None;
    }

    /// Stop the real-time loop. [`frame`](Self::frame) returns `None` until
    /// the next [`start`](Self::start).
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one real-time frame, sleeping first if the previous frame was
    /// less than `1 / max_fps` ago. `None` if the loop is not running.
    pub fn frame(&mut self) -> Option<FrameReport> {
        if !self.running {
            return None;
        }
        if let (Some(last), Some(interval)) = (self.last_frame, self.min_frame_interval()) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }

        let now = Instant::now();
        let dt = match self.last_frame {
            Some(last) if !self.config.headless => now
                .duration_since(last)
                .as_secs_f64()
                .min(self.config.max_frame_dt),
            _ => self.config.fixed_dt,
        };
        self.last_frame = Some(now);
        Some(self.step(dt))
    }

    /// Start the loop and run up to `frames` real-time frames. Returns the
    /// number of frames run, which is smaller if game logic stopped the loop.
    pub fn run_for(&mut self, frames: u64) -> u64 {
        self.start();
        let mut ran = 0;
        while ran < frames && self.frame().is_some() {
            ran += 1;
        }
        ran
    }

    fn min_frame_interval(&self) -> Option<Duration> {
        let fps = self.config.max_fps;
        if self.config.headless || !(fps > 0.0 && fps.is_finite()) {
            return None;
        }
        Some(Duration::from_secs_f64(1.0 / fps))
    }

    // -- accessors ----------------------------------------------------------

    /// The number of frames executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds.
    ///
    /// Computed as `tick_count * fixed_dt` to avoid floating-point drift from
    /// repeated addition. Exact for loops driven by [`run_ticks`](Self::run_ticks).
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn world(&self) -> &GameWorld<R> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut GameWorld<R> {
        &mut self.world
    }

    /// Diagnostics from the last frame.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }
}

/// Looping behavior that averages the behavior pass time over
/// [`DEBUG_STATS_PERIOD`] ticks and logs it with the world's counts.
fn debug_stats_behavior() -> BehaviorSpec {
    BehaviorSpec::new()
        .id(DEBUG_BEHAVIOR_ID)
        .duration(DEBUG_STATS_PERIOD as f64)
        .looping(true)
        .data(json!({ "samples": 0, "total_us": 0 }))
        .on_update(|ctx| {
            let micros = u64::try_from(ctx.frame().last_pass_time.as_micros()).unwrap_or(u64::MAX);
            let samples = ctx.data["samples"].as_u64().unwrap_or(0) + 1;
            let total = ctx.data["total_us"].as_u64().unwrap_or(0).saturating_add(micros);
            ctx.data["samples"] = json!(samples);
            ctx.data["total_us"] = json!(total);
            Ok(())
        })
        .on_complete(|ctx| {
            let samples = ctx.data["samples"].as_u64().unwrap_or(0).max(1);
            let average_us = ctx.data["total_us"].as_u64().unwrap_or(0) / samples;
            tracing::debug!(
                average_pass_us = average_us,
                behaviors = ctx.frame().behavior_count,
                entities = ctx.entities.len(),
                "behavior pass statistics"
            );
            ctx.data["average_us"] = json!(average_us);
            ctx.data["samples"] = json!(0);
            ctx.data["total_us"] = json!(0);
            Ok(())
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn scheduler(config: TickConfig) -> TickScheduler {
        TickScheduler::new(GameWorld::headless(WorldConfig::default()), config)
    }

    fn headless() -> TickConfig {
        TickConfig {
            headless: true,
            ..Default::default()
        }
    }

    // -- 1. Construction and defaults ---------------------------------------

    #[test]
    fn new_scheduler_starts_at_zero() {
        let scheduler = scheduler(TickConfig::default());
        assert_eq!(scheduler.tick_count(), 0);
        assert_eq!(scheduler.sim_time(), 0.0);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn default_config_is_60hz() {
        let config = TickConfig::default();
        assert!((config.fixed_dt - 1.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(config.max_fps, 60.0);
        assert!(!config.headless);
        assert!(!config.debug);
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        scheduler(TickConfig {
            fixed_dt: 0.0,
            ..Default::default()
        });
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn nan_dt_panics() {
        scheduler(TickConfig {
            fixed_dt: f64::NAN,
            ..Default::default()
        });
    }

    // -- 2. Fixed ticks -----------------------------------------------------

    #[test]
    fn sim_time_computed_not_accumulated() {
        let mut scheduler = scheduler(TickConfig {
            fixed_dt: 0.1,
            ..headless()
        });
        scheduler.run_ticks(1000);
        assert_eq!(scheduler.tick_count(), 1000);
        assert_eq!(scheduler.sim_time(), 1000.0 * 0.1);
    }

    #[test]
    fn behaviors_receive_fixed_dt() {
        let mut scheduler = scheduler(headless());
        let seen = Rc::new(Cell::new(0.0));
        let s = Rc::clone(&seen);
        scheduler.world_mut().add_behavior(BehaviorSpec::new().on_update(move |ctx| {
            s.set(ctx.delta_time());
            Ok(())
        }));
        scheduler.run_ticks(1);
        assert_eq!(seen.get(), 1.0 / 60.0);
    }

    // -- 3. Failure isolation -----------------------------------------------

    #[test]
    fn hook_failure_is_reported_and_next_tick_resumes() {
        let mut scheduler = scheduler(headless());
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&errors);
        scheduler.set_error_handler(move |err| e.borrow_mut().push(err.behavior.to_string()));

        let failed_once = Rc::new(Cell::new(false));
        let f = Rc::clone(&failed_once);
        scheduler.world_mut().add_behavior(BehaviorSpec::new().id("flaky").on_update(move |_| {
            if !f.replace(true) {
                anyhow::bail!("first frame fails");
            }
            Ok(())
        }));
        let ran = Rc::new(Cell::new(0));
        let r = Rc::clone(&ran);
        scheduler.world_mut().add_behavior(BehaviorSpec::new().on_update(move |_| {
            r.set(r.get() + 1);
            Ok(())
        }));

        let first = scheduler.step(1.0 / 60.0);
        assert!(!first.is_ok());
        assert_eq!(ran.get(), 0);

        assert_eq!(scheduler.run_ticks(2), 0);
        assert_eq!(ran.get(), 2);
        assert_eq!(*errors.borrow(), vec!["flaky".to_owned()]);
        assert_eq!(scheduler.tick_count(), 3);
    }

    // -- 4. Draw callback ---------------------------------------------------

    #[test]
    fn draw_runs_once_per_frame() {
        let mut scheduler = scheduler(TickConfig::default());
        let draws = Rc::new(Cell::new(0));
        let d = Rc::clone(&draws);
        scheduler.set_draw(move |_| d.set(d.get() + 1));
        scheduler.run_ticks(5);
        assert_eq!(draws.get(), 5);
    }

    #[test]
    fn headless_skips_draw() {
        let mut scheduler = scheduler(headless());
        let draws = Rc::new(Cell::new(0));
        let d = Rc::clone(&draws);
        scheduler.set_draw(move |_| d.set(d.get() + 1));
        scheduler.run_ticks(5);
        assert_eq!(draws.get(), 0);
        assert!(scheduler.is_headless());
    }

    // -- 5. Real-time loop --------------------------------------------------

    #[test]
    fn frame_requires_start() {
        let mut scheduler = scheduler(headless());
        assert!(scheduler.frame().is_none());
        scheduler.start();
        assert!(scheduler.frame().is_some());
        scheduler.stop();
        assert!(scheduler.frame().is_none());
    }

    #[test]
    fn stop_command_ends_run_for() {
        let mut scheduler = scheduler(headless());
        scheduler.world_mut().add_behavior(BehaviorSpec::new().on_update(|ctx| {
            if ctx.counter() == 1 {
                ctx.commands.stop();
            }
            Ok(())
        }));
        assert_eq!(scheduler.run_for(10), 2);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.tick_count(), 2);
    }

    #[test]
    fn real_time_frames_clamp_dt() {
        let mut scheduler = scheduler(TickConfig {
            max_fps: 0.0,
            max_frame_dt: 0.05,
            ..Default::default()
        });
        scheduler.start();
        let first = scheduler.frame().unwrap();
        assert_eq!(first.dt, 1.0 / 60.0);
        std::thread::sleep(Duration::from_millis(80));
        let second = scheduler.frame().unwrap();
        assert_eq!(second.dt, 0.05);
    }

    #[test]
    fn frames_are_paced_to_max_fps() {
        let mut scheduler = scheduler(TickConfig {
            max_fps: 100.0,
            ..Default::default()
        });
        let start = Instant::now();
        assert_eq!(scheduler.run_for(4), 4);
        // Three paced intervals of 10 ms.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    // -- 6. Diagnostics -----------------------------------------------------

    #[test]
    fn diagnostics_record_timing() {
        let mut scheduler = scheduler(headless());
        scheduler.world_mut().add_behavior(BehaviorSpec::new().on_update(|_| {
            std::thread::sleep(Duration::from_millis(2));
            Ok(())
        }));
        scheduler.run_ticks(1);
        let diag = scheduler.last_diagnostics();
        assert!(diag.behavior_time >= Duration::from_millis(2));
        assert!(diag.total_time >= diag.behavior_time);
    }

    // -- 7. Debug statistics ------------------------------------------------

    #[test]
    fn debug_behavior_is_hidden_and_reports() {
        let mut scheduler = scheduler(TickConfig {
            debug: true,
            ..headless()
        });
        let behaviors = scheduler.world().behaviors();
        assert!(behaviors.get_behavior(DEBUG_BEHAVIOR_ID).is_some());
        assert!(behaviors.get_all_behaviors().is_empty());

        scheduler.run_ticks(DEBUG_STATS_PERIOD + 1);
        let debug = scheduler
            .world()
            .behaviors()
            .get_behavior(DEBUG_BEHAVIOR_ID)
            .unwrap();
        assert!(debug.data().get("average_us").is_some());
        assert_eq!(debug.data()["samples"], json!(0));
    }
}
