//! Progress Simulator
//!
//! Produces the progress the user sees while the describe/generate pipeline
//! runs. The real pipeline reports nothing but "done" or "failed", so the
//! visible number is synthesized from elapsed time and made to look organic:
//!
//! ```text
//!  Idle ──start──▶ Ramping ──threshold──▶ Decelerating ──ceiling──▶ Stalled
//!                     │                        │                       │
//!                     └──────── result ────────┴──────── result ───────┴──▶ Sprinting ──100──▶ Done
//! ```
//!
//! - **Ramping**: linear against a nominal duration until a per-run random
//!   threshold (75-90 %).
//! - **Decelerating**: quadratic ease-out with a 1 % speed floor, capped at
//!   the pause ceiling (95 %).
//! - **Stalled**: visible frozen at the ceiling; drive oscillates on a sine
//!   so the preview keeps moving.
//! - **Sprinting**: linear from the value captured when the result arrived
//!   to 100 over a fixed short duration.
//! - An error before the result freezes both values for the rest of the run.
//!
//! `visible` never decreases within a run. `drive` is for the renderer only.

pub mod easing;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

pub use easing::{ease_out_quad_with_min_speed, EasingFunction, RevealFade};

use crate::clock::{Clock, RandomSource};

/// Simulator tuning
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressConfig {
    /// Time to reach 100 % if progress were never throttled
    pub nominal_duration: Duration,
    /// Lowest slowdown threshold, in percent
    pub slowdown_min_pct: u8,
    /// Highest slowdown threshold, in percent
    pub slowdown_max_pct: u8,
    /// Speed floor during deceleration, as a fraction of the linear rate
    pub min_speed_factor: f32,
    /// Visible progress never exceeds this until the result arrives
    pub pause_ceiling: f32,
    /// Period of the stall oscillation
    pub stall_period: Duration,
    /// Lower bound of the stall drive oscillation
    pub stall_drive_min: f32,
    /// Upper bound of the stall drive oscillation
    pub stall_drive_max: f32,
    /// Length of the final sprint to 100
    pub sprint_duration: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            nominal_duration: Duration::from_millis(15_000),
            slowdown_min_pct: 75,
            slowdown_max_pct: 90,
            min_speed_factor: 0.01,
            pause_ceiling: 95.0,
            stall_period: Duration::from_millis(2_000),
            stall_drive_min: 80.0,
            stall_drive_max: 95.0,
            sprint_duration: Duration::from_millis(400),
        }
    }
}

/// Simulator phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No run
    #[default]
    Idle,
    /// Linear climb
    Ramping,
    /// Eased climb toward the ceiling
    Decelerating,
    /// Holding at the ceiling
    Stalled,
    /// Racing to 100 after the result arrived
    Sprinting,
    /// Reached 100
    Done,
}

/// One tick's output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressFrame {
    /// User-facing percentage, monotonic within a run
    pub visible: f32,
    /// Renderer coarseness parameter
    pub drive: f32,
    /// Current phase
    pub phase: Phase,
    /// Set once an error froze the run
    pub frozen: bool,
}

#[derive(Debug)]
struct Sprint {
    started_at: Instant,
    from: f32,
}

#[derive(Debug)]
struct RunProgress {
    started_at: Instant,
    threshold_pct: u8,
    visible: f32,
    drive: f32,
    phase: Phase,
    sprint: Option<Sprint>,
    frozen: bool,
}

impl RunProgress {
    fn frame(&self) -> ProgressFrame {
        ProgressFrame {
            visible: self.visible,
            drive: self.drive,
            phase: self.phase,
            frozen: self.frozen,
        }
    }
}

/// Time-keyed progress state machine for one run at a time
pub struct ProgressSimulator {
    config: ProgressConfig,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    run: Option<RunProgress>,
}

impl std::fmt::Debug for ProgressSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSimulator")
            .field("config", &self.config)
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

impl ProgressSimulator {
    /// Create an idle simulator
    pub fn new(config: ProgressConfig, clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            config,
            clock,
            random,
            run: None,
        }
    }

    /// Simulator settings
    #[must_use]
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Begin a run now, drawing a fresh slowdown threshold
    ///
    /// Any previous run state is discarded. Returns the drawn threshold.
    pub fn start(&mut self) -> u8 {
        let lo = self.config.slowdown_min_pct;
        let hi = self.config.slowdown_max_pct.max(lo);
        let threshold_pct = self.random.uniform(lo..=hi);

        tracing::info!(slowdown_threshold_pct = threshold_pct, "Progress run started");

        self.run = Some(RunProgress {
            started_at: self.clock.now(),
            threshold_pct,
            visible: 0.0,
            drive: 0.0,
            phase: Phase::Ramping,
            sprint: None,
            frozen: false,
        });
        threshold_pct
    }

    /// Drop run state and return to idle
    pub fn reset(&mut self) {
        self.run = None;
    }

    /// Threshold drawn for the current run
    #[must_use]
    pub fn slowdown_threshold_pct(&self) -> Option<u8> {
        self.run.as_ref().map(|r| r.threshold_pct)
    }

    /// Last computed frame, without advancing
    #[must_use]
    pub fn frame(&self) -> ProgressFrame {
        self.run.as_ref().map(RunProgress::frame).unwrap_or_default()
    }

    /// Advance using the injected clock
    pub fn tick(&mut self, result_ready: bool, has_error: bool) -> ProgressFrame {
        let now = self.clock.now();
        self.advance(now, result_ready, has_error)
    }

    /// Advance to `now` given the pipeline's two signals
    ///
    /// `result_ready` wins over `has_error` when both are seen on the same
    /// call. Once an error has frozen the run, later signals are ignored.
    pub fn advance(&mut self, now: Instant, result_ready: bool, has_error: bool) -> ProgressFrame {
        let config = &self.config;
        let Some(run) = self.run.as_mut() else {
            return ProgressFrame::default();
        };

        if run.phase == Phase::Done || run.frozen {
            return run.frame();
        }

        let previous = run.phase;

        if result_ready {
            Self::sprint(config, run, now);
        } else if has_error {
            run.frozen = true;
            tracing::debug!(visible = run.visible, drive = run.drive, "Progress frozen on error");
            return run.frame();
        } else {
            Self::climb(config, run, now);
        }

        if run.phase != previous {
            tracing::debug!(from = ?previous, to = ?run.phase, visible = run.visible, "Progress phase change");
        }
        run.frame()
    }

    fn sprint(config: &ProgressConfig, run: &mut RunProgress, now: Instant) {
        let sprint = run.sprint.get_or_insert(Sprint {
            started_at: now,
            from: run.visible,
        });

        let fraction = if config.sprint_duration.is_zero() {
            1.0
        } else {
            (now.saturating_duration_since(sprint.started_at).as_secs_f32()
                / config.sprint_duration.as_secs_f32())
            .min(1.0)
        };

        let mut calculated = sprint.from + (100.0 - sprint.from) * fraction;
        if calculated >= 100.0 {
            calculated = 100.0;
        }

        run.visible = run.visible.max(calculated);
        run.drive = run.visible;
        run.phase = if run.visible >= 100.0 {
            Phase::Done
        } else {
            Phase::Sprinting
        };
    }

    fn climb(config: &ProgressConfig, run: &mut RunProgress, now: Instant) {
        let elapsed = now.saturating_duration_since(run.started_at);
        let linear = if config.nominal_duration.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f32() / config.nominal_duration.as_secs_f32()
        };
        let threshold = f32::from(run.threshold_pct) / 100.0;

        let (mut calculated, mut phase) = if linear < threshold {
            (linear * 100.0, Phase::Ramping)
        } else {
            let span = (1.0 - threshold).max(f32::EPSILON);
            let t = ((linear - threshold) / span).clamp(0.0, 1.0);
            let eased = ease_out_quad_with_min_speed(t, config.min_speed_factor);
            (
                threshold * 100.0 + (100.0 - threshold * 100.0) * eased,
                Phase::Decelerating,
            )
        };
        calculated = calculated.min(config.pause_ceiling);

        let drive = if calculated >= config.pause_ceiling {
            phase = Phase::Stalled;
            stall_drive(config, elapsed)
        } else {
            calculated
        };

        run.visible = run.visible.max(calculated);
        run.drive = drive;
        run.phase = phase;
    }
}

/// Sine oscillation between the stall bounds, phased from run start
fn stall_drive(config: &ProgressConfig, elapsed: Duration) -> f32 {
    let period = config.stall_period.as_secs_f64();
    let cycle = if period > 0.0 {
        (elapsed.as_secs_f64() % period) / period
    } else {
        0.0
    };
    let half_span = (config.stall_drive_max - config.stall_drive_min) / 2.0;
    #[allow(clippy::cast_possible_truncation)]
    let wave = (cycle * std::f64::consts::TAU).sin() as f32;
    config.stall_drive_min + half_span * (1.0 + wave)
}
