//! Render Loop
//!
//! Schedules the effect renderer in one of two mutually exclusive modes:
//!
//! - **Processing**: a fixed tick (50 ms). Each tick reads the pipeline
//!   signals, advances the progress simulator, publishes the visible value
//!   and renders the still frame at the simulator's drive. On `Done` it
//!   clears the canvas and reveals the artifact; on a frozen error frame it
//!   draws that frame once more and stops, leaving it on screen.
//! - **Preview**: once per display refresh, renders the live camera frame at
//!   a fixed low drive.
//!
//! Switching modes cancels the old task and hands the canvas to the new one
//! through a fresh [`CanvasLease`], so a late tick from the old mode cannot
//! draw. Every processing tick also checks that its session is still the live
//! one. Each mode runs as a single task, so ticks never overlap.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::canvas::{CanvasHandle, CanvasLease};
use crate::effect::EffectRenderer;
use crate::events::StudioEvent;
use crate::frame::SourceFrameProvider;
use crate::pipeline::{MessageDetail, RunSignals};
use crate::progress::{Phase, ProgressSimulator, RevealFade};
use crate::session::{SessionId, SessionSlot};

const PROCESSING_LEASE: &str = "processing";
const PREVIEW_LEASE: &str = "preview";

/// Highest display refresh rate [`IntervalRefresh`] honours
pub const MAX_PREVIEW_FPS: u32 = 1_000;

/// Scheduler tuning
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Processing tick
    pub tick: Duration,
    /// Display refresh rate used by [`IntervalRefresh`]
    pub preview_fps: u32,
    /// Drive for the live preview
    pub preview_drive: f32,
    /// Fade announced with the revealed artifact
    pub reveal_fade: RevealFade,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            preview_fps: 60,
            preview_drive: 10.0,
            reveal_fade: RevealFade::default(),
        }
    }
}

/// Which mode owns the canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Nothing scheduled
    Stopped,
    /// Fixed-tick progress rendering
    Processing,
    /// Display-refresh live preview
    Preview,
}

// ============================================================================
// Display Refresh
// ============================================================================

/// Source of display refresh callbacks
pub trait DisplayRefresh: Send + Sync {
    /// A stream yielding once per refresh
    fn refreshes(&self) -> BoxStream<'static, ()>;
}

/// Refresh signal from a fixed-rate timer
#[derive(Clone, Copy, Debug)]
pub struct IntervalRefresh {
    period: Duration,
}

impl IntervalRefresh {
    /// Refresh `fps` times per second, clamped to `1..=MAX_PREVIEW_FPS`
    #[must_use]
    pub fn from_fps(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.clamp(1, MAX_PREVIEW_FPS),
        }
    }

    /// Refresh period
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl DisplayRefresh for IntervalRefresh {
    fn refreshes(&self) -> BoxStream<'static, ()> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        stream::unfold(interval, |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        })
        .boxed()
    }
}

// ============================================================================
// Processing Job
// ============================================================================

/// Everything a processing run needs
pub struct ProcessingJob {
    session: SessionId,
    source: Arc<dyn SourceFrameProvider>,
    signals: watch::Receiver<RunSignals>,
    simulator: ProgressSimulator,
    message_detail: MessageDetail,
}

impl ProcessingJob {
    /// Bundle a started simulator with the run it tracks
    pub fn new(
        session: SessionId,
        source: Arc<dyn SourceFrameProvider>,
        signals: watch::Receiver<RunSignals>,
        simulator: ProgressSimulator,
    ) -> Self {
        Self {
            session,
            source,
            signals,
            simulator,
            message_detail: MessageDetail::Generic,
        }
    }

    /// Choose how much error detail the user sees
    #[must_use]
    pub fn with_message_detail(mut self, detail: MessageDetail) -> Self {
        self.message_detail = detail;
        self
    }
}

// ============================================================================
// Render Loop
// ============================================================================

struct ActiveMode {
    mode: RenderMode,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of the two render schedules
pub struct RenderLoop {
    config: RenderConfig,
    renderer: Arc<EffectRenderer>,
    canvas: CanvasHandle,
    sessions: SessionSlot,
    events: mpsc::UnboundedSender<StudioEvent>,
    refresh: Arc<dyn DisplayRefresh>,
    active: Mutex<Option<ActiveMode>>,
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("config", &self.config)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl RenderLoop {
    /// Create a stopped loop
    pub fn new(
        config: RenderConfig,
        renderer: Arc<EffectRenderer>,
        canvas: CanvasHandle,
        sessions: SessionSlot,
        events: mpsc::UnboundedSender<StudioEvent>,
        refresh: Arc<dyn DisplayRefresh>,
    ) -> Self {
        Self {
            config,
            renderer,
            canvas,
            sessions,
            events,
            refresh,
            active: Mutex::new(None),
        }
    }

    /// Mode whose task is still running
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        match &*self.active.lock() {
            Some(active) if !active.task.is_finished() => active.mode,
            _ => RenderMode::Stopped,
        }
    }

    /// Stop whichever mode is running. Safe to call repeatedly.
    pub fn stop(&self) {
        let previous = self.active.lock().take();
        if let Some(active) = previous {
            active.token.cancel();
            if !active.task.is_finished() {
                tracing::debug!(mode = ?active.mode, "Render mode stopped");
            }
            self.canvas.revoke();
        }
    }

    /// Switch to processing mode for `job`
    pub fn start_processing(&self, job: ProcessingJob) {
        self.stop();
        let lease = self.canvas.acquire(PROCESSING_LEASE);
        let token = CancellationToken::new();
        tracing::info!(session = %job.session, tick_ms = self.config.tick.as_millis(), "Processing render started");

        let task = tokio::spawn(run_processing(
            job,
            lease,
            Arc::clone(&self.renderer),
            self.sessions.clone(),
            self.events.clone(),
            self.config.clone(),
            token.clone(),
        ));
        *self.active.lock() = Some(ActiveMode {
            mode: RenderMode::Processing,
            token,
            task,
        });
    }

    /// Switch to live preview of `feed`
    pub fn start_preview(&self, feed: Arc<dyn SourceFrameProvider>) {
        self.stop();
        let lease = self.canvas.acquire(PREVIEW_LEASE);
        let token = CancellationToken::new();
        tracing::info!(drive = self.config.preview_drive, "Live preview started");

        let task = tokio::spawn(run_preview(
            feed,
            lease,
            Arc::clone(&self.renderer),
            self.refresh.refreshes(),
            self.config.preview_drive,
            token.clone(),
        ));
        *self.active.lock() = Some(ActiveMode {
            mode: RenderMode::Preview,
            token,
            task,
        });
        emit(&self.events, StudioEvent::PreviewStarted);
    }

    /// Stop the live preview if it is the running mode
    pub fn stop_preview(&self) -> bool {
        if self.mode() != RenderMode::Preview {
            return false;
        }
        self.stop();
        emit(&self.events, StudioEvent::PreviewStopped);
        true
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.token.cancel();
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<StudioEvent>, event: StudioEvent) {
    if events.send(event).is_err() {
        tracing::trace!("Event receiver dropped");
    }
}

async fn run_processing(
    mut job: ProcessingJob,
    lease: CanvasLease,
    renderer: Arc<EffectRenderer>,
    sessions: SessionSlot,
    events: mpsc::UnboundedSender<StudioEvent>,
    config: RenderConfig,
    token: CancellationToken,
) {
    let session = job.session;
    let mut interval = tokio::time::interval(config.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut described = false;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        if !sessions.is_live(session) {
            tracing::debug!(session = %session, "Processing tick for stale session ignored");
            break;
        }

        let signals = job.signals.borrow().clone();
        if !described {
            if let Some(text) = &signals.description {
                emit(
                    &events,
                    StudioEvent::Described {
                        session,
                        text: text.clone(),
                    },
                );
                described = true;
            }
        }

        let frame = job.simulator.tick(signals.result_ready, signals.has_error());
        emit(
            &events,
            StudioEvent::Progress {
                session,
                visible: frame.visible,
                phase: frame.phase,
            },
        );

        if frame.phase == Phase::Done {
            if lease.draw(|canvas| canvas.clear()).is_none() {
                break;
            }
            if let Some(artifact) = signals.artifact {
                if sessions.succeed(session, Arc::clone(&artifact)) {
                    tracing::info!(session = %session, "Result revealed");
                    emit(
                        &events,
                        StudioEvent::Revealed {
                            session,
                            artifact,
                            fade: config.reveal_fade,
                        },
                    );
                }
            }
            break;
        }

        let drawn = lease.draw(|canvas| renderer.render(canvas, job.source.as_ref(), frame.drive));
        if drawn.is_none() {
            tracing::debug!(session = %session, "Processing lease revoked");
            break;
        }

        if frame.frozen {
            if let Some(error) = signals.error {
                let message = error.user_message(job.message_detail);
                let kind = error.kind();
                if sessions.fail(session, error) {
                    tracing::info!(session = %session, visible = frame.visible, %kind, "Run failed, frame kept");
                    emit(
                        &events,
                        StudioEvent::Failed {
                            session,
                            message,
                            kind,
                        },
                    );
                }
            }
            break;
        }
    }
}

async fn run_preview(
    feed: Arc<dyn SourceFrameProvider>,
    lease: CanvasLease,
    renderer: Arc<EffectRenderer>,
    mut refreshes: BoxStream<'static, ()>,
    drive: f32,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = refreshes.next() => {
                if next.is_none() {
                    break;
                }
            }
        }

        if lease
            .draw(|canvas| renderer.render(canvas, feed.as_ref(), drive))
            .is_none()
        {
            break;
        }
    }
}
