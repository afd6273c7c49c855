//! Studio - The Composition Root
//!
//! The studio wires the pipeline, the progress simulator and the render loop
//! together and exposes the handful of actions a surface can take: process a
//! photo, capture from the camera, retry, cancel. It owns the single live
//! [`RunSession`] and forwards everything it observes as [`StudioEvent`]s.
//!
//! # Architecture
//!
//! ```text
//!   Surface ──actions──▶ Studio ──▶ PipelineOrchestrator ──▶ ImageService
//!      ▲                   │              │ watch<RunSignals>
//!      │                   ▼              ▼
//!      └───StudioEvent─── RenderLoop ◀── ProgressSimulator
//!                          │
//!                          ▼
//!                        Canvas
//! ```
//!
//! Starting a run always replaces the session in the [`SessionSlot`] first,
//! which cancels the previous run's token; the render loop checks the slot on
//! every tick, so leftovers from the old run become no-ops.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::acquire::{self, AcquireError, STILL_HEIGHT, STILL_WIDTH};
use crate::backend::ImageService;
use crate::canvas::CanvasHandle;
use crate::clock::{Clock, RandomSource, ThreadRandom, TokioClock};
use crate::config::DarkroomConfig;
use crate::effect::EffectRenderer;
use crate::events::StudioEvent;
use crate::frame::{LiveFeed, SourceFrame, StillFrame};
use crate::pipeline::{MessageDetail, PipelineError, PipelineOrchestrator, RunHandle};
use crate::progress::{ProgressConfig, ProgressSimulator};
use crate::render_loop::{DisplayRefresh, IntervalRefresh, ProcessingJob, RenderLoop, RenderMode};
use crate::session::{RunSession, SessionId, SessionSlot, SessionStatus};

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Studio`] from configuration and collaborators
pub struct StudioBuilder {
    service: Arc<dyn ImageService>,
    config: DarkroomConfig,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    refresh: Option<Arc<dyn DisplayRefresh>>,
    canvas_size: (u32, u32),
}

impl StudioBuilder {
    /// Start from a service and the default configuration
    pub fn new(service: Arc<dyn ImageService>) -> Self {
        Self {
            service,
            config: DarkroomConfig::default(),
            clock: Arc::new(TokioClock),
            random: Arc::new(ThreadRandom),
            refresh: None,
            canvas_size: (STILL_WIDTH, STILL_HEIGHT),
        }
    }

    /// Use a loaded configuration
    #[must_use]
    pub fn config(mut self, config: DarkroomConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the time source
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the slowdown threshold draw
    #[must_use]
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Drive the live preview from a custom refresh signal
    #[must_use]
    pub fn display_refresh(mut self, refresh: Arc<dyn DisplayRefresh>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Initial container size of the canvas
    #[must_use]
    pub fn canvas_size(mut self, width: u32, height: u32) -> Self {
        self.canvas_size = (width, height);
        self
    }

    /// Build the studio and the receiving end of its event stream
    pub fn build(self) -> (Studio, mpsc::UnboundedReceiver<StudioEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let canvas = CanvasHandle::new(self.canvas_size.0, self.canvas_size.1);
        let sessions = SessionSlot::new();
        let refresh = self
            .refresh
            .unwrap_or_else(|| Arc::new(IntervalRefresh::from_fps(self.config.render.preview_fps)));

        let render = RenderLoop::new(
            self.config.render.clone(),
            Arc::new(EffectRenderer::new(self.config.effect.clone())),
            canvas.clone(),
            sessions.clone(),
            events.clone(),
            refresh,
        );
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            self.service,
            self.config.retry.clone(),
        ));

        let studio = Studio {
            orchestrator,
            render,
            canvas,
            sessions,
            events,
            clock: self.clock,
            random: self.random,
            progress: self.config.progress.clone(),
            message_detail: self.config.message_detail,
            camera: Mutex::new(None),
            last_frame: Mutex::new(None),
            current_run: Mutex::new(None),
        };
        (studio, rx)
    }
}

// ============================================================================
// Studio
// ============================================================================

/// Owner of one photo-processing surface
pub struct Studio {
    orchestrator: Arc<PipelineOrchestrator>,
    render: RenderLoop,
    canvas: CanvasHandle,
    sessions: SessionSlot,
    events: mpsc::UnboundedSender<StudioEvent>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    progress: ProgressConfig,
    message_detail: MessageDetail,
    camera: Mutex<Option<Arc<LiveFeed>>>,
    last_frame: Mutex<Option<Arc<SourceFrame>>>,
    current_run: Mutex<Option<RunHandle>>,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("orchestrator", &self.orchestrator)
            .field("render", &self.render)
            .field("session", &self.sessions.current_id())
            .field("camera_open", &self.camera.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Studio {
    /// Shorthand for [`StudioBuilder::new`]
    pub fn builder(service: Arc<dyn ImageService>) -> StudioBuilder {
        StudioBuilder::new(service)
    }

    // ========================================================================
    // Run Actions
    // ========================================================================

    /// Start a run on an acquired still, replacing any run in progress
    pub fn process(&self, frame: SourceFrame) -> SessionId {
        self.start_run(Arc::new(frame))
    }

    /// Acquire a photo file, then start a run on it
    ///
    /// # Errors
    ///
    /// Acquisition errors; no run is started and the current state is kept.
    pub async fn process_file(&self, path: impl AsRef<Path>) -> Result<SessionId, AcquireError> {
        let frame = acquire::load_still(path).await?;
        Ok(self.process(frame))
    }

    /// Snapshot the open camera, close it, then start a run on the snapshot
    ///
    /// # Errors
    ///
    /// [`AcquireError::NotReady`] when no camera is open or it has not
    /// produced a frame yet.
    pub fn capture(&self) -> Result<SessionId, AcquireError> {
        let feed = self.camera.lock().clone().ok_or(AcquireError::NotReady)?;
        let frame = acquire::capture_live(feed.as_ref())?;
        self.close_camera();
        Ok(self.process(frame))
    }

    /// Run the last processed photo again
    ///
    /// Returns `None` when there is nothing to retry (nothing processed yet,
    /// or the photo was discarded by [`cancel`](Self::cancel)).
    pub fn retry(&self) -> Option<SessionId> {
        let frame = self.last_frame.lock().clone()?;
        tracing::info!("Retrying last photo");
        Some(self.start_run(frame))
    }

    /// Stop everything and discard run state
    ///
    /// Cancels the network calls, stops both render modes, clears the
    /// canvas, forgets the photo and releases the camera. The cancelled run
    /// emits nothing further.
    pub fn cancel(&self) {
        let cancelled = self.sessions.cancel();
        self.orchestrator.cancel_current();
        if let Some(run) = self.current_run.lock().take() {
            run.cancel();
        }

        let was_previewing = self.render.mode() == RenderMode::Preview;
        self.render.stop();
        if self.camera.lock().take().is_some() && was_previewing {
            self.emit(StudioEvent::PreviewStopped);
        }
        self.canvas.clear_if_unowned();
        self.last_frame.lock().take();

        match cancelled {
            Some(session) => tracing::info!(session = %session, "Run cancelled"),
            None => tracing::debug!("Cancel with no live run"),
        }
        self.emit(StudioEvent::Reset);
    }

    // ========================================================================
    // Camera
    // ========================================================================

    /// Open a camera feed and show its live preview
    ///
    /// Any live run is cancelled and a displayed error is cleared first.
    pub fn open_camera(&self, feed: Arc<LiveFeed>) {
        let discarded = self.sessions.cancel();
        self.orchestrator.cancel_current();
        if let Some(run) = self.current_run.lock().take() {
            run.cancel();
        }
        if let Some(session) = discarded {
            tracing::debug!(session = %session, "Session discarded for camera");
            self.emit(StudioEvent::Reset);
        }

        *self.camera.lock() = Some(Arc::clone(&feed));
        self.render.start_preview(feed);
    }

    /// Close the camera. Returns false when none was open.
    ///
    /// The canvas is cleared unless a run or an error frame holds it.
    pub fn close_camera(&self) -> bool {
        let Some(feed) = self.camera.lock().take() else {
            return false;
        };
        feed.clear();
        self.render.stop_preview();

        let error_shown = self.sessions.current_status() == Some(SessionStatus::Failed);
        if !error_shown && !self.sessions.has_live() {
            self.canvas.clear_if_unowned();
        }
        tracing::debug!("Camera closed");
        true
    }

    /// Stop all work and wait for the pipeline task to wind down
    pub async fn shutdown(&self) {
        self.sessions.cancel();
        self.orchestrator.cancel_current();
        self.render.stop();
        self.camera.lock().take();

        let run = self.current_run.lock().take();
        if let Some(run) = run {
            run.cancel();
            run.join().await;
        }
        tracing::info!("Studio shut down");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The shared canvas
    #[must_use]
    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    /// ID of the session in the slot
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.sessions.current_id()
    }

    /// Status of the session in the slot
    #[must_use]
    pub fn session_status(&self) -> Option<SessionStatus> {
        self.sessions.current_status()
    }

    /// Error of the current session, if it failed
    #[must_use]
    pub fn current_error(&self) -> Option<PipelineError> {
        self.sessions.current_error()
    }

    /// Which render mode is running
    #[must_use]
    pub fn render_mode(&self) -> RenderMode {
        self.render.mode()
    }

    /// Whether a camera feed is open
    #[must_use]
    pub fn camera_open(&self) -> bool {
        self.camera.lock().is_some()
    }

    /// Whether a photo is kept for [`retry`](Self::retry)
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.last_frame.lock().is_some()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn start_run(&self, frame: Arc<SourceFrame>) -> SessionId {
        if self.camera_open() {
            self.close_camera();
        }
        *self.last_frame.lock() = Some(Arc::clone(&frame));

        let mut simulator = ProgressSimulator::new(
            self.progress.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.random),
        );
        let threshold = simulator.start();

        let run = self.orchestrator.start(Arc::clone(&frame));
        let session = self.sessions.replace(RunSession::new(
            self.clock.now(),
            threshold,
            run.token().clone(),
        ));
        tracing::info!(
            session = %session,
            slowdown_threshold_pct = threshold,
            width = frame.width(),
            height = frame.height(),
            "Run started"
        );
        self.emit(StudioEvent::Started { session });

        let job = ProcessingJob::new(
            session,
            Arc::new(StillFrame::new(frame)),
            run.signals(),
            simulator,
        )
        .with_message_detail(self.message_detail);
        self.render.start_processing(job);

        *self.current_run.lock() = Some(run);
        session
    }

    fn emit(&self, event: StudioEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::backend::mock::ScriptedService;
    use crate::backend::GeneratedArtifact;
    use crate::clock::FixedRandom;
    use crate::pipeline::ErrorKind;

    fn photo() -> SourceFrame {
        SourceFrame::still(RgbaImage::from_pixel(70, 100, Rgba([180, 90, 30, 255])))
    }

    fn artifact() -> GeneratedArtifact {
        GeneratedArtifact::new(vec![0x89, 0x50], "image/png")
    }

    fn studio(service: ScriptedService) -> (Studio, mpsc::UnboundedReceiver<StudioEvent>, Arc<ScriptedService>) {
        let service = Arc::new(service);
        let (studio, rx) = Studio::builder(service.clone())
            .random(Arc::new(FixedRandom(80)))
            .canvas_size(70, 100)
            .build();
        (studio, rx, service)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StudioEvent>) -> Vec<StudioEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_success_reveals() {
        let (studio, mut rx, _service) = studio(ScriptedService::succeeding("a red barn"));
        let id = studio.process(photo());
        assert_eq!(studio.render_mode(), RenderMode::Processing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(studio.session_status(), Some(SessionStatus::Succeeded));
        assert_eq!(studio.render_mode(), RenderMode::Stopped);

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(StudioEvent::Started { session }) if *session == id));
        assert!(matches!(events.last(), Some(StudioEvent::Revealed { .. })));
        assert!(events.iter().all(|e| e.session().map_or(true, |s| s == id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_frame_and_allows_retry() {
        let service = ScriptedService::default()
            .describe_ok("a quiet street")
            .generate_status(403)
            .describe_ok("a quiet street")
            .generate_ok(artifact());
        let (studio, mut rx, service) = studio(service);

        studio.process(photo());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(studio.session_status(), Some(SessionStatus::Failed));
        assert_eq!(studio.current_error().map(|e| e.kind()), Some(ErrorKind::Forbidden));
        assert!(!studio.canvas().with_canvas(|c| c.is_blank()));
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, StudioEvent::Failed { kind: ErrorKind::Forbidden, .. })));

        assert!(studio.can_retry());
        let second = studio.retry().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(studio.current_session(), Some(second));
        assert_eq!(studio.session_status(), Some(SessionStatus::Succeeded));
        assert_eq!(service.describe_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_silent_and_forgets_photo() {
        let service = ScriptedService::succeeding("a cat").with_generate_latency(Duration::from_secs(30));
        let (studio, mut rx, _service) = studio(service);

        studio.process(photo());
        tokio::time::sleep(Duration::from_secs(5)).await;
        drain(&mut rx);

        studio.cancel();
        assert_eq!(studio.current_session(), None);
        assert_eq!(studio.render_mode(), RenderMode::Stopped);
        assert!(studio.canvas().with_canvas(|c| c.is_blank()));
        assert!(!studio.can_retry());
        assert!(studio.retry().is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [StudioEvent::Reset]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_supersedes_old() {
        let service = ScriptedService::default()
            .describe_ok("first")
            .with_generate_latency(Duration::from_secs(10))
            .generate_ok(artifact())
            .describe_ok("second")
            .generate_ok(artifact());
        let (studio, mut rx, _service) = studio(service);

        let first = studio.process(photo());
        tokio::time::sleep(Duration::from_secs(3)).await;
        let second = studio.process(photo());
        tokio::time::sleep(Duration::from_secs(30)).await;

        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, StudioEvent::Revealed { session, .. } | StudioEvent::Failed { session, .. } if *session == first)));
        assert!(events
            .iter()
            .any(|e| matches!(e, StudioEvent::Revealed { session, .. } if *session == second)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_preview_and_capture() {
        let (studio, mut rx, _service) = studio(ScriptedService::succeeding("a window"));
        assert!(matches!(studio.capture(), Err(AcquireError::NotReady)));

        let feed = Arc::new(LiveFeed::new());
        studio.open_camera(feed.clone());
        assert!(studio.camera_open());
        assert_eq!(studio.render_mode(), RenderMode::Preview);
        assert!(matches!(studio.capture(), Err(AcquireError::NotReady)));

        feed.push(RgbaImage::from_pixel(1280, 720, Rgba([40, 80, 120, 255])));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!studio.canvas().with_canvas(|c| c.is_blank()));

        let id = studio.capture().unwrap();
        assert!(!studio.camera_open());
        assert_eq!(studio.render_mode(), RenderMode::Processing);
        assert_eq!(studio.current_session(), Some(id));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, StudioEvent::PreviewStarted)));
        assert!(events.iter().any(|e| matches!(e, StudioEvent::PreviewStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_camera_clears_error() {
        let (studio, mut rx, _service) = studio(ScriptedService::default().describe_status(500));
        studio.process(photo());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(studio.session_status(), Some(SessionStatus::Failed));
        drain(&mut rx);

        studio.open_camera(Arc::new(LiveFeed::new()));
        assert_eq!(studio.session_status(), None);
        assert_eq!(studio.render_mode(), RenderMode::Preview);
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(StudioEvent::Reset)));

        assert!(studio.close_camera());
        assert!(!studio.close_camera());
        assert!(studio.canvas().with_canvas(|c| c.is_blank()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_pipeline() {
        let service = ScriptedService::succeeding("x").with_describe_latency(Duration::from_secs(10));
        let (studio, _rx, _service) = studio(service);
        studio.process(photo());
        studio.shutdown().await;
        assert_eq!(studio.render_mode(), RenderMode::Stopped);
        assert_eq!(studio.current_session(), None);
    }
}
