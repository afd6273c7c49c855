//! Run Sessions
//!
//! A [`RunSession`] is one end-to-end attempt on one photo. At most one is
//! live; [`SessionSlot`] holds it. Scheduled tasks carry the [`SessionId`]
//! they were started for and ask the slot before acting, so work left over
//! from a superseded session turns into a no-op.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::GeneratedArtifact;
use crate::pipeline::PipelineError;

/// Unique session identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to correlate log lines
        let s = self.0.to_string();
        write!(f, "{}", &s[..8])
    }
}

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Pipeline or render loop still working
    Running,
    /// Result revealed
    Succeeded,
    /// Fatal error shown
    Failed,
    /// Cancelled or superseded
    Cancelled,
}

/// One end-to-end attempt
#[derive(Debug)]
pub struct RunSession {
    id: SessionId,
    started_at: Instant,
    slowdown_threshold_pct: u8,
    token: CancellationToken,
    status: SessionStatus,
    result: Option<Arc<GeneratedArtifact>>,
    error: Option<PipelineError>,
}

impl RunSession {
    /// Create a running session
    #[must_use]
    pub fn new(started_at: Instant, slowdown_threshold_pct: u8, token: CancellationToken) -> Self {
        Self {
            id: SessionId::new(),
            started_at,
            slowdown_threshold_pct,
            token,
            status: SessionStatus::Running,
            result: None,
            error: None,
        }
    }

    /// Session ID
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the run began
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Threshold drawn for this run
    #[must_use]
    pub fn slowdown_threshold_pct(&self) -> u8 {
        self.slowdown_threshold_pct
    }

    /// The run's cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Artifact, once succeeded
    #[must_use]
    pub fn result(&self) -> Option<&Arc<GeneratedArtifact>> {
        self.result.as_ref()
    }

    /// Error, once failed
    #[must_use]
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }
}

/// Holder of the single live session
#[derive(Clone, Debug, Default)]
pub struct SessionSlot {
    inner: Arc<Mutex<Option<RunSession>>>,
}

impl SessionSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session`, cancelling whatever was there
    pub fn replace(&self, session: RunSession) -> SessionId {
        let id = session.id;
        let previous = self.inner.lock().replace(session);
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::debug!(session = %previous.id, "Superseded session cancelled");
        }
        id
    }

    /// Cancel and remove the current session
    pub fn cancel(&self) -> Option<SessionId> {
        let previous = self.inner.lock().take()?;
        previous.token.cancel();
        Some(previous.id)
    }

    /// Whether `id` is the current session and still running
    #[must_use]
    pub fn is_live(&self, id: SessionId) -> bool {
        self.inner
            .lock()
            .as_ref()
            .is_some_and(|s| s.id == id && s.status == SessionStatus::Running)
    }

    /// Whether any session is running
    #[must_use]
    pub fn has_live(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Running)
    }

    /// ID of the session in the slot
    #[must_use]
    pub fn current_id(&self) -> Option<SessionId> {
        self.inner.lock().as_ref().map(|s| s.id)
    }

    /// Status of the session in the slot
    #[must_use]
    pub fn current_status(&self) -> Option<SessionStatus> {
        self.inner.lock().as_ref().map(|s| s.status)
    }

    /// Mark `id` succeeded. Returns false if `id` is not current.
    pub fn succeed(&self, id: SessionId, artifact: Arc<GeneratedArtifact>) -> bool {
        self.update(id, |s| {
            s.status = SessionStatus::Succeeded;
            s.result = Some(artifact);
        })
    }

    /// Mark `id` failed. Returns false if `id` is not current.
    pub fn fail(&self, id: SessionId, error: PipelineError) -> bool {
        self.update(id, |s| {
            s.status = SessionStatus::Failed;
            s.error = Some(error);
        })
    }

    /// Error of the current session, if it failed
    #[must_use]
    pub fn current_error(&self) -> Option<PipelineError> {
        self.inner.lock().as_ref().and_then(|s| s.error.clone())
    }

    fn update(&self, id: SessionId, f: impl FnOnce(&mut RunSession)) -> bool {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(session) if session.id == id && session.status == SessionStatus::Running => {
                f(session);
                true
            }
            _ => false,
        }
    }
}
