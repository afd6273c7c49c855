//! Pipeline Orchestrator
//!
//! Runs the two network stages for one photo:
//!
//! ```text
//! Describing ──▶ Generating ──▶ Succeeded
//!     │              │ 401: backoff, retry (bounded)
//!     ▼              ▼
//!   Failed         Failed            (any stage) ──token──▶ Cancelled
//! ```
//!
//! Progress of a run is published on a `watch` channel of [`RunSignals`];
//! the render loop reads `result_ready` / `error` from it on every tick.
//! The orchestrator never draws.
//!
//! # Cancellation
//!
//! Each run owns a [`CancellationToken`]. Every request and every backoff
//! wait is raced against it, and the token is checked before and after each
//! await. A cancelled run ends as [`RunOutcome::Cancelled`] and never sets
//! `result_ready` or `error`.

pub mod error;
pub mod prompt;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use error::{ErrorKind, MessageDetail, PipelineError, Stage, GENERIC_USER_MESSAGE};
pub use prompt::{sanitize_prompt, DESCRIBE_PROMPT};

use crate::backend::{GeneratedArtifact, ImageService, ServiceFailure};
use crate::frame::SourceFrame;

/// Retry behaviour of the generate stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Generate attempts before giving up on repeated 401s
    pub max_attempts: u32,
    /// Backoff grows by this much per failed attempt
    pub backoff_step: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1_000),
        }
    }
}

impl PipelineConfig {
    /// Wait after failed attempt `attempt` (1-based): `step * attempt`
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Where a run currently is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started
    #[default]
    Idle,
    /// Describe request in flight
    Describing,
    /// Generate request (or backoff) in flight
    Generating,
    /// Artifact available
    Succeeded,
    /// Fatal error
    Failed,
    /// Token fired
    Cancelled,
}

/// Signals one run publishes outward
#[derive(Clone, Debug, Default)]
pub struct RunSignals {
    /// Current stage
    pub state: PipelineState,
    /// Set once the artifact is available
    pub result_ready: bool,
    /// Set once the run failed
    pub error: Option<PipelineError>,
    /// The generated image
    pub artifact: Option<Arc<GeneratedArtifact>>,
    /// Text returned by the describe stage
    pub description: Option<String>,
}

impl RunSignals {
    /// True when an error is present
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// How a run ended
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// Generated an artifact
    Succeeded(Arc<GeneratedArtifact>),
    /// Failed fatally
    Failed(PipelineError),
    /// Cancelled; nothing was reported
    Cancelled,
}

/// Await `fut` unless `token` fires first
///
/// Returns `None` if the token was cancelled before, during or right after
/// the await.
async fn unless_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    if token.is_cancelled() {
        return None;
    }
    let output = tokio::select! {
        biased;
        () = token.cancelled() => return None,
        output = fut => output,
    };
    if token.is_cancelled() {
        return None;
    }
    Some(output)
}

/// Describe then generate, with retries and cancellation
pub struct PipelineOrchestrator {
    service: Arc<dyn ImageService>,
    config: PipelineConfig,
    current: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("service", &self.service.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Create an orchestrator over a service
    pub fn new(service: Arc<dyn ImageService>, config: PipelineConfig) -> Self {
        Self {
            service,
            config,
            current: Mutex::new(None),
        }
    }

    /// Retry settings
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn a run on `frame`, cancelling any run still in flight
    pub fn start(self: &Arc<Self>, frame: Arc<SourceFrame>) -> RunHandle {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            if !previous.is_cancelled() {
                tracing::debug!("Cancelling superseded pipeline run");
                previous.cancel();
            }
        }

        let (tx, rx) = watch::channel(RunSignals::default());
        let this = Arc::clone(self);
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            match AssertUnwindSafe(this.run(&frame, &run_token, &tx))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) if run_token.is_cancelled() => {
                    tracing::error!("Pipeline task panicked after cancellation");
                    tx.send_modify(|s| s.state = PipelineState::Cancelled);
                    RunOutcome::Cancelled
                }
                Err(_) => {
                    let stage = match tx.borrow().state {
                        PipelineState::Idle | PipelineState::Describing => Stage::Describe,
                        _ => Stage::Generate,
                    };
                    let error = PipelineError::NetworkOrServer {
                        stage,
                        detail: "pipeline task panicked".to_string(),
                    };
                    tracing::error!(stage = %stage, "Pipeline task panicked");
                    tx.send_modify(|s| {
                        s.state = PipelineState::Failed;
                        s.error = Some(error.clone());
                    });
                    RunOutcome::Failed(error)
                }
            }
        });

        RunHandle {
            token,
            signals: rx,
            task,
        }
    }

    /// Cancel the run started last, if any
    pub fn cancel_current(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    /// Run both stages to completion on the current task
    pub async fn run(
        &self,
        frame: &SourceFrame,
        token: &CancellationToken,
        signals: &watch::Sender<RunSignals>,
    ) -> RunOutcome {
        let outcome = self.run_stages(frame, token, signals).await;
        match &outcome {
            RunOutcome::Succeeded(artifact) => {
                tracing::info!(
                    mime_type = %artifact.mime_type,
                    bytes = artifact.bytes.len(),
                    "Pipeline succeeded"
                );
                let artifact = Arc::clone(artifact);
                signals.send_modify(|s| {
                    s.state = PipelineState::Succeeded;
                    s.artifact = Some(artifact);
                    s.result_ready = true;
                });
            }
            RunOutcome::Failed(error) => {
                tracing::error!(kind = %error.kind(), stage = %error.stage(), error = %error, "Pipeline failed");
                let error = error.clone();
                signals.send_modify(|s| {
                    s.state = PipelineState::Failed;
                    s.error = Some(error);
                });
            }
            RunOutcome::Cancelled => {
                tracing::info!("Pipeline cancelled");
                signals.send_modify(|s| s.state = PipelineState::Cancelled);
            }
        }
        outcome
    }

    async fn run_stages(
        &self,
        frame: &SourceFrame,
        token: &CancellationToken,
        signals: &watch::Sender<RunSignals>,
    ) -> RunOutcome {
        // Stage 1: describe
        signals.send_modify(|s| s.state = PipelineState::Describing);
        tracing::info!(service = self.service.name(), "Describing source frame");

        let encoded = match frame.encode_png() {
            Ok(encoded) => encoded,
            Err(e) => {
                return RunOutcome::Failed(PipelineError::NetworkOrServer {
                    stage: Stage::Describe,
                    detail: format!("could not encode source image: {e}"),
                })
            }
        };

        let Some(reply) =
            unless_cancelled(token, self.service.describe(&encoded, DESCRIBE_PROMPT)).await
        else {
            return RunOutcome::Cancelled;
        };

        let description = match reply {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return RunOutcome::Failed(PipelineError::MalformedResponse {
                    stage: Stage::Describe,
                    detail: "empty description".to_string(),
                })
            }
            Err(failure) => return RunOutcome::Failed(classify_describe(failure)),
        };

        tracing::debug!(chars = description.len(), "Description received");
        let prompt = sanitize_prompt(&description);
        signals.send_modify(|s| {
            s.description = Some(description);
            s.state = PipelineState::Generating;
        });

        // Stage 2: generate
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let Some(reply) = unless_cancelled(token, self.service.generate(&prompt)).await else {
                return RunOutcome::Cancelled;
            };

            match reply {
                Ok(artifact) if artifact.bytes.is_empty() => {
                    return RunOutcome::Failed(PipelineError::MalformedResponse {
                        stage: Stage::Generate,
                        detail: "empty image payload".to_string(),
                    });
                }
                Ok(artifact) => {
                    tracing::debug!(attempt, "Generate attempt succeeded");
                    return RunOutcome::Succeeded(Arc::new(artifact));
                }
                Err(failure) if failure.status() == Some(401) => {
                    tracing::warn!(attempt, max_attempts, status = 401, "Generate attempt unauthorized");
                    if attempt == max_attempts {
                        break;
                    }
                    let backoff = self.config.backoff_for_attempt(attempt);
                    tracing::debug!(backoff_ms = backoff.as_millis(), "Waiting before retry");
                    if unless_cancelled(token, tokio::time::sleep(backoff)).await.is_none() {
                        return RunOutcome::Cancelled;
                    }
                }
                Err(failure) => {
                    tracing::warn!(attempt, status = ?failure.status(), "Generate attempt failed");
                    return RunOutcome::Failed(classify_generate(failure));
                }
            }
        }

        tracing::warn!(attempts = max_attempts, "Generate retries exhausted");
        RunOutcome::Failed(PipelineError::RetriesExhausted {
            stage: Stage::Generate,
            attempts: max_attempts,
        })
    }
}

fn classify_describe(failure: ServiceFailure) -> PipelineError {
    let stage = Stage::Describe;
    match failure {
        ServiceFailure::Status { code: 401, .. } => PipelineError::Unauthorized { stage },
        ServiceFailure::Status { code, detail } => PipelineError::NetworkOrServer {
            stage,
            detail: format!("HTTP {code}: {detail}"),
        },
        ServiceFailure::Transport(detail) => PipelineError::NetworkOrServer { stage, detail },
        ServiceFailure::Malformed(detail) => PipelineError::MalformedResponse { stage, detail },
    }
}

fn classify_generate(failure: ServiceFailure) -> PipelineError {
    let stage = Stage::Generate;
    match failure {
        ServiceFailure::Status { code: 403, detail } => PipelineError::Forbidden { stage, detail },
        ServiceFailure::Status { code, detail } => PipelineError::NetworkOrServer {
            stage,
            detail: format!("HTTP {code}: {detail}"),
        },
        ServiceFailure::Transport(detail) => PipelineError::NetworkOrServer { stage, detail },
        ServiceFailure::Malformed(detail) => PipelineError::MalformedResponse { stage, detail },
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct RunHandle {
    token: CancellationToken,
    signals: watch::Receiver<RunSignals>,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// The run's cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// A receiver of the run's signals
    #[must_use]
    pub fn signals(&self) -> watch::Receiver<RunSignals> {
        self.signals.clone()
    }

    /// Cancel the run
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the run to end
    pub async fn join(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                tracing::warn!(error = %e, "Pipeline task aborted");
                RunOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!(error = %e, "Pipeline task did not complete");
                RunOutcome::Failed(PipelineError::NetworkOrServer {
                    stage: Stage::Generate,
                    detail: format!("pipeline task failed: {e}"),
                })
            }
        }
    }
}
