//! Scripted Image Service
//!
//! An [`ImageService`] that replays queued replies instead of calling the
//! network. Used by unit and integration tests to drive the orchestrator
//! through success, retry and failure paths; per-stage latency lets paused
//! tokio tests place completion at an exact instant.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{EncodedImage, GeneratedArtifact, ImageService, ServiceFailure};

/// Test double with per-call replies and request recording
#[derive(Debug, Default)]
pub struct ScriptedService {
    describe_replies: Mutex<VecDeque<Result<String, ServiceFailure>>>,
    generate_replies: Mutex<VecDeque<Result<GeneratedArtifact, ServiceFailure>>>,
    describe_latency: Duration,
    generate_latency: Duration,
    describe_calls: Mutex<Vec<EncodedImage>>,
    generate_calls: Mutex<Vec<String>>,
}

impl ScriptedService {
    /// Create a service with empty scripts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: one successful describe and one successful generate
    #[must_use]
    pub fn succeeding(description: &str) -> Self {
        Self::new()
            .describe_ok(description)
            .generate_ok(GeneratedArtifact::new(vec![0x89, b'P', b'N', b'G'], "image/png"))
    }

    /// Queue a describe reply
    #[must_use]
    pub fn with_describe(self, reply: Result<String, ServiceFailure>) -> Self {
        self.describe_replies.lock().push_back(reply);
        self
    }

    /// Queue a successful describe
    #[must_use]
    pub fn describe_ok(self, description: &str) -> Self {
        self.with_describe(Ok(description.to_string()))
    }

    /// Queue a describe failing with an HTTP status
    #[must_use]
    pub fn describe_status(self, code: u16) -> Self {
        self.with_describe(Err(status(code)))
    }

    /// Queue a generate reply
    #[must_use]
    pub fn with_generate(self, reply: Result<GeneratedArtifact, ServiceFailure>) -> Self {
        self.generate_replies.lock().push_back(reply);
        self
    }

    /// Queue a successful generate
    #[must_use]
    pub fn generate_ok(self, artifact: GeneratedArtifact) -> Self {
        self.with_generate(Ok(artifact))
    }

    /// Queue a generate failing with an HTTP status
    #[must_use]
    pub fn generate_status(self, code: u16) -> Self {
        self.with_generate(Err(status(code)))
    }

    /// Delay every describe reply
    #[must_use]
    pub fn with_describe_latency(mut self, latency: Duration) -> Self {
        self.describe_latency = latency;
        self
    }

    /// Delay every generate reply
    #[must_use]
    pub fn with_generate_latency(mut self, latency: Duration) -> Self {
        self.generate_latency = latency;
        self
    }

    /// Number of describe requests received
    #[must_use]
    pub fn describe_count(&self) -> usize {
        self.describe_calls.lock().len()
    }

    /// Number of generate requests received
    #[must_use]
    pub fn generate_count(&self) -> usize {
        self.generate_calls.lock().len()
    }

    /// Prompts sent to generate, in order
    #[must_use]
    pub fn generate_prompts(&self) -> Vec<String> {
        self.generate_calls.lock().clone()
    }

    /// Images sent to describe, in order
    #[must_use]
    pub fn described_images(&self) -> Vec<EncodedImage> {
        self.describe_calls.lock().clone()
    }
}

fn status(code: u16) -> ServiceFailure {
    ServiceFailure::Status {
        code,
        detail: format!("scripted status {code}"),
    }
}

fn exhausted(stage: &str) -> ServiceFailure {
    ServiceFailure::Transport(format!("no scripted {stage} reply left"))
}

#[async_trait]
impl ImageService for ScriptedService {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn describe(&self, image: &EncodedImage, _prompt: &str) -> Result<String, ServiceFailure> {
        self.describe_calls.lock().push(image.clone());
        if !self.describe_latency.is_zero() {
            tokio::time::sleep(self.describe_latency).await;
        }
        self.describe_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("describe")))
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ServiceFailure> {
        self.generate_calls.lock().push(prompt.to_string());
        if !self.generate_latency.is_zero() {
            tokio::time::sleep(self.generate_latency).await;
        }
        self.generate_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("generate")))
    }
}
