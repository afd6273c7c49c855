//! Image Service Traits
//!
//! Trait definitions for the remote vision/generation service. The pipeline
//! talks only to [`ImageService`], so the hosted Gemini/Imagen endpoints can be
//! swapped for a scripted service in tests without touching orchestration.
//!
//! The service performs two operations:
//! - `describe`: image in, textual description out
//! - `generate`: prompt in, one generated image out
//!
//! Failures are reported as [`ServiceFailure`], which keeps the HTTP status
//! visible so the orchestrator can decide what is retryable.

use async_trait::async_trait;

/// An image ready to be sent over the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes (PNG, JPEG, ...)
    pub bytes: Vec<u8>,
    /// Media type of `bytes`, e.g. `image/png`
    pub mime_type: String,
}

impl EncodedImage {
    /// Create from bytes and a media type
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// The regenerated photo returned by the service
///
/// Immutable once produced; the pipeline hands it out behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Decoded image bytes
    pub bytes: Vec<u8>,
    /// Media type reported by the service
    pub mime_type: String,
}

impl GeneratedArtifact {
    /// Create from decoded bytes and a media type
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Render as a `data:` URL
    #[must_use]
    pub fn to_data_url(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Why a service call failed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFailure {
    /// The service answered with a non-success status
    #[error("service returned HTTP {code}: {detail}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Error text from the response body, if any
        detail: String,
    },

    /// The request never produced a response
    #[error("transport failure: {0}")]
    Transport(String),

    /// A success response did not contain what was expected
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceFailure {
    /// HTTP status, when the service answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Transport(_) | Self::Malformed(_) => None,
        }
    }
}

/// A remote service that can describe and generate images
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &str;

    /// Ask the vision model to describe `image` following `prompt`
    async fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, ServiceFailure>;

    /// Ask the image model to render `prompt`
    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ServiceFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http_failures() {
        let failure = ServiceFailure::Status {
            code: 401,
            detail: "expired".to_string(),
        };
        assert_eq!(failure.status(), Some(401));
        assert_eq!(ServiceFailure::Transport("reset".into()).status(), None);
        assert_eq!(ServiceFailure::Malformed("no text".into()).status(), None);
    }

    #[test]
    fn test_artifact_data_url() {
        let artifact = GeneratedArtifact::new(vec![1, 2, 3], "image/png");
        assert_eq!(artifact.to_data_url(), "data:image/png;base64,AQID");
    }
}
