//! Pipeline Errors
//!
//! Every fatal outcome of a run is a [`PipelineError`]. Each error carries a
//! coarse [`ErrorKind`] for logging and a human-readable message; how much of
//! the message reaches the user is chosen by [`MessageDetail`].
//!
//! Cancellation is not an error and has no variant here.

use std::fmt;

/// Pipeline stage an error came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Image to text
    Describe,
    /// Text to image
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Describe => write!(f, "Description"),
            Self::Generate => write!(f, "Image generation"),
        }
    }
}

/// Structured classification of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401 from the service; retried on the generate stage
    TransientAuth,
    /// 403 from the generate stage; never retried
    Forbidden,
    /// Any other status or a transport failure
    NetworkOrServer,
    /// Success status without the expected payload
    MalformedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TransientAuth => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NetworkOrServer => "network",
            Self::MalformedResponse => "malformed-response",
        };
        f.write_str(label)
    }
}

/// How much of an error the user gets to read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageDetail {
    /// One fixed sentence
    #[default]
    Generic,
    /// The full error text
    Detailed,
}

/// Message shown in generic mode
pub const GENERIC_USER_MESSAGE: &str = "Error taking photo.";

/// Fatal pipeline failure
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Describe stage rejected the credentials
    #[error(
        "{stage} API error (401 Unauthorized): Please check your API key and ensure the API is enabled for your Google Cloud project."
    )]
    Unauthorized {
        /// Failing stage
        stage: Stage,
    },

    /// Generate stage refused access
    #[error(
        "{stage} API error (403 Forbidden): Access denied. Ensure billing is enabled and the Imagen API is properly enabled in your Google Cloud project for this model. Details: {detail}"
    )]
    Forbidden {
        /// Failing stage
        stage: Stage,
        /// Error text returned by the service
        detail: String,
    },

    /// Every attempt of the generate stage came back 401
    #[error(
        "{stage} API error (401 Unauthorized): Max retries exhausted after {attempts} attempts. Please check your API key and ensure the Imagen API is enabled for your Google Cloud project."
    )]
    RetriesExhausted {
        /// Failing stage
        stage: Stage,
        /// Attempts made
        attempts: u32,
    },

    /// Other status, transport failure or local encoding failure
    #[error("{stage} API error: {detail}")]
    NetworkOrServer {
        /// Failing stage
        stage: Stage,
        /// What went wrong, including the status when there was one
        detail: String,
    },

    /// Success status but no usable payload
    #[error("No result received from the {stage} API: {detail}")]
    MalformedResponse {
        /// Failing stage
        stage: Stage,
        /// What was missing
        detail: String,
    },
}

impl PipelineError {
    /// Classification for logging
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::TransientAuth,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::RetriesExhausted { .. } | Self::NetworkOrServer { .. } => {
                ErrorKind::NetworkOrServer
            }
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
        }
    }

    /// Stage that failed
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Unauthorized { stage }
            | Self::Forbidden { stage, .. }
            | Self::RetriesExhausted { stage, .. }
            | Self::NetworkOrServer { stage, .. }
            | Self::MalformedResponse { stage, .. } => *stage,
        }
    }

    /// Text for the user at the requested level of detail
    #[must_use]
    pub fn user_message(&self, detail: MessageDetail) -> String {
        match detail {
            MessageDetail::Generic => GENERIC_USER_MESSAGE.to_string(),
            MessageDetail::Detailed => format!("Process failed: {self}"),
        }
    }
}
