//! Studio Events
//!
//! Everything the core reports to the surface that displays it. The surface
//! is a "dumb" renderer: it shows the percentage, the description, the
//! revealed artifact or the error text it is given, and decides nothing.

use std::sync::Arc;

use crate::backend::GeneratedArtifact;
use crate::pipeline::ErrorKind;
use crate::progress::{Phase, RevealFade};
use crate::session::SessionId;

/// Events from the core to the display surface
#[derive(Clone, Debug)]
pub enum StudioEvent {
    // ============================================
    // Run Events
    // ============================================
    /// A run began
    Started {
        /// Session the run belongs to
        session: SessionId,
    },

    /// Visible progress changed (once per processing tick)
    Progress {
        /// Session the value belongs to
        session: SessionId,
        /// User-facing percentage, never decreasing within a session
        visible: f32,
        /// Simulator phase
        phase: Phase,
    },

    /// The describe stage returned its text
    Described {
        /// Session the text belongs to
        session: SessionId,
        /// Description from the vision model
        text: String,
    },

    /// Progress hit 100; show the artifact with a fade
    Revealed {
        /// Session that produced it
        session: SessionId,
        /// The generated image
        artifact: Arc<GeneratedArtifact>,
        /// Fade to apply when showing it
        fade: RevealFade,
    },

    /// The run failed; the last pixelated frame stays on the canvas
    Failed {
        /// Session that failed
        session: SessionId,
        /// Text for the user, at the configured level of detail
        message: String,
        /// Classification for logging
        kind: ErrorKind,
    },

    /// Run state was discarded (cancel, or a new camera session)
    Reset,

    // ============================================
    // Camera Events
    // ============================================
    /// Live preview took over the canvas
    PreviewStarted,

    /// Live preview stopped
    PreviewStopped,
}

impl StudioEvent {
    /// Session the event belongs to, if any
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::Started { session }
            | Self::Progress { session, .. }
            | Self::Described { session, .. }
            | Self::Revealed { session, .. }
            | Self::Failed { session, .. } => Some(*session),
            Self::Reset | Self::PreviewStarted | Self::PreviewStopped => None,
        }
    }
}
