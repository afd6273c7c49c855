//! Darkroom Core - Progress Illusion for AI Photo Regeneration
//!
//! A user hands in a photo; two network calls (describe, then generate)
//! produce a regenerated image. While they run, this crate shows a pixelated,
//! color-quantized, scanlined rendition of the source whose coarseness
//! follows a simulated progress value. The value looks organic (it ramps,
//! decelerates, stalls, sprints) but stays causally tied to the real
//! pipeline: it never reaches 100 before the result exists and never moves
//! backwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Surfaces                              │
//! │        ┌─────────┐   ┌────────────────┐   ┌──────────┐        │
//! │        │   CLI   │   │ Desktop / Web  │   │  Tests   │        │
//! │        └────┬────┘   └───────┬────────┘   └────┬─────┘        │
//! │             └────────────────┴─────────────────┘              │
//! │                  actions ▼        ▲ StudioEvent               │
//! └──────────────────────────┼────────┼───────────────────────────┘
//!                            │        │
//! ┌──────────────────────────┼────────┼───────────────────────────┐
//! │                       DARKROOM CORE                            │
//! │  ┌───────────────────────┴────────┴──────────────────────────┐ │
//! │  │                        Studio                              │ │
//! │  │ ┌──────────────┐ ┌────────────┐ ┌───────────┐ ┌─────────┐  │ │
//! │  │ │  Pipeline    │ │  Progress  │ │  Render   │ │ Effect  │  │ │
//! │  │ │ Orchestrator │ │ Simulator  │ │   Loop    │ │Renderer │  │ │
//! │  │ └──────┬───────┘ └────────────┘ └───────────┘ └─────────┘  │ │
//! │  └────────┼───────────────────────────────────────────────────┘ │
//! │           ▼                                                     │
//! │    ImageService (Gemini / scripted)                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Studio`]: composition root and the surface's entry point
//! - [`ProgressSimulator`]: visible progress and renderer drive per tick
//! - [`EffectRenderer`]: draws the degraded frame onto a [`Canvas`]
//! - [`PipelineOrchestrator`]: describe → generate with bounded 401 retry
//! - [`RenderLoop`]: fixed-tick processing mode and live-preview mode
//! - [`StudioEvent`]: everything reported back to the surface
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use darkroom_core::{load_config, GeminiService, Studio, StudioEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let key = config.api_key.clone().unwrap_or_default();
//!     let service = Arc::new(GeminiService::new(&config.api, key)?);
//!     let (studio, mut events) = Studio::builder(service).config(config).build();
//!
//!     studio.process_file("photo.jpg").await?;
//!     while let Some(event) = events.recv().await {
//!         if let StudioEvent::Revealed { .. } | StudioEvent::Failed { .. } = event {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # No UI Dependencies
//!
//! The canvas is a plain RGBA raster. Whatever shows it (window, terminal,
//! browser) lives outside this crate.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquire;
pub mod backend;
pub mod canvas;
pub mod clock;
pub mod config;
pub mod effect;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod progress;
pub mod render_loop;
pub mod session;
pub mod studio;

// Re-exports for convenience
pub use acquire::{capture_live, load_still, prepare_still, AcquireError, STILL_HEIGHT, STILL_WIDTH};
pub use backend::{EncodedImage, GeminiService, GeneratedArtifact, ImageService, ServiceFailure};
pub use canvas::{Canvas, CanvasHandle, CanvasLease};
pub use clock::{Clock, FixedRandom, ManualClock, RandomSource, SeededRandom, ThreadRandom, TokioClock};
pub use effect::{EffectConfig, EffectRenderer, RenderReport, SkipReason};
pub use events::StudioEvent;
pub use frame::{FrameOrigin, LiveFeed, SourceFrame, SourceFrameProvider, StillFrame, TARGET_ASPECT_RATIO};
pub use pipeline::{
    ErrorKind, MessageDetail, PipelineConfig, PipelineError, PipelineOrchestrator, PipelineState,
    RunHandle, RunOutcome, RunSignals, Stage,
};
pub use progress::{Phase, ProgressConfig, ProgressFrame, ProgressSimulator, RevealFade};
pub use render_loop::{DisplayRefresh, IntervalRefresh, ProcessingJob, RenderConfig, RenderLoop, RenderMode};
pub use session::{RunSession, SessionId, SessionSlot, SessionStatus};
pub use studio::{Studio, StudioBuilder};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ApiConfig, ConfigError,
    ConfigOverrides, ConfigSource, DarkroomConfig, DarkroomToml,
};
