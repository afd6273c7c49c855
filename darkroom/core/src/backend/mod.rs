//! Image Service Integration
//!
//! Abstracted access to the remote describe/generate service through a
//! common trait.
//!
//! # Available Services
//!
//! - **Gemini**: Gemini vision model for describe, Imagen for generate
//! - **Scripted**: queued replies for tests
//!
//! # Usage
//!
//! ```ignore
//! use darkroom_core::backend::{GeminiService, ImageService};
//! use darkroom_core::config::ApiConfig;
//!
//! let service = GeminiService::new(&ApiConfig::default(), api_key)?;
//! let text = service.describe(&encoded, DESCRIBE_PROMPT).await?;
//! ```

mod gemini;
pub mod mock;
mod traits;

pub use gemini::GeminiService;
pub use traits::{EncodedImage, GeneratedArtifact, ImageService, ServiceFailure};
