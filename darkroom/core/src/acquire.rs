//! Photo Acquisition
//!
//! Turns a photo file or the current camera frame into the still the core
//! works on: center-cropped to 7:10 and scaled to 1024 x 1463. Decoding and
//! scaling are CPU-bound, so the async entry point runs them on the blocking
//! pool.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbaImage;

use crate::frame::{center_crop, SourceFrame, SourceFrameProvider, TARGET_ASPECT_RATIO};

/// Output width of every acquired still
pub const STILL_WIDTH: u32 = 1024;

/// Output height of every acquired still, `round(1024 / 0.7)`
pub const STILL_HEIGHT: u32 = 1463;

/// Acquisition failures
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a supported image
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The image has a zero dimension
    #[error("image has no pixels")]
    EmptySource,

    /// The camera has not produced a frame yet
    #[error("camera is not ready")]
    NotReady,

    /// The decode task did not finish
    #[error("decode task failed: {0}")]
    Task(String),
}

/// Crop `pixels` to 7:10 around the center and scale to the still size
///
/// # Errors
///
/// [`AcquireError::EmptySource`] when either dimension is zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn prepare_still(pixels: &RgbaImage) -> Result<SourceFrame, AcquireError> {
    let (w, h) = pixels.dimensions();
    if w == 0 || h == 0 {
        return Err(AcquireError::EmptySource);
    }

    let crop = center_crop(w, h, TARGET_ASPECT_RATIO);
    let x = (crop.x.round() as u32).min(w - 1);
    let y = (crop.y.round() as u32).min(h - 1);
    let cw = (crop.width.round() as u32).clamp(1, w - x);
    let ch = (crop.height.round() as u32).clamp(1, h - y);

    let cropped = image::imageops::crop_imm(pixels, x, y, cw, ch).to_image();
    let scaled = image::imageops::resize(&cropped, STILL_WIDTH, STILL_HEIGHT, FilterType::Triangle);
    Ok(SourceFrame::still(scaled))
}

/// Decode an encoded photo and prepare it
///
/// # Errors
///
/// Decode errors, or [`AcquireError::EmptySource`].
pub fn decode_still(bytes: &[u8]) -> Result<SourceFrame, AcquireError> {
    let decoded = image::load_from_memory(bytes)?.to_rgba8();
    prepare_still(&decoded)
}

/// Read, decode and prepare a photo file
///
/// # Errors
///
/// I/O, decode or empty-image errors.
pub async fn load_still(path: impl AsRef<Path>) -> Result<SourceFrame, AcquireError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| AcquireError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Photo read");

    tokio::task::spawn_blocking(move || decode_still(&bytes))
        .await
        .map_err(|e| AcquireError::Task(e.to_string()))?
}

/// Snapshot the provider's current frame as a still
///
/// # Errors
///
/// [`AcquireError::NotReady`] when no frame has arrived yet.
pub fn capture_live(feed: &dyn SourceFrameProvider) -> Result<SourceFrame, AcquireError> {
    let frame = feed.current_frame().ok_or(AcquireError::NotReady)?;
    prepare_still(frame.pixels())
}
