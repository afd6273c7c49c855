//! Source Frames
//!
//! A [`SourceFrame`] is the raster the effect renderer samples from: either a
//! still (captured or uploaded photo, already cropped to 7:10) or the latest
//! frame of a live camera feed. Frames are immutable once built and shared
//! read-only through `Arc`.
//!
//! Producers expose frames through [`SourceFrameProvider`], which answers only
//! two questions: "what is the current frame" and "is it ready".

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use parking_lot::RwLock;

use crate::backend::EncodedImage;

/// Canonical aspect ratio (width / height) of every frame: 7:10
pub const TARGET_ASPECT_RATIO: f64 = 0.7;

/// Where a frame came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Captured or uploaded photo
    Still,
    /// Frame of an open camera stream
    Live,
}

/// Immutable RGBA raster
#[derive(Clone, Debug)]
pub struct SourceFrame {
    pixels: RgbaImage,
    origin: FrameOrigin,
}

impl SourceFrame {
    /// Wrap a raster
    #[must_use]
    pub fn new(pixels: RgbaImage, origin: FrameOrigin) -> Self {
        Self { pixels, origin }
    }

    /// Convenience constructor for a still
    #[must_use]
    pub fn still(pixels: RgbaImage) -> Self {
        Self::new(pixels, FrameOrigin::Still)
    }

    /// Convenience constructor for a live frame
    #[must_use]
    pub fn live(pixels: RgbaImage) -> Self {
        Self::new(pixels, FrameOrigin::Live)
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True when either dimension is zero
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Origin of this frame
    #[must_use]
    pub fn origin(&self) -> FrameOrigin {
        self.origin
    }

    /// Borrow the pixels
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encode as PNG for the describe request
    ///
    /// # Errors
    ///
    /// Returns the encoder error if the raster cannot be written.
    pub fn encode_png(&self) -> Result<EncodedImage, image::ImageError> {
        let mut bytes = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(EncodedImage::new(bytes, "image/png"))
    }
}

/// Source rectangle of a center crop, in source pixel units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width of the cropped region
    pub width: f64,
    /// Height of the cropped region
    pub height: f64,
}

/// Center-crop a `src_width` x `src_height` raster to `ratio` (width / height)
///
/// Wider sources lose width (`height * ratio` is kept), taller sources lose
/// height (`width / ratio` is kept).
#[must_use]
pub fn center_crop(src_width: u32, src_height: u32, ratio: f64) -> CropRect {
    let (w, h) = (f64::from(src_width), f64::from(src_height));
    if h == 0.0 || w == 0.0 {
        return CropRect {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        };
    }

    if w / h > ratio {
        let width = h * ratio;
        CropRect {
            x: (w - width) / 2.0,
            y: 0.0,
            width,
            height: h,
        }
    } else {
        let height = w / ratio;
        CropRect {
            x: 0.0,
            y: (h - height) / 2.0,
            width: w,
            height,
        }
    }
}

/// Supplies the frame the renderer should sample
pub trait SourceFrameProvider: Send + Sync {
    /// The frame to draw right now, if any
    fn current_frame(&self) -> Option<Arc<SourceFrame>>;

    /// Whether [`current_frame`](Self::current_frame) is usable
    fn is_ready(&self) -> bool {
        self.current_frame().is_some()
    }
}

/// A fully decoded still image
#[derive(Clone, Debug)]
pub struct StillFrame {
    frame: Arc<SourceFrame>,
}

impl StillFrame {
    /// Wrap a decoded frame
    #[must_use]
    pub fn new(frame: Arc<SourceFrame>) -> Self {
        Self { frame }
    }

    /// The wrapped frame
    #[must_use]
    pub fn frame(&self) -> &Arc<SourceFrame> {
        &self.frame
    }
}

impl SourceFrameProvider for StillFrame {
    fn current_frame(&self) -> Option<Arc<SourceFrame>> {
        Some(Arc::clone(&self.frame))
    }
}

/// Latest-frame slot for a camera stream
///
/// The capture side calls [`LiveFeed::push`] for every decoded frame; the
/// feed reports ready once at least one frame has arrived.
#[derive(Debug, Default)]
pub struct LiveFeed {
    latest: RwLock<Option<Arc<SourceFrame>>>,
}

impl LiveFeed {
    /// Create an empty feed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a newly decoded frame
    pub fn push(&self, pixels: RgbaImage) {
        *self.latest.write() = Some(Arc::new(SourceFrame::live(pixels)));
    }

    /// Drop the current frame (stream stopped)
    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

impl SourceFrameProvider for LiveFeed {
    fn current_frame(&self) -> Option<Arc<SourceFrame>> {
        self.latest.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_crop_wide_source_trims_width() {
        let rect = center_crop(1280, 720, TARGET_ASPECT_RATIO);
        assert!((rect.height - 720.0).abs() < 1e-9);
        assert!((rect.width - 504.0).abs() < 1e-9);
        assert!((rect.x - 388.0).abs() < 1e-9);
        assert!(rect.y.abs() < 1e-9);
    }

    #[test]
    fn test_center_crop_tall_source_trims_height() {
        let rect = center_crop(700, 2000, TARGET_ASPECT_RATIO);
        assert!((rect.width - 700.0).abs() < 1e-9);
        assert!((rect.height - 1000.0).abs() < 1e-9);
        assert!((rect.y - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_crop_exact_ratio_is_identity() {
        let rect = center_crop(70, 100, TARGET_ASPECT_RATIO);
        assert!((rect.width - 70.0).abs() < 1e-9);
        assert!((rect.height - 100.0).abs() < 1e-9);
        assert!(rect.x.abs() < 1e-9 && rect.y.abs() < 1e-9);
    }

    #[test]
    fn test_center_crop_zero_source() {
        let rect = center_crop(0, 100, TARGET_ASPECT_RATIO);
        assert!(rect.width.abs() < f64::EPSILON);
    }

    #[test]
    fn test_live_feed_ready_after_first_frame() {
        let feed = LiveFeed::new();
        assert!(!feed.is_ready());

        feed.push(RgbaImage::new(7, 10));
        assert!(feed.is_ready());
        let frame = feed.current_frame().unwrap();
        assert_eq!(frame.origin(), FrameOrigin::Live);

        feed.clear();
        assert!(!feed.is_ready());
    }

    #[test]
    fn test_still_frame_always_ready() {
        let still = StillFrame::new(Arc::new(SourceFrame::still(RgbaImage::new(7, 10))));
        assert!(still.is_ready());
        assert_eq!(still.current_frame().unwrap().width(), 7);
    }

    #[test]
    fn test_encode_png_declares_media_type() {
        let frame = SourceFrame::still(RgbaImage::from_pixel(4, 4, image::Rgba([9, 8, 7, 255])));
        let encoded = frame.encode_png().unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(&encoded.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
