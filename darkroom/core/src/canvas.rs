//! Render Canvas and Single-Writer Lease
//!
//! The [`Canvas`] is the pixel surface shown to the user. Its backing raster
//! follows the "display box" of the container it sits in: the renderer calls
//! [`Canvas::fit_to_display`] on every frame, which reallocates only when the
//! box changed.
//!
//! Exactly one render mode may write at a time. Writers hold a
//! [`CanvasLease`] obtained from [`CanvasHandle::acquire`]; acquiring a new
//! lease revokes the previous one, and a revoked lease silently refuses to
//! draw. A stale task from a superseded mode therefore cannot overwrite the
//! new owner's pixels.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// RGBA pixel surface sized to its container
#[derive(Clone, Debug)]
pub struct Canvas {
    pixels: RgbaImage,
    display: (u32, u32),
}

impl Canvas {
    /// Create a canvas whose container is `width` x `height`
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            display: (width, height),
        }
    }

    /// Record a new container size; takes effect on the next fit
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.display = (width, height);
    }

    /// Current container size
    #[must_use]
    pub fn display_size(&self) -> (u32, u32) {
        self.display
    }

    /// Resize the backing raster to the container. Returns true on resize.
    ///
    /// Resizing discards the previous contents, like a browser canvas whose
    /// width/height attributes are reassigned.
    pub fn fit_to_display(&mut self) -> bool {
        let (w, h) = self.display;
        if self.pixels.dimensions() == (w, h) {
            return false;
        }
        self.pixels = RgbaImage::new(w, h);
        true
    }

    /// Backing raster width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Backing raster height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the pixels
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Reset every pixel to transparent
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    /// True when every pixel is transparent
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|px| px[3] == 0)
    }

    /// Fill a rectangle with a flat color, clipped to the raster
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
        let x_end = x.saturating_add(width).min(self.width());
        let y_end = y.saturating_add(height).min(self.height());
        for py in y..y_end {
            for px in x..x_end {
                self.pixels.put_pixel(px, py, color);
            }
        }
    }

    /// Composite a one-pixel black line over row `y` with the given opacity
    pub fn darken_row(&mut self, y: u32, opacity: f32) {
        if y >= self.height() {
            return;
        }
        let a = opacity.clamp(0.0, 1.0);
        let keep = 1.0 - a;
        for x in 0..self.width() {
            let px = self.pixels.get_pixel_mut(x, y);
            let dst_a = f32::from(px[3]) / 255.0;
            px[0] = scale_channel(px[0], keep);
            px[1] = scale_channel(px[1], keep);
            px[2] = scale_channel(px[2], keep);
            px[3] = unit_to_channel(a + dst_a * keep);
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_channel(value: u8, factor: f32) -> u8 {
    (f32::from(value) * factor).round().clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unit_to_channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug)]
struct SharedCanvas {
    canvas: Canvas,
    next_lease: u64,
    owner: Option<(u64, &'static str)>,
}

/// Shared owner of the one canvas
#[derive(Clone, Debug)]
pub struct CanvasHandle {
    shared: Arc<Mutex<SharedCanvas>>,
}

impl CanvasHandle {
    /// Create a handle around a new canvas
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SharedCanvas {
                canvas: Canvas::new(width, height),
                next_lease: 1,
                owner: None,
            })),
        }
    }

    /// Take exclusive write access, revoking whoever held it
    pub fn acquire(&self, holder: &'static str) -> CanvasLease {
        let mut shared = self.shared.lock();
        let id = shared.next_lease;
        shared.next_lease += 1;
        if let Some((_, previous)) = shared.owner.replace((id, holder)) {
            tracing::trace!(previous, holder, "Canvas lease revoked");
        }
        CanvasLease {
            id,
            holder,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Revoke any outstanding lease
    pub fn revoke(&self) {
        self.shared.lock().owner = None;
    }

    /// Name of the current lease holder
    #[must_use]
    pub fn owner(&self) -> Option<&'static str> {
        self.shared.lock().owner.map(|(_, holder)| holder)
    }

    /// Update the container size
    pub fn set_display_size(&self, width: u32, height: u32) {
        self.shared.lock().canvas.set_display_size(width, height);
    }

    /// Clear the canvas unless a lease currently owns it
    ///
    /// Returns false (and leaves the pixels alone) while a writer is active.
    pub fn clear_if_unowned(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.owner.is_some() {
            return false;
        }
        shared.canvas.clear();
        true
    }

    /// Copy of the current pixels
    #[must_use]
    pub fn snapshot(&self) -> RgbaImage {
        self.shared.lock().canvas.pixels().clone()
    }

    /// Read-only access to the canvas
    pub fn with_canvas<R>(&self, f: impl FnOnce(&Canvas) -> R) -> R {
        f(&self.shared.lock().canvas)
    }
}

/// Exclusive write access to the canvas
///
/// Dropping the lease releases ownership if it is still current.
#[derive(Debug)]
pub struct CanvasLease {
    id: u64,
    holder: &'static str,
    shared: Arc<Mutex<SharedCanvas>>,
}

impl CanvasLease {
    /// Whether this lease still owns the canvas
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.shared.lock().owner.map(|(id, _)| id) == Some(self.id)
    }

    /// Name given at acquisition
    #[must_use]
    pub fn holder(&self) -> &'static str {
        self.holder
    }

    /// Run `f` against the canvas if this lease is still current
    ///
    /// Returns `None` without touching the pixels when the lease was revoked.
    pub fn draw<R>(&self, f: impl FnOnce(&mut Canvas) -> R) -> Option<R> {
        let mut shared = self.shared.lock();
        if shared.owner.map(|(id, _)| id) != Some(self.id) {
            return None;
        }
        Some(f(&mut shared.canvas))
    }
}

impl Drop for CanvasLease {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        if shared.owner.map(|(id, _)| id) == Some(self.id) {
            shared.owner = None;
        }
    }
}
