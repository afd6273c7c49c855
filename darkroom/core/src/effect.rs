//! Effect Renderer
//!
//! Paints the "resolving" preview: the source frame is center-cropped to 7:10,
//! sampled on a fixed high-resolution grid, pixelated into square blocks on
//! the display canvas, color-quantized, and overlaid with faint scanlines.
//!
//! One number drives everything, the drive progress in `[0, 100]`:
//!
//! | drive | color step | scanline opacity |
//! |-------|------------|------------------|
//! | 0     | coarse (64)| 0.15             |
//! | 100   | fine (16)  | 0                |
//!
//! The renderer is synchronous and keeps no state between calls apart from
//! the canvas it is handed. Unready sources, empty sources and zero-area
//! canvases are silent no-ops that leave the canvas untouched.

use image::Rgba;

use crate::canvas::Canvas;
use crate::frame::{center_crop, CropRect, SourceFrame, SourceFrameProvider, TARGET_ASPECT_RATIO};

/// Renderer tuning
#[derive(Clone, Debug, PartialEq)]
pub struct EffectConfig {
    /// Width of the sampling buffer; its height follows the 7:10 ratio
    pub sample_width: u32,
    /// Number of block columns across the canvas
    pub grid_columns: u32,
    /// Quantization step at drive 0
    pub coarse_color_step: u8,
    /// Quantization step at drive 100
    pub fine_color_step: u8,
    /// Vertical distance between scanlines, in pixels
    pub scanline_period: u32,
    /// Scanline opacity at drive 0
    pub scanline_max_opacity: f32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            sample_width: 1024,
            grid_columns: 40,
            coarse_color_step: 64,
            fine_color_step: 16,
            scanline_period: 5,
            scanline_max_opacity: 0.15,
        }
    }
}

impl EffectConfig {
    /// Height of the sampling buffer, `round(sample_width / 0.7)`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample_height(&self) -> u32 {
        (f64::from(self.sample_width) / TARGET_ASPECT_RATIO).round() as u32
    }
}

/// Scanlines fainter than this are not drawn
const SCANLINE_VISIBILITY_FLOOR: f32 = 0.01;

/// Why a render call drew nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The provider has no decoded frame yet
    NotReady,
    /// The frame has a zero dimension
    EmptySource,
    /// The container has zero area
    ZeroCanvas,
}

/// Outcome of one render call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderReport {
    /// Pixels were written
    Drawn {
        /// Quantization step used
        color_step: u8,
        /// Side of each block in canvas pixels
        block_size: u32,
        /// Whether scanlines were overlaid
        scanlines: bool,
    },
    /// Nothing was written
    Skipped(SkipReason),
}

impl RenderReport {
    /// True when pixels were written
    #[must_use]
    pub fn is_drawn(&self) -> bool {
        matches!(self, Self::Drawn { .. })
    }
}

fn normalized(drive: f32) -> f32 {
    drive.clamp(0.0, 100.0) / 100.0
}

/// Color quantization step for a drive value
///
/// Linear from `coarse` at drive 0 to `fine` at drive 100, floored, and
/// never finer than `fine`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantization_step(drive: f32, coarse: u8, fine: u8) -> u8 {
    let n = normalized(drive);
    let step = f32::from(coarse) - n * (f32::from(coarse) - f32::from(fine));
    (step.floor().max(0.0) as u8).max(fine).max(1)
}

/// Scanline opacity for a drive value, fading linearly to zero at 100
#[must_use]
pub fn scanline_opacity(drive: f32, max_opacity: f32) -> f32 {
    max_opacity * (1.0 - normalized(drive))
}

/// Block side for a canvas width: `max(1, floor(width / columns))`
#[must_use]
pub fn block_size(canvas_width: u32, columns: u32) -> u32 {
    (canvas_width / columns.max(1)).max(1)
}

/// Round a channel down to a multiple of `step`
fn quantize(channel: u8, step: u8) -> u8 {
    (channel / step) * step
}

/// Stateless pixelation / quantization / scanline painter
#[derive(Clone, Debug, Default)]
pub struct EffectRenderer {
    config: EffectConfig,
}

impl EffectRenderer {
    /// Create a renderer
    #[must_use]
    pub fn new(config: EffectConfig) -> Self {
        Self { config }
    }

    /// Renderer settings
    #[must_use]
    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Render the provider's current frame at `drive`
    pub fn render(
        &self,
        canvas: &mut Canvas,
        source: &dyn SourceFrameProvider,
        drive: f32,
    ) -> RenderReport {
        match source.current_frame() {
            Some(frame) => self.render_frame(canvas, &frame, drive),
            None => RenderReport::Skipped(SkipReason::NotReady),
        }
    }

    /// Render a specific frame at `drive`
    pub fn render_frame(&self, canvas: &mut Canvas, frame: &SourceFrame, drive: f32) -> RenderReport {
        if frame.is_empty() {
            return RenderReport::Skipped(SkipReason::EmptySource);
        }
        let (display_w, display_h) = canvas.display_size();
        if display_w == 0 || display_h == 0 {
            return RenderReport::Skipped(SkipReason::ZeroCanvas);
        }

        canvas.fit_to_display();
        canvas.clear();

        let cfg = &self.config;
        let color_step = quantization_step(drive, cfg.coarse_color_step, cfg.fine_color_step);
        let block = block_size(canvas.width(), cfg.grid_columns);
        let sampler = Sampler::new(frame, cfg.sample_width, cfg.sample_height());

        let (w, h) = (canvas.width(), canvas.height());
        for y in (0..h).step_by(block as usize) {
            for x in (0..w).step_by(block as usize) {
                let px = sampler.sample(
                    f64::from(x) / f64::from(w),
                    f64::from(y) / f64::from(h),
                );
                let color = Rgba([
                    quantize(px[0], color_step),
                    quantize(px[1], color_step),
                    quantize(px[2], color_step),
                    255,
                ]);
                canvas.fill_rect(x, y, block, block, color);
            }
        }

        let opacity = scanline_opacity(drive, cfg.scanline_max_opacity);
        let scanlines = opacity > SCANLINE_VISIBILITY_FLOOR;
        if scanlines {
            for y in (0..h).step_by(cfg.scanline_period.max(1) as usize) {
                canvas.darken_row(y, opacity);
            }
        }

        RenderReport::Drawn {
            color_step,
            block_size: block,
            scanlines,
        }
    }
}

/// Nearest-neighbour lookup through the virtual sampling buffer
///
/// A normalized canvas coordinate is snapped to a cell of the
/// `sample_w x sample_h` grid, and that cell's center is mapped back into
/// the crop rectangle of the source. Equivalent to resampling the crop into
/// the buffer first, without allocating it on every tick.
struct Sampler<'a> {
    frame: &'a SourceFrame,
    crop: CropRect,
    sample_w: f64,
    sample_h: f64,
}

impl<'a> Sampler<'a> {
    fn new(frame: &'a SourceFrame, sample_w: u32, sample_h: u32) -> Self {
        Self {
            frame,
            crop: center_crop(frame.width(), frame.height(), TARGET_ASPECT_RATIO),
            sample_w: f64::from(sample_w.max(1)),
            sample_h: f64::from(sample_h.max(1)),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sample(&self, nx: f64, ny: f64) -> Rgba<u8> {
        let cell_x = (nx * self.sample_w).floor();
        let cell_y = (ny * self.sample_h).floor();

        let src_x = self.crop.x + (cell_x + 0.5) * self.crop.width / self.sample_w;
        let src_y = self.crop.y + (cell_y + 0.5) * self.crop.height / self.sample_h;

        let max_x = f64::from(self.frame.width() - 1);
        let max_y = f64::from(self.frame.height() - 1);
        let sx = src_x.floor().clamp(0.0, max_x) as u32;
        let sy = src_y.floor().clamp(0.0, max_y) as u32;

        *self.frame.pixels().get_pixel(sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::RgbaImage;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::frame::{LiveFeed, StillFrame};

    fn solid_still(w: u32, h: u32, color: [u8; 4]) -> StillFrame {
        StillFrame::new(Arc::new(SourceFrame::still(RgbaImage::from_pixel(
            w,
            h,
            Rgba(color),
        ))))
    }

    #[test]
    fn test_quantization_step_endpoints() {
        assert_eq!(quantization_step(0.0, 64, 16), 64);
        assert_eq!(quantization_step(100.0, 64, 16), 16);
        assert_eq!(quantization_step(50.0, 64, 16), 40);
        // out-of-range drive is clamped
        assert_eq!(quantization_step(-20.0, 64, 16), 64);
        assert_eq!(quantization_step(250.0, 64, 16), 16);
    }

    #[test]
    fn test_quantization_step_never_increases_with_drive() {
        let mut last = u8::MAX;
        for d in 0..=100 {
            let step = quantization_step(d as f32, 64, 16);
            assert!(step <= last);
            last = step;
        }
    }

    #[test]
    fn test_scanline_opacity_fades_out() {
        assert!((scanline_opacity(0.0, 0.15) - 0.15).abs() < 1e-6);
        assert!(scanline_opacity(100.0, 0.15).abs() < 1e-6);
        assert!((scanline_opacity(10.0, 0.15) - 0.135).abs() < 1e-6);
    }

    #[test]
    fn test_block_size_minimum_one() {
        assert_eq!(block_size(400, 40), 10);
        assert_eq!(block_size(39, 40), 1);
        assert_eq!(block_size(0, 40), 1);
    }

    #[test]
    fn test_sample_height_follows_ratio() {
        assert_eq!(EffectConfig::default().sample_height(), 1463);
    }

    #[test]
    fn test_unready_source_leaves_canvas_unchanged() {
        let mut canvas = Canvas::new(20, 20);
        canvas.fill_rect(0, 0, 20, 20, Rgba([1, 2, 3, 255]));
        let before = canvas.pixels().clone();

        let report = EffectRenderer::default().render(&mut canvas, &LiveFeed::new(), 50.0);
        assert_eq!(report, RenderReport::Skipped(SkipReason::NotReady));
        assert_eq!(canvas.pixels(), &before);
    }

    #[test]
    fn test_empty_source_leaves_canvas_unchanged() {
        let mut canvas = Canvas::new(20, 20);
        canvas.fill_rect(0, 0, 20, 20, Rgba([1, 2, 3, 255]));
        let before = canvas.pixels().clone();

        let report = EffectRenderer::default().render(&mut canvas, &solid_still(0, 0, [0; 4]), 50.0);
        assert_eq!(report, RenderReport::Skipped(SkipReason::EmptySource));
        assert_eq!(canvas.pixels(), &before);
    }

    #[test]
    fn test_zero_canvas_is_noop() {
        let mut canvas = Canvas::new(0, 10);
        let report =
            EffectRenderer::default().render(&mut canvas, &solid_still(7, 10, [9, 9, 9, 255]), 0.0);
        assert_eq!(report, RenderReport::Skipped(SkipReason::ZeroCanvas));
        assert_eq!(canvas.width(), 0);
    }

    #[test]
    fn test_drive_extremes_pick_step() {
        let renderer = EffectRenderer::default();
        let source = solid_still(70, 100, [200, 100, 50, 255]);

        let mut canvas = Canvas::new(40, 40);
        assert_eq!(
            renderer.render(&mut canvas, &source, 100.0),
            RenderReport::Drawn {
                color_step: 16,
                block_size: 1,
                scanlines: false
            }
        );
        assert_eq!(canvas.pixels().get_pixel(0, 0), &Rgba([192, 96, 48, 255]));

        assert_eq!(
            renderer.render(&mut canvas, &source, 0.0),
            RenderReport::Drawn {
                color_step: 64,
                block_size: 1,
                scanlines: true
            }
        );
        // row 1 is between scanlines
        assert_eq!(canvas.pixels().get_pixel(0, 1), &Rgba([192, 64, 0, 255]));
        // row 0 carries a 0.15 black line
        assert_eq!(canvas.pixels().get_pixel(0, 0), &Rgba([163, 54, 0, 255]));
        assert_eq!(canvas.pixels().get_pixel(0, 5), &Rgba([163, 54, 0, 255]));
    }

    #[test]
    fn test_canvas_follows_display_box() {
        let renderer = EffectRenderer::default();
        let source = solid_still(7, 10, [255, 255, 255, 255]);
        let mut canvas = Canvas::new(10, 10);
        canvas.set_display_size(80, 120);

        let report = renderer.render(&mut canvas, &source, 100.0);
        assert!(report.is_drawn());
        assert_eq!((canvas.width(), canvas.height()), (80, 120));
        assert!(matches!(report, RenderReport::Drawn { block_size: 2, .. }));
    }

    #[test]
    fn test_blocks_are_flat_and_follow_source_layout() {
        // left half red, right half blue; canvas 80 wide -> 2 px blocks
        let mut img = RgbaImage::new(70, 100);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 35 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            };
        }
        let source = StillFrame::new(Arc::new(SourceFrame::still(img)));
        let mut canvas = Canvas::new(80, 80);
        EffectRenderer::default().render(&mut canvas, &source, 100.0);

        assert_eq!(canvas.pixels().get_pixel(2, 2), &Rgba([240, 0, 0, 255]));
        assert_eq!(canvas.pixels().get_pixel(3, 3), &Rgba([240, 0, 0, 255]));
        assert_eq!(canvas.pixels().get_pixel(78, 2), &Rgba([0, 0, 240, 255]));
    }

    #[test]
    fn test_wide_source_is_center_cropped() {
        // 300x100 source: only the middle 70 columns survive the 7:10 crop
        let mut img = RgbaImage::from_pixel(300, 100, Rgba([0, 255, 0, 255]));
        for (x, _, px) in img.enumerate_pixels_mut() {
            if (115..185).contains(&x) {
                *px = Rgba([255, 255, 255, 255]);
            }
        }
        let source = StillFrame::new(Arc::new(SourceFrame::still(img)));
        let mut canvas = Canvas::new(40, 40);
        EffectRenderer::default().render(&mut canvas, &source, 100.0);

        assert!(canvas
            .pixels()
            .pixels()
            .all(|px| *px == Rgba([240, 240, 240, 255])));
    }
}
