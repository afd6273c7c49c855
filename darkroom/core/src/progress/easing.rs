//! Easing Curves
//!
//! Normalized curves (`0.0..=1.0` in, `0.0..=1.0` out) used by the progress
//! simulator's deceleration phase and by the result reveal fade.

use std::time::Duration;

/// Easing curves for the deceleration and the reveal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EasingFunction {
    /// Fast start, slow end
    EaseOut,

    /// Slow start and end
    EaseInOut,
}

impl EasingFunction {
    /// Apply the easing function to a progress value (0.0 to 1.0)
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            Self::EaseOut => 1.0 - (1.0 - t).powi(2),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

/// Quadratic ease-out blended with a linear floor
///
/// Plain ease-out reaches zero speed at `t = 1`. Mixing in `min_factor` of
/// the linear curve keeps the slope at or above `min_factor` everywhere, so a
/// long wait still creeps forward. `t` is clamped to `[0, 1]`.
#[must_use]
pub fn ease_out_quad_with_min_speed(t: f32, min_factor: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let min_factor = min_factor.clamp(0.0, 1.0);
    EasingFunction::EaseOut.apply(t) * (1.0 - min_factor) + t * min_factor
}

/// Opacity ramp for revealing the generated image
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RevealFade {
    /// Total fade length
    pub duration: Duration,
    /// Curve applied to elapsed / duration
    pub easing: EasingFunction,
}

impl Default for RevealFade {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(2500),
            easing: EasingFunction::EaseInOut,
        }
    }
}

impl RevealFade {
    /// Opacity in `[0, 1]` after `elapsed`
    #[must_use]
    pub fn opacity_at(&self, elapsed: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        self.easing
            .apply(elapsed.as_secs_f32() / self.duration.as_secs_f32())
    }

    /// Whether the fade has finished
    #[must_use]
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }
}
