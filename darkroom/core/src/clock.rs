//! Injectable Time and Randomness
//!
//! The progress simulator is keyed on elapsed wall-clock time and on one
//! random draw per run. Both are abstracted here so tests can drive them
//! deterministically.
//!
//! Time is expressed as [`tokio::time::Instant`], which follows the tokio
//! clock. Under `#[tokio::test(start_paused = true)]` the [`TokioClock`]
//! therefore advances only when the test calls `tokio::time::advance`.

use std::ops::RangeInclusive;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

/// Source of "now" for everything that measures elapsed time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio time driver
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for unit tests
///
/// Starts at the instant it was created and only moves when
/// [`ManualClock::advance`] or [`ManualClock::set_elapsed`] is called.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Jump to an absolute offset from the origin
    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.offset.lock() = elapsed;
    }

    /// Offset from the origin
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

/// Source of uniform integer draws
pub trait RandomSource: Send + Sync {
    /// Draw a uniform integer from the inclusive range
    fn uniform(&self, range: RangeInclusive<u8>) -> u8;
}

/// Thread-local RNG, the production default
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&self, range: RangeInclusive<u8>) -> u8 {
        rand::thread_rng().gen_range(range)
    }
}

/// Seeded RNG for reproducible sequences
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Create from a seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&self, range: RangeInclusive<u8>) -> u8 {
        self.rng.lock().gen_range(range)
    }
}

/// Always returns the same value, clamped into the requested range
#[derive(Clone, Copy, Debug)]
pub struct FixedRandom(pub u8);

impl RandomSource for FixedRandom {
    fn uniform(&self, range: RangeInclusive<u8>) -> u8 {
        self.0.clamp(*range.start(), *range.end())
    }
}
