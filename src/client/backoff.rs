//! Reconnect delay calculation.
//!
//! The deterministic sequence is `base, base*m, base*m^2, ...` capped at
//! `max`. With the defaults (30 s, 1.5) that is 30, 45, 67.5, 101.25 s and
//! so on. Jitter is applied on top of each step so that several clients
//! restarted together do not hammer the controller in lockstep.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::config::ClientOptions;

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    max: Duration,
    jitter: f64,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff starting at `base`.
    #[must_use]
    pub fn new(base: Duration, multiplier: f64, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            multiplier,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            current: base.min(max),
            attempt: 0,
        }
    }

    /// Creates a backoff from client options.
    #[must_use]
    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(
            options.backoff_base,
            options.backoff_multiplier,
            options.backoff_max,
            options.backoff_jitter,
        )
    }

    /// Number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the next delay of the deterministic sequence and advances it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = scale(self.current, self.multiplier)
            .map_or(self.max, |d| d.min(self.max));
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Returns the next delay with random jitter applied.
    pub fn next_jittered(&mut self) -> Duration {
        let delay = self.next_delay();
        apply_jitter(delay, self.jitter, &mut rand::thread_rng())
    }

    /// Starts over from the base delay.
    pub fn reset(&mut self) {
        self.current = self.base.min(self.max);
        self.attempt = 0;
    }
}

/// Scales `delay` by a random factor in `[1 - jitter, 1 + jitter]`.
fn apply_jitter<R: Rng>(delay: Duration, jitter: f64, rng: &mut R) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
    scale(delay, factor).unwrap_or(delay)
}

/// Multiplies `delay` by `factor`, or `None` if the result does not fit.
fn scale(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}

// ============================================================================
// Tests
// ============================================================================
