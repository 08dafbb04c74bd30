//! Rate limiting for repetitive log lines.
//!
//! A flapping network or a device stuck emitting garbage can produce the same
//! warning thousands of times. [`LogThrottle`] lets the first occurrence
//! through and then at most one line per window, carrying the number of
//! occurrences it swallowed in between.

use std::time::Duration;

use tokio::time::Instant;

/// Window-based log limiter.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    window: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    /// Creates a throttle allowing one line per `window`.
    #[inline]
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Registers one occurrence.
    ///
    /// Returns `Some(suppressed)` if the caller should log now, where
    /// `suppressed` counts the occurrences dropped since the previous line.
    pub fn check(&mut self, now: Instant) -> Option<u64> {
        match self.last_logged {
            Some(at) if now.saturating_duration_since(at) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last_logged = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }

    /// Forgets history so the next occurrence is logged immediately.
    pub fn reset(&mut self) {
        self.last_logged = None;
        self.suppressed = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================
