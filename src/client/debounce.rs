//! Availability debouncing.
//!
//! Observers only hear about unavailability once the device has stayed
//! unreachable for a full window. A connection that comes back inside the
//! window produces no events at all, so a flapping link does not make the
//! host application flicker.

use std::time::Duration;

use tokio::time::Instant;

use crate::transport::liveness::later;

/// Tracks what observers were last told and when a loss was first seen.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    reported: Option<bool>,
    lost_since: Option<Instant>,
}

impl Debouncer {
    /// Creates a debouncer with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            reported: None,
            lost_since: None,
        }
    }

    /// The value observers were last given, if any.
    #[inline]
    #[must_use]
    pub fn reported(&self) -> Option<bool> {
        self.reported
    }

    /// The connection came up. Returns `Some(true)` if observers must be told.
    pub fn on_available(&mut self) -> Option<bool> {
        self.lost_since = None;
        self.report(true)
    }

    /// The connection dropped unexpectedly at `now`.
    ///
    /// Nothing is reported yet; the loss is held until [`deadline`](Self::deadline).
    /// Repeated losses keep the first timestamp.
    pub fn on_lost(&mut self, now: Instant) {
        if self.reported == Some(true) && self.lost_since.is_none() {
            self.lost_since = Some(now);
        }
    }

    /// The host disconnected on purpose; reported without delay.
    pub fn on_disconnected(&mut self) -> Option<bool> {
        self.lost_since = None;
        if self.reported == Some(true) {
            self.report(false)
        } else {
            None
        }
    }

    /// When the held loss becomes reportable.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.lost_since.map(|at| later(at, self.window))
    }

    /// Reports a held loss whose window has elapsed by `now`.
    pub fn fire(&mut self, now: Instant) -> Option<bool> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.lost_since = None;
        self.report(false)
    }

    fn report(&mut self, available: bool) -> Option<bool> {
        if self.reported == Some(available) {
            return None;
        }
        self.reported = Some(available);
        Some(available)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_first_connect_is_reported() {
        let mut debouncer = Debouncer::new(WINDOW);
        assert_eq!(debouncer.on_available(), Some(true));
        assert_eq!(debouncer.on_available(), None);
    }

    #[test]
    fn test_flap_within_window_is_silent() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.on_available();

        debouncer.on_lost(start);
        assert_eq!(debouncer.deadline(), Some(start + WINDOW));
        assert_eq!(debouncer.fire(start + Duration::from_secs(30)), None);

        assert_eq!(debouncer.on_available(), None);
        assert_eq!(debouncer.deadline(), None);
        assert_eq!(debouncer.fire(start + WINDOW), None);
    }

    #[test]
    fn test_long_outage_reports_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.on_available();

        debouncer.on_lost(start);
        debouncer.on_lost(start + Duration::from_secs(40));
        assert_eq!(debouncer.deadline(), Some(start + WINDOW));

        assert_eq!(debouncer.fire(start + WINDOW), Some(false));
        assert_eq!(debouncer.fire(start + WINDOW + WINDOW), None);
        assert_eq!(debouncer.on_available(), Some(true));
    }

    #[test]
    fn test_loss_before_first_availability_is_not_held() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.on_lost(Instant::now());
        assert_eq!(debouncer.deadline(), None);
    }

    #[test]
    fn test_unrepresentable_window_never_fires() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::MAX);
        debouncer.on_available();
        debouncer.on_lost(start);

        assert!(debouncer.deadline().is_some_and(|at| at > start));
        assert_eq!(debouncer.fire(start + WINDOW), None);
    }

    #[test]
    fn test_explicit_disconnect_skips_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.on_available();
        debouncer.on_lost(start);

        assert_eq!(debouncer.on_disconnected(), Some(false));
        assert_eq!(debouncer.deadline(), None);
        assert_eq!(debouncer.on_disconnected(), None);
        assert_eq!(debouncer.reported(), Some(false));
    }
}
