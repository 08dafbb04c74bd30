//! Keep-alive and idle detection for one session.
//!
//! A half-open TCP connection looks healthy to the socket layer forever. The
//! monitor tracks when bytes last arrived and decides when to probe the
//! device and when to give up on it.
//!
//! | Condition | Action |
//! |-----------|--------|
//! | quiet for `keepalive_interval` and no probe outstanding | send keep-alive |
//! | quiet for more than `idle_timeout` | declare the connection dead |
//!
//! Any received frame counts as activity, not only the keep-alive reply.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in deadline for timeouts too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ============================================================================
// Types
// ============================================================================

/// What the session loop should do after a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// Nothing to do.
    Idle,
    /// Send a keep-alive query.
    SendKeepalive,
    /// Close the connection.
    Dead {
        /// Time since the last received frame.
        silent_for: Duration,
    },
}

/// Per-session liveness state.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    keepalive_interval: Duration,
    idle_timeout: Duration,
    last_received: Instant,
    last_keepalive: Instant,
    keepalive_outstanding: bool,
}

impl LivenessMonitor {
    /// Creates a monitor for a session that started at `now`.
    #[must_use]
    pub fn new(keepalive_interval: Duration, idle_timeout: Duration, now: Instant) -> Self {
        Self {
            keepalive_interval,
            idle_timeout,
            last_received: now,
            last_keepalive: now,
            keepalive_outstanding: false,
        }
    }

    /// Records that a frame arrived.
    #[inline]
    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Records that a keep-alive was queued.
    #[inline]
    pub fn keepalive_sent(&mut self, now: Instant) {
        self.last_keepalive = now;
        self.keepalive_outstanding = true;
    }

    /// Records that the outstanding keep-alive completed, successfully or not.
    #[inline]
    pub fn keepalive_finished(&mut self) {
        self.keepalive_outstanding = false;
    }

    /// Returns `true` while a keep-alive awaits its reply.
    #[inline]
    #[must_use]
    pub fn keepalive_outstanding(&self) -> bool {
        self.keepalive_outstanding
    }

    /// Time since the last received frame.
    #[inline]
    #[must_use]
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// Decides what to do at `now`.
    #[must_use]
    pub fn poll(&self, now: Instant) -> LivenessAction {
        let silent_for = self.silent_for(now);
        if silent_for > self.idle_timeout {
            return LivenessAction::Dead { silent_for };
        }

        let since_probe = now.saturating_duration_since(self.last_keepalive);
        if !self.keepalive_outstanding
            && silent_for >= self.keepalive_interval
            && since_probe >= self.keepalive_interval
        {
            return LivenessAction::SendKeepalive;
        }

        LivenessAction::Idle
    }

    /// Earliest instant at which [`poll`](Self::poll) may return something
    /// other than [`LivenessAction::Idle`].
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        // Idle detection fires strictly after the timeout.
        let dead_at = later(
            self.last_received,
            self.idle_timeout.saturating_add(Duration::from_millis(1)),
        );
        if self.keepalive_outstanding {
            return dead_at;
        }
        let probe_at = later(
            self.last_received.max(self.last_keepalive),
            self.keepalive_interval,
        );
        probe_at.min(dead_at)
    }
}

/// `at + delay`, clamped to a far-future instant on overflow.
pub(crate) fn later(at: Instant, delay: Duration) -> Instant {
    at.checked_add(delay)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(90);
    const IDLE: Duration = Duration::from_secs(300);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_unrepresentable_idle_timeout_does_not_overflow() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, Duration::MAX, start);

        assert_eq!(monitor.next_deadline(), start + INTERVAL);
        monitor.keepalive_sent(start + INTERVAL);
        assert!(monitor.next_deadline() > start + INTERVAL);
        assert_eq!(monitor.poll(start + secs(3_600)), LivenessAction::Idle);
    }

    #[test]
    fn test_quiet_session_probes_after_interval() {
        let start = Instant::now();
        let monitor = LivenessMonitor::new(INTERVAL, IDLE, start);

        assert_eq!(monitor.poll(start + secs(89)), LivenessAction::Idle);
        assert_eq!(monitor.poll(start + INTERVAL), LivenessAction::SendKeepalive);
        assert_eq!(monitor.next_deadline(), start + INTERVAL);
    }

    #[test]
    fn test_traffic_postpones_probe() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, IDLE, start);

        monitor.record_received(start + secs(60));
        assert_eq!(monitor.poll(start + secs(100)), LivenessAction::Idle);
        assert_eq!(monitor.next_deadline(), start + secs(150));
        assert_eq!(monitor.poll(start + secs(150)), LivenessAction::SendKeepalive);
    }

    #[test]
    fn test_single_outstanding_keepalive() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, IDLE, start);

        monitor.keepalive_sent(start + INTERVAL);
        assert!(monitor.keepalive_outstanding());
        assert_eq!(monitor.poll(start + secs(250)), LivenessAction::Idle);

        monitor.keepalive_finished();
        assert_eq!(monitor.poll(start + secs(250)), LivenessAction::SendKeepalive);
    }

    #[test]
    fn test_keepalive_interval_is_measured_from_last_probe() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, IDLE, start);

        monitor.keepalive_sent(start + INTERVAL);
        monitor.keepalive_finished();
        // Reply did not count as traffic in this test; still wait a full interval.
        assert_eq!(monitor.poll(start + secs(120)), LivenessAction::Idle);
        assert_eq!(monitor.next_deadline(), start + secs(180));
    }

    #[test]
    fn test_silence_past_idle_timeout_is_dead() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, IDLE, start);
        monitor.keepalive_sent(start + INTERVAL);

        assert_eq!(monitor.poll(start + IDLE), LivenessAction::Idle);
        assert_eq!(
            monitor.poll(start + secs(301)),
            LivenessAction::Dead {
                silent_for: secs(301)
            }
        );
        assert!(monitor.next_deadline() > start + IDLE);
    }

    #[test]
    fn test_received_frame_resets_idle_clock() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(INTERVAL, IDLE, start);
        monitor.keepalive_sent(start + INTERVAL);
        monitor.record_received(start + secs(290));

        assert_eq!(monitor.silent_for(start + secs(400)), secs(110));
        assert_eq!(monitor.poll(start + secs(400)), LivenessAction::Idle);
    }
}
