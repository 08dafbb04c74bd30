//! Single-slot request multiplexer.
//!
//! The controller cannot parse a second request while it is still answering
//! the first, so exactly one request is ever on the wire. Everything else
//! waits in a FIFO queue and is sent the moment the in-flight slot frees up.
//!
//! The multiplexer is a pure state machine: it never touches the socket or
//! the clock. Callers pass `now` in and write whatever [`Request`]s it hands
//! back. Waiters are generic so the connection loop can mix external callers
//! with its own internal bookkeeping requests.
//!
//! # Correlation policy
//!
//! | Incoming `messageID` | Abandoned ids present? | Outcome |
//! |----------------------|------------------------|---------|
//! | matches in-flight | any | complete in-flight |
//! | matches an abandoned request | - | discard (late reply) |
//! | anything else | no | complete in-flight, warn (device bug) |
//! | anything else | yes | discard, warn (ambiguous) |
//! | anything | nothing in flight | discard |
//!
//! Abandoned requests are the ones force-failed by deadlock detection; they
//! are remembered for one request-timeout window.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::liveness::later;
use tracing::{debug, trace, warn};

use crate::identifiers::MessageId;
use crate::protocol::{Command, Request, Response};

// ============================================================================
// Types
// ============================================================================

/// A request waiting for (or occupying) the in-flight slot.
#[derive(Debug)]
pub struct PendingRequest<W> {
    /// The request as it will be written.
    pub request: Request,
    /// Who gets the reply.
    pub waiter: W,
}

/// The request currently on the wire.
#[derive(Debug)]
struct InFlight<W> {
    pending: PendingRequest<W>,
    sent_at: Instant,
}

/// A request that was given up on but may still be answered.
#[derive(Debug, Clone, Copy)]
struct Abandoned {
    message_id: MessageId,
    at: Instant,
}

/// Result of feeding a response into the multiplexer.
#[derive(Debug)]
pub enum Dispatch<W> {
    /// The response belongs to this waiter.
    Completed {
        /// Waiter of the in-flight request.
        waiter: W,
        /// The original request.
        request: Request,
        /// The reply.
        response: Response,
        /// Set when the identifiers did not match.
        mismatched: bool,
    },
    /// The response was dropped.
    Discarded {
        /// Why it was dropped.
        reason: DiscardReason,
    },
}

/// Why a response was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Nothing was waiting for a reply.
    NothingInFlight,
    /// Late reply to a request already failed by deadlock detection.
    LateReply,
    /// Could belong to the in-flight request or an abandoned one.
    Ambiguous,
}

/// A request force-failed by deadlock detection.
#[derive(Debug)]
pub struct Expired<W> {
    /// The failed request and its waiter.
    pub pending: PendingRequest<W>,
    /// How long it sat in flight.
    pub waited: Duration,
}

// ============================================================================
// Multiplexer
// ============================================================================

/// Serializes requests onto the wire and correlates replies.
#[derive(Debug)]
pub struct Multiplexer<W> {
    /// Identifier for the next submitted request.
    next_id: MessageId,
    /// Request on the wire, if any.
    in_flight: Option<InFlight<W>>,
    /// Requests waiting for the slot, oldest first.
    queue: VecDeque<PendingRequest<W>>,
    /// Recently force-failed requests, oldest first.
    abandoned: VecDeque<Abandoned>,
    /// Deadlock ceiling for the in-flight slot.
    request_timeout: Duration,
}

impl<W> Multiplexer<W> {
    /// Creates an empty multiplexer; identifiers start at 1.
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            next_id: MessageId::FIRST,
            in_flight: None,
            queue: VecDeque::new(),
            abandoned: VecDeque::new(),
            request_timeout,
        }
    }

    /// Returns `true` if a request is on the wire.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Returns the number of queued (not yet sent) requests.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns the identifier of the in-flight request.
    #[inline]
    #[must_use]
    pub fn in_flight_id(&self) -> Option<MessageId> {
        self.in_flight
            .as_ref()
            .map(|f| f.pending.request.message_id)
    }

    /// Iterates over all waiters, in-flight first, then in queue order.
    pub fn waiters(&self) -> impl Iterator<Item = &W> {
        self.in_flight
            .iter()
            .map(|f| &f.pending.waiter)
            .chain(self.queue.iter().map(|p| &p.waiter))
    }

    /// Assigns an identifier and enqueues the command.
    ///
    /// Returns the request to write if the slot was free.
    pub fn submit(&mut self, command: Command, waiter: W, now: Instant) -> Option<Request> {
        let message_id = self.next_id;
        self.next_id = self.next_id.next();

        let pending = PendingRequest {
            request: Request::new(message_id, command),
            waiter,
        };

        if self.in_flight.is_some() {
            trace!(%message_id, queued = self.queue.len() + 1, "Request queued");
            self.queue.push_back(pending);
            None
        } else {
            Some(self.start(pending, now))
        }
    }

    /// Correlates a response with the in-flight request.
    ///
    /// Returns the dispatch decision and, if the slot was freed, the next
    /// request to write.
    pub fn on_response(&mut self, response: Response, now: Instant) -> (Dispatch<W>, Option<Request>) {
        self.prune_abandoned(now);

        let Some(in_flight_id) = self.in_flight_id() else {
            if let Some(id) = response.message_id {
                self.forget_abandoned(id);
            }
            debug!(message_id = ?response.message_id, "Response with nothing in flight");
            return (
                Dispatch::Discarded {
                    reason: DiscardReason::NothingInFlight,
                },
                None,
            );
        };

        let exact = response.message_id == Some(in_flight_id);
        if !exact {
            if let Some(id) = response.message_id
                && self.forget_abandoned(id)
            {
                debug!(%id, "Late reply to abandoned request discarded");
                return (
                    Dispatch::Discarded {
                        reason: DiscardReason::LateReply,
                    },
                    None,
                );
            }

            if let Some(oldest) = self.abandoned.pop_front() {
                warn!(
                    received = ?response.message_id,
                    in_flight = %in_flight_id,
                    abandoned = %oldest.message_id,
                    "Ambiguous response discarded"
                );
                return (
                    Dispatch::Discarded {
                        reason: DiscardReason::Ambiguous,
                    },
                    None,
                );
            }

            warn!(
                received = ?response.message_id,
                in_flight = %in_flight_id,
                "Response identifier mismatch, completing in-flight request"
            );
        }

        let Some(InFlight { pending, .. }) = self.in_flight.take() else {
            return (
                Dispatch::Discarded {
                    reason: DiscardReason::NothingInFlight,
                },
                None,
            );
        };
        let next = self.advance(now);

        (
            Dispatch::Completed {
                waiter: pending.waiter,
                request: pending.request,
                response,
                mismatched: !exact,
            },
            next,
        )
    }

    /// Force-fails the in-flight request if it exceeded the ceiling.
    ///
    /// Returns the expired request and, if one was waiting, the next request
    /// to write.
    pub fn check_timeout(&mut self, now: Instant) -> Option<(Expired<W>, Option<Request>)> {
        self.prune_abandoned(now);

        let waited = now.saturating_duration_since(self.in_flight.as_ref()?.sent_at);
        if waited < self.request_timeout {
            return None;
        }

        let InFlight { pending, .. } = self.in_flight.take()?;
        let message_id = pending.request.message_id;
        warn!(
            %message_id,
            waited_ms = waited.as_millis() as u64,
            queued = self.queue.len(),
            "In-flight request stalled, advancing queue"
        );

        self.abandoned.push_back(Abandoned { message_id, at: now });
        let next = self.advance(now);

        Some((Expired { pending, waited }, next))
    }

    /// Returns when the in-flight request will hit the ceiling.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight
            .as_ref()
            .map(|f| later(f.sent_at, self.request_timeout))
    }

    /// Removes every request, in-flight first, then in queue order.
    pub fn drain(&mut self) -> Vec<PendingRequest<W>> {
        self.abandoned.clear();
        self.in_flight
            .take()
            .map(|f| f.pending)
            .into_iter()
            .chain(self.queue.drain(..))
            .collect()
    }

    /// Occupies the slot with `pending` and hands back its request.
    fn start(&mut self, pending: PendingRequest<W>, now: Instant) -> Request {
        let request = pending.request.clone();
        trace!(message_id = %request.message_id, command = request.command.name(), "Request in flight");
        self.in_flight = Some(InFlight {
            pending,
            sent_at: now,
        });
        request
    }

    /// Moves the oldest queued request into the free slot.
    fn advance(&mut self, now: Instant) -> Option<Request> {
        let pending = self.queue.pop_front()?;
        Some(self.start(pending, now))
    }

    fn forget_abandoned(&mut self, id: MessageId) -> bool {
        match self.abandoned.iter().position(|a| a.message_id == id) {
            Some(index) => {
                self.abandoned.remove(index);
                true
            }
            None => false,
        }
    }

    fn prune_abandoned(&mut self, now: Instant) {
        while let Some(oldest) = self.abandoned.front() {
            if now.saturating_duration_since(oldest.at) < self.request_timeout {
                break;
            }
            self.abandoned.pop_front();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Incoming;
    use serde_json::{Value, json};

    const CEILING: Duration = Duration::from_secs(45);

    fn reply(id: &str, code: &str) -> Response {
        let Value::Object(map) =
            json!({"messageID": id, "command": "SendParamList", "response": code})
        else {
            unreachable!();
        };
        match Incoming::classify(map) {
            Incoming::Response(r) => r,
            Incoming::Notification(_) => unreachable!(),
        }
    }

    fn completed(dispatch: Dispatch<u32>) -> (u32, bool) {
        match dispatch {
            Dispatch::Completed {
                waiter, mismatched, ..
            } => (waiter, mismatched),
            Dispatch::Discarded { reason } => panic!("discarded: {reason:?}"),
        }
    }

    #[test]
    fn test_first_submit_is_sent_immediately() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);

        let sent = mux.submit(Command::keepalive(), 1u32, now).expect("sent");
        assert_eq!(sent.message_id, MessageId::new(1));
        assert!(mux.is_busy());

        assert!(mux.submit(Command::keepalive(), 2, now).is_none());
        assert!(mux.submit(Command::keepalive(), 3, now).is_none());
        assert_eq!(mux.queued(), 2);
    }

    #[test]
    fn test_responses_advance_queue_in_order() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 1u32, now);
        mux.submit(Command::keepalive(), 2, now);
        mux.submit(Command::keepalive(), 3, now);

        let mut order = Vec::new();
        let mut expected_id = 1;
        while mux.is_busy() {
            assert_eq!(mux.in_flight_id(), Some(MessageId::new(expected_id)));
            let (dispatch, next) = mux.on_response(reply(&expected_id.to_string(), "200"), now);
            order.push(completed(dispatch).0);
            expected_id += 1;
            assert_eq!(next.is_some(), mux.is_busy());
        }

        assert_eq!(order, [1, 2, 3]);
        assert_eq!(mux.queued(), 0);
    }

    #[test]
    fn test_at_most_one_in_flight_under_interleaving() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        let mut on_wire: Vec<MessageId> = Vec::new();
        let mut completions = Vec::new();

        for round in 0..20u32 {
            if let Some(req) = mux.submit(Command::keepalive(), round, now) {
                on_wire.push(req.message_id);
            }
            if round % 3 == 2 {
                let id = mux.in_flight_id().expect("busy").to_string();
                let (dispatch, next) = mux.on_response(reply(&id, "200"), now);
                completions.push(completed(dispatch).0);
                on_wire.extend(next.map(|r| r.message_id));
            }
            // Every written request except the last has been answered.
            assert_eq!(on_wire.len(), completions.len() + usize::from(mux.is_busy()));
        }

        let mut sorted = completions.clone();
        sorted.sort_unstable();
        assert_eq!(completions, sorted);
    }

    #[test]
    fn test_mismatched_id_completes_single_in_flight() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 7u32, now);

        let (dispatch, _) = mux.on_response(reply("999", "400"), now);
        let (waiter, mismatched) = completed(dispatch);
        assert_eq!(waiter, 7);
        assert!(mismatched);
        assert!(!mux.is_busy());
    }

    #[test]
    fn test_unparseable_id_completes_single_in_flight() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 7u32, now);

        let (dispatch, _) = mux.on_response(reply("oops", "200"), now);
        assert!(completed(dispatch).1);
    }

    #[test]
    fn test_response_without_in_flight_is_discarded() {
        let now = Instant::now();
        let mut mux: Multiplexer<u32> = Multiplexer::new(CEILING);
        let (dispatch, next) = mux.on_response(reply("1", "200"), now);
        assert!(matches!(
            dispatch,
            Dispatch::Discarded {
                reason: DiscardReason::NothingInFlight
            }
        ));
        assert!(next.is_none());
    }

    #[test]
    fn test_deadlock_detection_advances_queue() {
        let start = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 1u32, start);
        mux.submit(Command::keepalive(), 2, start);

        assert_eq!(mux.deadline(), Some(start + CEILING));
        assert!(mux.check_timeout(start + CEILING - Duration::from_secs(1)).is_none());

        let (expired, next) = mux.check_timeout(start + CEILING).expect("expired");
        assert_eq!(expired.pending.waiter, 1);
        assert_eq!(expired.waited, CEILING);
        assert_eq!(next.expect("next").message_id, MessageId::new(2));
        assert_eq!(mux.deadline(), Some(start + CEILING + CEILING));
    }

    #[test]
    fn test_late_reply_to_abandoned_request_is_discarded() {
        let start = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 1u32, start);
        mux.submit(Command::keepalive(), 2, start);
        let later = start + CEILING;
        mux.check_timeout(later).expect("expired");

        let (dispatch, next) = mux.on_response(reply("1", "200"), later);
        assert!(matches!(
            dispatch,
            Dispatch::Discarded {
                reason: DiscardReason::LateReply
            }
        ));
        assert!(next.is_none());
        assert_eq!(mux.in_flight_id(), Some(MessageId::new(2)));

        let (dispatch, _) = mux.on_response(reply("2", "200"), later);
        assert_eq!(completed(dispatch), (2, false));
    }

    #[test]
    fn test_ambiguous_reply_is_discarded_then_tolerated() {
        let start = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 1u32, start);
        mux.submit(Command::keepalive(), 2, start);
        let later = start + CEILING;
        mux.check_timeout(later).expect("expired");

        let (dispatch, _) = mux.on_response(reply("77", "400"), later);
        assert!(matches!(
            dispatch,
            Dispatch::Discarded {
                reason: DiscardReason::Ambiguous
            }
        ));

        // The abandoned entry was consumed; the next stray reply is tolerated.
        let (dispatch, _) = mux.on_response(reply("78", "400"), later);
        assert_eq!(completed(dispatch), (2, true));
    }

    #[test]
    fn test_abandoned_entries_expire() {
        let start = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        mux.submit(Command::keepalive(), 1u32, start);
        mux.submit(Command::keepalive(), 2, start);
        mux.check_timeout(start + CEILING).expect("expired");

        // One ceiling later the abandoned entry no longer causes ambiguity.
        let (dispatch, _) = mux.on_response(reply("50", "200"), start + CEILING + CEILING);
        assert_eq!(completed(dispatch), (2, true));
    }

    #[test]
    fn test_drain_returns_everything_in_order() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        for w in 1..=4u32 {
            mux.submit(Command::keepalive(), w, now);
        }

        let waiters: Vec<u32> = mux.waiters().copied().collect();
        assert_eq!(waiters, [1, 2, 3, 4]);

        let drained: Vec<u32> = mux.drain().into_iter().map(|p| p.waiter).collect();
        assert_eq!(drained, [1, 2, 3, 4]);
        assert!(!mux.is_busy());
        assert_eq!(mux.queued(), 0);
        assert!(mux.deadline().is_none());
    }

    #[test]
    fn test_identifiers_are_monotonic() {
        let now = Instant::now();
        let mut mux = Multiplexer::new(CEILING);
        let mut ids = Vec::new();
        for w in 0..5u32 {
            if let Some(req) = mux.submit(Command::keepalive(), w, now) {
                ids.push(req.message_id);
            }
            let id = mux.in_flight_id().expect("busy").to_string();
            let (_, next) = mux.on_response(reply(&id, "200"), now);
            assert!(next.is_none());
        }
        let raw: Vec<u64> = ids.iter().map(|id| id.as_u64()).collect();
        assert_eq!(raw, [1, 2, 3, 4, 5]);
    }
}
