//! Events delivered to the host application.
//!
//! Each [`Client`](crate::Client) owns exactly one event channel, created by
//! [`ClientBuilder::build`](crate::ClientBuilder::build). There is no global
//! dispatcher; whoever holds the [`Events`] receiver sees everything.
//!
//! | Event | When |
//! |-------|------|
//! | [`ClientEvent::AvailabilityChanged`] | device became reachable or (after debouncing) unreachable |
//! | [`ClientEvent::AttributesChanged`] | one object changed in one incoming message |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::trace;

// ============================================================================
// ClientEvent
// ============================================================================

/// Something the host application may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connectivity as observers should see it.
    AvailabilityChanged(bool),

    /// Attributes of one object changed value.
    AttributesChanged {
        /// Object name.
        object: String,
        /// Names of the attributes whose value changed.
        attributes: BTreeSet<String>,
    },
}

impl ClientEvent {
    /// Returns the object name for attribute events.
    #[inline]
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        match self {
            Self::AttributesChanged { object, .. } => Some(object),
            Self::AvailabilityChanged(_) => None,
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Creates a connected sender/receiver pair.
pub(crate) fn channel() -> (EventSender, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, Events { rx })
}

/// Sending half, owned by the supervisor.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventSender {
    /// Delivers an event; silently dropped if nobody listens anymore.
    pub(crate) fn send(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    /// Delivers several events in order.
    pub(crate) fn send_all(&self, events: impl IntoIterator<Item = ClientEvent>) {
        for event in events {
            self.send(event);
        }
    }
}

/// Receiving half, handed to the host application.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Events {
    /// Waits for the next event.
    ///
    /// Returns `None` once the client has shut down and every event has been
    /// consumed.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Returns the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
