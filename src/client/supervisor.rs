//! Connection lifecycle actor.
//!
//! One task owns the socket, the synchronizer and every timer. The host talks
//! to it through [`ClientCommand`]s; it talks back through the event channel
//! and a watch channel carrying the [`ConnectionState`].
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!       ▲                     │   ▲                │
//!       │                  fail   └─── delay ───┐  │ lost (socket error,
//!       │                     ▼                 │  │ idle timeout)
//!       └──disconnect──── Reconnecting ◄────────┴──┘
//! ```
//!
//! Only one phase runs at a time, so at most one connect attempt is ever in
//! progress and nothing is written while not connected.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use futures_util::future::OptionFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{ClientOptions, DeviceAddress};
use crate::error::{Error, Result};
use crate::events::{ClientEvent, EventSender};
use crate::identifiers::Generation;
use crate::model::{Subscription, Synchronizer};
use crate::protocol::{Command, Response};
use crate::transport::LogThrottle;
use crate::transport::connection::{Connection, InternalRequest, SessionSettings, Waiter};
use crate::transport::liveness::later;

use super::backoff::Backoff;
use super::debounce::Debouncer;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected and not trying to.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Waiting before the next connect attempt.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ClientCommand
// ============================================================================

/// Requests from [`Client`](super::Client) handles to the actor.
pub(crate) enum ClientCommand {
    /// Start connecting; the reply reports the first attempt.
    Connect {
        address: DeviceAddress,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Close the session and stop reconnecting.
    Disconnect { reply: oneshot::Sender<()> },
    /// Add pairs to the subscription set.
    Subscribe {
        pairs: Vec<Subscription>,
        reply: oneshot::Sender<Result<usize>>,
    },
    /// Send a command and wait for its reply.
    Send {
        command: Command,
        reply: oneshot::Sender<Result<Response>>,
    },
    /// Disconnect and end the actor.
    Shutdown,
}

// ============================================================================
// Phase
// ============================================================================

enum Phase {
    Idle,
    Connecting {
        address: DeviceAddress,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    Connected {
        address: DeviceAddress,
        connection: Connection,
    },
    Waiting {
        address: DeviceAddress,
        until: Instant,
    },
    Stopped,
}

/// What an offline phase should do after handling a command.
enum Next {
    Stay,
    Go(Phase),
}

// ============================================================================
// Supervisor
// ============================================================================

/// The actor behind every [`Client`](super::Client) handle.
pub(crate) struct Supervisor {
    options: ClientOptions,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    state: watch::Sender<ConnectionState>,
    events: EventSender,
    sync: Synchronizer,
    backoff: Backoff,
    debouncer: Debouncer,
    generation: Generation,
    connect_log: LogThrottle,
}

impl Supervisor {
    pub(crate) fn new(
        options: ClientOptions,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
        state: watch::Sender<ConnectionState>,
        events: EventSender,
        sync: Synchronizer,
    ) -> Self {
        Self {
            backoff: Backoff::from_options(&options),
            debouncer: Debouncer::new(options.debounce_window),
            connect_log: LogThrottle::new(options.backoff_max),
            generation: Generation::default(),
            options,
            commands,
            state,
            events,
            sync,
        }
    }

    /// Runs until shutdown or until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connecting { address, reply } => self.connecting(address, reply).await,
                Phase::Connected {
                    address,
                    connection,
                } => self.connected(address, connection).await,
                Phase::Waiting { address, until } => self.waiting(address, until).await,
                Phase::Stopped => break,
            };
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Supervisor stopped");
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    async fn idle(&mut self) -> Phase {
        self.set_state(ConnectionState::Disconnected);
        loop {
            let debounce = debounce_timer(self.debouncer.deadline());
            tokio::select! {
                Some(()) = debounce => self.fire_debounce(),
                command = self.commands.recv() => {
                    if let Next::Go(phase) = self.handle_offline(command, None) {
                        return phase;
                    }
                }
            }
        }
    }

    async fn connecting(
        &mut self,
        address: DeviceAddress,
        mut reply: Option<oneshot::Sender<Result<()>>>,
    ) -> Phase {
        self.generation = self.generation.next();
        self.set_state(ConnectionState::Connecting);

        let open = Connection::open(
            address.clone(),
            SessionSettings::from(&self.options),
            self.generation,
        );
        tokio::pin!(open);

        loop {
            let debounce = debounce_timer(self.debouncer.deadline());
            tokio::select! {
                result = &mut open => {
                    return match result {
                        Ok(connection) => self.established(address, connection, reply).await,
                        Err(e) => {
                            self.log_connect_failure(&e);
                            if let Some(reply) = reply.take() {
                                let _ = reply.send(Err(e));
                            }
                            self.schedule_retry(address)
                        }
                    };
                }
                Some(()) = debounce => self.fire_debounce(),
                command = self.commands.recv() => {
                    if let Next::Go(phase) = self.handle_offline(command, Some(&address)) {
                        if let Some(reply) = reply.take() {
                            let _ = reply.send(Err(Error::NotConnected));
                        }
                        return phase;
                    }
                }
            }
        }
    }

    async fn waiting(&mut self, address: DeviceAddress, until: Instant) -> Phase {
        self.set_state(ConnectionState::Reconnecting);
        let retry = sleep_until(until);
        tokio::pin!(retry);

        loop {
            let debounce = debounce_timer(self.debouncer.deadline());
            tokio::select! {
                () = &mut retry => {
                    return Phase::Connecting { address, reply: None };
                }
                Some(()) = debounce => self.fire_debounce(),
                command = self.commands.recv() => {
                    if let Next::Go(phase) = self.handle_offline(command, Some(&address)) {
                        return phase;
                    }
                }
            }
        }
    }

    async fn connected(&mut self, address: DeviceAddress, mut connection: Connection) -> Phase {
        loop {
            let deadline = connection.next_deadline();
            let outcome = tokio::select! {
                read = connection.read_chunk() => match read {
                    Ok(len) => connection.on_read(len, &self.sync, &self.events).await,
                    Err(e) => Err(e),
                },
                () = sleep_until(deadline) => connection.on_timer(Instant::now()).await,
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Send { command, reply }) => {
                        connection.submit(command, Waiter::Caller(reply)).await
                    }
                    Some(ClientCommand::Subscribe { pairs, reply }) => {
                        self.subscribe_live(&mut connection, pairs, reply).await
                    }
                    Some(ClientCommand::Connect { reply, .. }) => {
                        let _ = reply.send(Err(Error::invalid_argument(format!(
                            "already connected to {address}"
                        ))));
                        Ok(())
                    }
                    Some(ClientCommand::Disconnect { reply }) => {
                        self.close_on_request(connection).await;
                        let _ = reply.send(());
                        return Phase::Idle;
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        self.close_on_request(connection).await;
                        return Phase::Stopped;
                    }
                },
            };

            if let Err(e) = outcome {
                return self.lost(address, connection, e).await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    async fn established(
        &mut self,
        address: DeviceAddress,
        mut connection: Connection,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) -> Phase {
        self.backoff.reset();
        self.connect_log.reset();
        self.set_state(ConnectionState::Connected);

        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
        if let Some(available) = self.debouncer.on_available() {
            info!(generation = %self.generation, "Device available");
            self.events.send(ClientEvent::AvailabilityChanged(available));
        }

        match connection
            .start(&self.sync, &self.options.discovery_keys)
            .await
        {
            Ok(()) => Phase::Connected {
                address,
                connection,
            },
            Err(e) => self.lost(address, connection, e).await,
        }
    }

    async fn lost(&mut self, address: DeviceAddress, connection: Connection, error: Error) -> Phase {
        warn!(
            generation = %connection.generation(),
            %address,
            error = %error,
            "Connection lost"
        );
        connection.close().await;

        self.debouncer.on_lost(Instant::now());
        self.backoff.reset();
        self.schedule_retry(address)
    }

    fn schedule_retry(&mut self, address: DeviceAddress) -> Phase {
        let delay = self.backoff.next_jittered();
        info!(
            %address,
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        Phase::Waiting {
            address,
            until: later(Instant::now(), delay),
        }
    }

    async fn close_on_request(&mut self, connection: Connection) {
        info!(generation = %connection.generation(), "Disconnecting");
        connection.close().await;
        self.report_disconnected();
        self.set_state(ConnectionState::Disconnected);
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Handles a command while no session exists.
    fn handle_offline(&mut self, command: Option<ClientCommand>, active: Option<&DeviceAddress>) -> Next {
        match command {
            Some(ClientCommand::Connect { address, reply }) => match active {
                Some(current) => {
                    let _ = reply.send(Err(Error::invalid_argument(format!(
                        "already connecting to {current}"
                    ))));
                    Next::Stay
                }
                None => Next::Go(Phase::Connecting {
                    address,
                    reply: Some(reply),
                }),
            },
            Some(ClientCommand::Disconnect { reply }) => {
                if active.is_some() {
                    info!("Reconnect cancelled");
                }
                self.report_disconnected();
                self.set_state(ConnectionState::Disconnected);
                let _ = reply.send(());
                Next::Go(Phase::Idle)
            }
            Some(ClientCommand::Subscribe { pairs, reply }) => {
                let added = self.sync.subscribe(pairs);
                debug!(added = added.len(), "Subscriptions recorded for next connection");
                let _ = reply.send(Ok(added.len()));
                Next::Stay
            }
            Some(ClientCommand::Send { reply, .. }) => {
                let _ = reply.send(Err(Error::NotConnected));
                Next::Stay
            }
            Some(ClientCommand::Shutdown) | None => {
                self.report_disconnected();
                Next::Go(Phase::Stopped)
            }
        }
    }

    async fn subscribe_live(
        &mut self,
        connection: &mut Connection,
        pairs: Vec<Subscription>,
        reply: oneshot::Sender<Result<usize>>,
    ) -> Result<()> {
        let added = self.sync.subscribe(pairs);
        let _ = reply.send(Ok(added.len()));

        for command in self.sync.batch_commands(&added) {
            connection
                .submit(command, Waiter::Internal(InternalRequest::Subscribe))
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn fire_debounce(&mut self) {
        if let Some(available) = self.debouncer.fire(Instant::now()) {
            info!("Device unavailable");
            self.events.send(ClientEvent::AvailabilityChanged(available));
        }
    }

    fn report_disconnected(&mut self) {
        if let Some(available) = self.debouncer.on_disconnected() {
            self.events.send(ClientEvent::AvailabilityChanged(available));
        }
    }

    fn log_connect_failure(&mut self, error: &Error) {
        if let Some(suppressed) = self.connect_log.check(Instant::now()) {
            warn!(generation = %self.generation, error = %error, suppressed, "Connect attempt failed");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "State change");
            *current = state;
            true
        });
    }
}

/// A sleep that only exists while a debounce window is open.
fn debounce_timer(deadline: Option<Instant>) -> OptionFuture<Sleep> {
    deadline.map(sleep_until).into()
}
