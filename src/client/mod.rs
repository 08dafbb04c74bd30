//! Host-facing client.
//!
//! A [`Client`] is a cheap, cloneable handle to a background supervisor task
//! that owns the single session with the controller. Create one with
//! [`Client::builder()`]:
//!
//! ```no_run
//! use intellicenter_client::{Client, ClientEvent, Result};
//!
//! # async fn example() -> Result<()> {
//! let (client, mut events) = Client::builder().build()?;
//! client.connect("192.168.1.50").await?;
//! client.subscribe([("C0001", "STATUS")]).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::AttributesChanged { object, attributes } = event {
//!         println!("{object}: {attributes:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay sequence with jitter |
//! | `debounce` | Delayed reporting of unavailability |
//! | `supervisor` | Lifecycle actor and [`ConnectionState`] |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delays.
pub mod backoff;

/// Availability debouncing.
pub mod debounce;

/// Connection lifecycle actor.
pub mod supervisor;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{ClientOptions, DeviceAddress};
use crate::error::{Error, Result};
use crate::events::{self, Events};
use crate::model::{PoolModel, PoolObject, Subscription, Synchronizer, SystemInfo};
use crate::protocol::{Command, ObjectSettings, Response};

pub use supervisor::ConnectionState;

use supervisor::{ClientCommand, Supervisor};

// ============================================================================
// Client
// ============================================================================

/// Handle to one controller session.
///
/// All clones share the same session, model and event stream.
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<ClientCommand>,
    state: watch::Receiver<ConnectionState>,
    model: Arc<RwLock<PoolModel>>,
    default_port: u16,
}

impl Client {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Connects to the controller at `address` (`host` or `host:port`).
    ///
    /// Resolves once the first attempt has finished. If it failed, the error
    /// is returned and the client keeps retrying with backoff until
    /// [`disconnect`](Self::disconnect) is called.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the address is malformed or a session
    ///   is already active
    /// - [`Error::ConnectFailure`] / [`Error::ConnectTimeout`] if the first
    ///   attempt failed
    /// - [`Error::Shutdown`] if the client has been shut down
    pub async fn connect(&self, address: &str) -> Result<()> {
        let address = DeviceAddress::parse(address, self.default_port)?;
        let (reply, rx) = oneshot::channel();
        self.dispatch(ClientCommand::Connect { address, reply })?;
        rx.await?
    }

    /// Closes the session and stops reconnecting.
    ///
    /// Observers that last saw the device as available are told immediately,
    /// without waiting for the debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if the client has been shut down.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(ClientCommand::Disconnect { reply })?;
        rx.await?;
        Ok(())
    }

    /// Disconnects and stops the background task.
    ///
    /// Other clones become unusable and return [`Error::Shutdown`].
    pub fn shutdown(&self) {
        let _ = self.commands.send(ClientCommand::Shutdown);
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the client reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if the client stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::Shutdown)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Subscribes to change notifications for `(object, attribute)` pairs.
    ///
    /// Idempotent; the whole set is re-sent after every reconnect. Returns the
    /// number of pairs that were new.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if an object or attribute name is empty
    /// - [`Error::Shutdown`] if the client has been shut down
    pub async fn subscribe<I, O, A>(&self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (O, A)>,
        O: Into<String>,
        A: Into<String>,
    {
        let pairs: Vec<Subscription> = pairs
            .into_iter()
            .map(|(object, attribute)| (object.into(), attribute.into()))
            .collect();

        if let Some((object, attribute)) = pairs
            .iter()
            .find(|(object, attribute)| object.is_empty() || attribute.is_empty())
        {
            return Err(Error::invalid_argument(format!(
                "empty name in subscription ({object:?}, {attribute:?})"
            )));
        }

        let (reply, rx) = oneshot::channel();
        self.dispatch(ClientCommand::Subscribe { pairs, reply })?;
        rx.await?
    }

    /// Sends an arbitrary command and waits for the device's reply.
    ///
    /// `payload` must be a JSON object (or null) and is merged next to the
    /// `command` and `messageID` fields.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the name or payload is unusable
    /// - [`Error::NotConnected`] if no session is established
    /// - [`Error::Command`] if the device answered with a failure code
    /// - [`Error::RequestTimeout`] if the device never answered
    /// - [`Error::ConnectionLost`] if the session dropped first
    pub async fn send_command(&self, name: &str, payload: Value) -> Result<Response> {
        self.send(Command::custom(name, payload)?).await
    }

    /// Asks the device to change attributes of one object.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn request_changes<I, K, V>(&self, object: &str, params: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let settings = ObjectSettings::new(object, params);
        if settings.params.is_empty() {
            return Err(Error::invalid_argument("no attributes to change"));
        }
        self.send(Command::set_param_list(vec![settings])).await
    }

    /// Sends a prepared command through the multiplexer.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn send(&self, command: Command) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(ClientCommand::Send { command, reply })?;
        rx.await?
    }

    // ------------------------------------------------------------------------
    // Model
    // ------------------------------------------------------------------------

    /// Snapshot of one object.
    #[must_use]
    pub fn get_object(&self, name: &str) -> Option<PoolObject> {
        self.model.read().get(name).cloned()
    }

    /// Snapshot of every object of a type, sorted by name.
    #[must_use]
    pub fn objects_of_type(&self, object_type: &str) -> Vec<PoolObject> {
        self.model
            .read()
            .objects_of_type(object_type)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Controller identity, once known.
    #[must_use]
    pub fn system_info(&self) -> Option<SystemInfo> {
        self.model.read().system_info().cloned()
    }

    fn dispatch(&self, command: ClientCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Shutdown)
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`Client`] and its event stream.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    options: ClientOptions,
}

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the options and starts the supervisor task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are inconsistent or no
    /// runtime is available.
    pub fn build(self) -> Result<(Client, Events)> {
        self.options.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Client::builder().build() requires a Tokio runtime"))?;

        let model = Arc::new(RwLock::new(PoolModel::new()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, events) = events::channel();

        let sync = Synchronizer::new(
            Arc::clone(&model),
            self.options.attribute_policy.clone(),
            self.options.subscription_batch_size,
        );
        let default_port = self.options.default_port;
        let supervisor = Supervisor::new(self.options, command_rx, state_tx, event_tx, sync);
        runtime.spawn(supervisor.run());

        let client = Client {
            commands,
            state,
            model,
            default_port,
        };
        Ok((client, events))
    }
}

// ============================================================================
// Tests
// ============================================================================
