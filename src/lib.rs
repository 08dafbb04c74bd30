//! IntelliCenter client - persistent session with a pool automation controller.
//!
//! This library keeps a single long-lived TCP session open to an IntelliCenter
//! controller, speaking its line-delimited JSON protocol, and mirrors the
//! controller's objects (circuits, bodies, pumps, heaters, ...) in a local
//! model that host applications can read at any time.
//!
//! # Architecture
//!
//! One background task owns the socket and all state that changes with it:
//!
//! - **Wire codec**: splits the byte stream on `\r\n` into JSON frames
//! - **Multiplexer**: at most one request in flight, FIFO queue, correlation
//!   by `messageID`, per-request timeout
//! - **Liveness**: keep-alive queries while idle, reconnect when silent
//! - **Supervisor**: connect, exponential backoff with jitter, debounced
//!   availability reporting
//! - **Synchronizer**: merges notifications into the model and reports which
//!   attributes actually changed
//!
//! The [`Client`] handle only sends commands to that task, so it is cheap to
//! clone and share.
//!
//! # Quick Start
//!
//! ```no_run
//! use intellicenter_client::{Client, ClientEvent, ClientOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = ClientOptions::default();
//!     let (client, mut events) = Client::builder().options(options).build()?;
//!
//!     client.connect("192.168.1.50").await?;
//!     client.subscribe([("C0003", "STATUS"), ("B1101", "TEMP")]).await?;
//!
//!     for light in client.objects_of_type("CIRCUIT") {
//!         let name = light.display_name().unwrap_or(light.name());
//!         println!("{name} is {}", light.get("STATUS").unwrap_or("?"));
//!     }
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ClientEvent::AvailabilityChanged(up) => println!("available: {up}"),
//!             ClientEvent::AttributesChanged { object, attributes } => {
//!                 println!("{object} changed: {attributes:?}");
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] handle, builder and lifecycle |
//! | [`config`] | [`ClientOptions`] and [`DeviceAddress`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | [`ClientEvent`] stream |
//! | [`identifiers`] | Message and connection identifiers |
//! | [`model`] | Local mirror of controller objects |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Framing, multiplexing and liveness |

// ============================================================================
// Modules
// ============================================================================

/// Host-facing client handle.
///
/// Use [`Client::builder()`] to create one.
pub mod client;

/// Client options and device addresses.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Availability and attribute change events.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// Local object model and notification merging.
pub mod model;

/// Wire protocol message types.
pub mod protocol;

/// TCP transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ConnectionState};

// Configuration
pub use config::{ClientOptions, DeviceAddress};

// Error types
pub use error::{Error, Result};

// Events
pub use events::{ClientEvent, Events};

// Identifier types
pub use identifiers::{Generation, MessageId};

// Model types
pub use model::{AttributePolicy, PoolModel, PoolObject, SystemInfo};

// Protocol types
pub use protocol::{Command, ObjectSettings, Response};
