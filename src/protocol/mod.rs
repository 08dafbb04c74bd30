//! Wire protocol message types.
//!
//! Every message is a single JSON object terminated by `\r\n`.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Distinguishing fields |
//! |--------------|-----------|-----------------------|
//! | [`Request`] | Client → Device | `messageID`, `command`, payload |
//! | [`Response`] | Device → Client | `messageID`, `response` code |
//! | [`Notification`] | Device → Client | no `response` field |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions and payload entries |
//! | `incoming` | Response/notification classification |
//! | `notification` | Push notifications and object parameter lists |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions.
pub mod command;

/// Classification of decoded frames.
pub mod incoming;

/// Unsolicited notification types.
pub mod notification;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, CustomCommand, ObjectQuery, ObjectSettings, ParamCommand};
pub use incoming::Incoming;
pub use notification::{Notification, ObjectParams};
pub use request::{Request, Response};
