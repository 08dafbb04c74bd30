//! Error types for the IntelliCenter client.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use intellicenter_client::{Client, Result};
//!
//! async fn turn_on(client: &Client) -> Result<()> {
//!     client.request_changes("C0001", [("STATUS", "ON")]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Reaches |
//! |----------|----------|---------|
//! | Framing | [`Error::Framing`] | Nobody; frame dropped, connection kept |
//! | Command | [`Error::Command`], [`Error::RequestTimeout`] | The issuing caller only |
//! | Connection | [`Error::ConnectionLost`], [`Error::ConnectFailure`], [`Error::ConnectTimeout`], [`Error::NotConnected`] | Pending callers; observers via availability events |
//! | Usage | [`Error::Config`], [`Error::InvalidArgument`], [`Error::Shutdown`] | The caller |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::ChannelClosed`] | Internal plumbing |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::MessageId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Malformed frame received from the device.
    ///
    /// Recovered locally: the frame is dropped and the connection stays open.
    #[error("Framing error: {reason}")]
    Framing {
        /// What was wrong with the frame.
        reason: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Device-reported failure for a specific request.
    #[error("Command {command} failed with response code {code}")]
    Command {
        /// Command name echoed by the device.
        command: String,
        /// Response code (anything other than `"200"`).
        code: String,
    },

    /// The request occupied the in-flight slot past the deadlock ceiling.
    ///
    /// Does not by itself trigger a reconnection.
    #[error("Request {message_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Identifier of the request that timed out.
        message_id: MessageId,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The connection closed (socket error or liveness timeout) while the
    /// request was pending.
    #[error("Connection lost")]
    ConnectionLost,

    /// A connection attempt failed.
    #[error("Failed to connect to {address}: {message}")]
    ConnectFailure {
        /// Address that was dialed.
        address: String,
        /// Description of the failure.
        message: String,
    },

    /// A connection attempt did not complete in time.
    #[error("Connecting to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// Address that was dialed.
        address: String,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// A command was submitted while no connection was established.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Invalid client configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to a client method.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The client has been shut down.
    #[error("Client shut down")]
    Shutdown,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a framing error.
    #[inline]
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }

    /// Creates a command error.
    #[inline]
    pub fn command(command: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            code: code.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(message_id: MessageId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            message_id,
            timeout_ms,
        }
    }

    /// Creates a connect failure error.
    #[inline]
    pub fn connect_failure(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailure {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(address: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ConnectTimeout {
            address: address.into(),
            timeout_ms,
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::ConnectTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost
                | Self::ConnectFailure { .. }
                | Self::ConnectTimeout { .. }
                | Self::NotConnected
                | Self::Io(_)
        )
    }

    /// Returns `true` if retrying the same operation later may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Framing { .. }
                | Self::RequestTimeout { .. }
                | Self::ConnectionLost
                | Self::ConnectFailure { .. }
                | Self::ConnectTimeout { .. }
                | Self::NotConnected
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::command("SETPARAMLIST", "400");
        assert_eq!(
            err.to_string(),
            "Command SETPARAMLIST failed with response code 400"
        );

        let err = Error::request_timeout(MessageId::new(9), 45_000);
        assert_eq!(err.to_string(), "Request 9 timed out after 45000ms");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::request_timeout(MessageId::FIRST, 10).is_timeout());
        assert!(Error::connect_timeout("pool:6681", 10).is_timeout());
        assert!(!Error::ConnectionLost.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionLost.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::connect_failure("pool", "refused").is_connection_error());
        assert!(!Error::command("X", "400").is_connection_error());
        assert!(!Error::config("bad").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionLost.is_recoverable());
        assert!(Error::framing("bad json").is_recoverable());
        assert!(!Error::command("X", "400").is_recoverable());
        assert!(!Error::Shutdown.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
