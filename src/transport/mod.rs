//! TCP transport layer.
//!
//! Everything between the socket and the host-facing client lives here.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  bytes   ┌───────────┐  Incoming  ┌──────────────┐
//! │  TcpStream   │─────────►│ LineCodec │───────────►│ Multiplexer  │──► callers
//! │              │          └───────────┘     │      └──────────────┘
//! │              │◄──── one request at a time ┘             │
//! └──────────────┘                              notifications ──► Synchronizer
//!        ▲
//!        └── LivenessMonitor: keep-alive queries, idle timeout
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | `\r\n`-delimited JSON framing |
//! | `connection` | One session: socket, codec, multiplexer, liveness |
//! | `liveness` | Keep-alive scheduling and idle detection |
//! | `multiplexer` | Single in-flight request, FIFO queue, correlation |
//! | `throttle` | Rate limiting for repetitive warnings |

// ============================================================================
// Submodules
// ============================================================================

/// Line-delimited JSON framing.
pub mod codec;

/// Per-generation session.
pub(crate) mod connection;

/// Keep-alive and idle detection.
pub mod liveness;

/// Request serialization and correlation.
pub mod multiplexer;

/// Log rate limiting.
pub mod throttle;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{LineCodec, encode};
pub use liveness::{LivenessAction, LivenessMonitor};
pub use multiplexer::{DiscardReason, Dispatch, Multiplexer, PendingRequest};
pub use throttle::LogThrottle;
