//! Local mirror of the controller's objects.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `object` | [`PoolObject`]: one object and its attributes |
//! | `policy` | [`AttributePolicy`]: per-attribute rounding |
//! | `pool` | [`PoolModel`]: all known objects |
//! | `sync` | [`Synchronizer`]: diffing, change events, subscriptions |
//! | `system` | [`SystemInfo`]: controller identity |

// ============================================================================
// Submodules
// ============================================================================

/// Single object.
pub mod object;

/// Attribute rounding rules.
pub mod policy;

/// Object collection.
pub mod pool;

/// Diffing and subscriptions.
pub mod sync;

/// Controller identity.
pub mod system;

// ============================================================================
// Re-exports
// ============================================================================

pub use object::PoolObject;
pub use policy::AttributePolicy;
pub use pool::PoolModel;
pub use sync::{Subscription, Synchronizer};
pub use system::SystemInfo;
