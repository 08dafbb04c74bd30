//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers keep message identifiers and connection generations
//! from being mixed with plain integers.
//!
//! | Type | Scope |
//! |------|-------|
//! | [`MessageId`] | One request on one connection |
//! | [`Generation`] | One established (or attempted) connection |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// MessageId
// ============================================================================

/// Numeric identifier correlating a request with its response.
///
/// Identifiers start at 1 and increase monotonically for the lifetime of a
/// connection. A new connection starts over at 1.
///
/// The device transmits identifiers as decimal strings (`"messageID": "12"`),
/// so this type serializes as a string and accepts either a string or a
/// number when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    /// The first identifier issued on a fresh connection.
    pub const FIRST: Self = Self(1);

    /// Creates an identifier from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the identifier following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Parses the device's textual form.
    ///
    /// Returns `None` for anything that is not a decimal number.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        text.trim().parse().ok().map(Self)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageIdVisitor;

        impl Visitor<'_> for MessageIdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal message identifier")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<MessageId, E> {
                Ok(MessageId(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<MessageId, E> {
                u64::try_from(value)
                    .map(MessageId)
                    .map_err(|_| E::custom("negative message identifier"))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<MessageId, E> {
                MessageId::parse(value)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(MessageIdVisitor)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Connection generation counter.
///
/// Incremented for every connection attempt. Work scheduled against one
/// generation is never applied to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

impl Generation {
    /// Returns the following generation.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
