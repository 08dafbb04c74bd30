//! Unsolicited notifications.
//!
//! The device pushes attribute changes without being asked. Two shapes are
//! in use:
//!
//! | Command | Payload |
//! |---------|---------|
//! | `NotifyList` | `objectList: [{objnam, params}]` |
//! | `WriteParamList` | `objectList: [{changes: [{objnam, params}]}]` |
//!
//! Anything without a `response` field is treated as a notification; the
//! ones above carry changes, others are ignored by the synchronizer.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Push notification carrying attribute changes.
pub const NOTIFY_LIST: &str = "NotifyList";

/// Push notification echoing a write, wrapped in `changes`.
pub const WRITE_PARAM_LIST: &str = "WriteParamList";

// ============================================================================
// Notification
// ============================================================================

/// A message from the device that is not a reply to any request.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Command name, empty if the device sent none.
    pub command: String,

    /// The complete message as received.
    pub body: Map<String, Value>,
}

impl Notification {
    /// Returns `true` if this notification carries attribute changes.
    #[inline]
    #[must_use]
    pub fn carries_changes(&self) -> bool {
        self.command == NOTIFY_LIST || self.command == WRITE_PARAM_LIST
    }

    /// Extracts the per-object attribute changes, in message order.
    #[must_use]
    pub fn updates(&self) -> Vec<ObjectParams> {
        let Some(list) = self.body.get("objectList") else {
            return Vec::new();
        };

        match self.command.as_str() {
            NOTIFY_LIST => ObjectParams::list_from_value(list),
            WRITE_PARAM_LIST => list
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.get("changes"))
                .flat_map(ObjectParams::list_from_value)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// ObjectParams
// ============================================================================

/// Attribute values reported for one object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectParams {
    /// Object name (`objnam`).
    pub name: String,

    /// Attribute name to value.
    pub params: BTreeMap<String, String>,
}

impl ObjectParams {
    /// Creates an entry from name/value pairs.
    #[must_use]
    pub fn new<I, K, V>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses a single `{objnam, params}` entry.
    ///
    /// Scalar values are stringified; nested arrays and objects are skipped.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("objnam")?.as_str()?.to_string();

        let params = value
            .get("params")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|(key, value)| Some((key.clone(), scalar_to_string(value)?)))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self { name, params })
    }

    /// Parses an array of entries, skipping malformed ones.
    #[must_use]
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|entries| entries.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

/// Renders a scalar JSON value the way the device would have sent it.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
