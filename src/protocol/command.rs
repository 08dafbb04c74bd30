//! Command definitions.
//!
//! The controller speaks a small set of parameter-list commands. Each one
//! carries its name in the `command` field next to the `messageID`:
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `GetParamList` | One-shot query of object attributes (identity, discovery, keep-alive) |
//! | `RequestParamList` | Subscribe to change notifications for object attributes |
//! | `SETPARAMLIST` | Change object attributes |
//!
//! Anything else goes through [`CustomCommand`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Object holding system-wide attributes.
pub const SYSTEM_OBJECT: &str = "INCR";

/// Attributes requested by the identity query.
pub const SYSTEM_INFO_KEYS: &[&str] = &["PROPNAME", "VER", "MODE", "SNAME"];

/// Condition selecting the system object for keep-alive queries.
const KEEPALIVE_CONDITION: &str = "OBJTYP=SYSTEM";

/// Fields owned by the request envelope.
const RESERVED_FIELDS: &[&str] = &["messageID", "command"];

// ============================================================================
// Command Wrapper
// ============================================================================

/// Any command the client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Parameter-list commands.
    Param(ParamCommand),
    /// Free-form command issued by the host application.
    Custom(CustomCommand),
}

impl Command {
    /// Returns the command name as sent on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Param(ParamCommand::GetParamList { .. }) => "GetParamList",
            Self::Param(ParamCommand::RequestParamList { .. }) => "RequestParamList",
            Self::Param(ParamCommand::SetParamList { .. }) => "SETPARAMLIST",
            Self::Custom(custom) => &custom.name,
        }
    }

    /// Query used to detect a dead connection.
    ///
    /// Reads the `MODE` attribute of the system object, which always exists.
    #[must_use]
    pub fn keepalive() -> Self {
        Self::Param(ParamCommand::GetParamList {
            condition: KEEPALIVE_CONDITION.to_string(),
            object_list: vec![ObjectQuery::new(SYSTEM_OBJECT, ["MODE"])],
        })
    }

    /// Query for the system identity.
    #[must_use]
    pub fn system_info() -> Self {
        Self::Param(ParamCommand::GetParamList {
            condition: String::new(),
            object_list: vec![ObjectQuery::new(SYSTEM_OBJECT, SYSTEM_INFO_KEYS.iter().copied())],
        })
    }

    /// Query returning every object with the given attributes.
    #[must_use]
    pub fn discovery<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Param(ParamCommand::GetParamList {
            condition: String::new(),
            object_list: vec![ObjectQuery::new(SYSTEM_OBJECT, keys)],
        })
    }

    /// Subscription request for the given objects.
    #[must_use]
    pub fn request_param_list(object_list: Vec<ObjectQuery>) -> Self {
        Self::Param(ParamCommand::RequestParamList { object_list })
    }

    /// Attribute change request.
    #[must_use]
    pub fn set_param_list(object_list: Vec<ObjectSettings>) -> Self {
        Self::Param(ParamCommand::SetParamList { object_list })
    }

    /// Free-form command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty, the payload is
    /// not a JSON object, or it tries to set an envelope field.
    pub fn custom(name: impl Into<String>, payload: Value) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("command name is empty"));
        }

        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::invalid_argument(format!(
                    "command payload must be a JSON object, got {other}"
                )));
            }
        };

        if let Some(field) = RESERVED_FIELDS.iter().find(|f| payload.contains_key(**f)) {
            return Err(Error::invalid_argument(format!(
                "command payload may not set '{field}'"
            )));
        }

        Ok(Self::Custom(CustomCommand { name, payload }))
    }
}

// ============================================================================
// ParamCommand
// ============================================================================

/// Parameter-list commands understood by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum ParamCommand {
    /// One-shot attribute query.
    #[serde(rename = "GetParamList")]
    GetParamList {
        /// Object filter such as `OBJTYP=SYSTEM`; empty for all objects.
        condition: String,
        /// Objects and keys to read.
        #[serde(rename = "objectList")]
        object_list: Vec<ObjectQuery>,
    },

    /// Subscribe to changes.
    #[serde(rename = "RequestParamList")]
    RequestParamList {
        /// Objects and keys to watch.
        #[serde(rename = "objectList")]
        object_list: Vec<ObjectQuery>,
    },

    /// Change attributes.
    #[serde(rename = "SETPARAMLIST")]
    SetParamList {
        /// Objects and new values.
        #[serde(rename = "objectList")]
        object_list: Vec<ObjectSettings>,
    },
}

// ============================================================================
// CustomCommand
// ============================================================================

/// A command outside the parameter-list family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommand {
    /// Command name.
    #[serde(rename = "command")]
    pub name: String,

    /// Fields merged into the request next to `messageID` and `command`.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

// ============================================================================
// Payload Entries
// ============================================================================

/// One object and the attribute keys requested for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectQuery {
    /// Object name.
    #[serde(rename = "objnam")]
    pub object: String,
    /// Attribute keys.
    pub keys: Vec<String>,
}

impl ObjectQuery {
    /// Creates a query entry.
    #[must_use]
    pub fn new<I, S>(object: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object: object.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// One object and the attribute values to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSettings {
    /// Object name.
    #[serde(rename = "objnam")]
    pub object: String,
    /// New attribute values.
    pub params: BTreeMap<String, String>,
}

impl ObjectSettings {
    /// Creates a settings entry.
    #[must_use]
    pub fn new<I, K, V>(object: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            object: object.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keepalive_shape() {
        let value = serde_json::to_value(Command::keepalive()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "command": "GetParamList",
                "condition": "OBJTYP=SYSTEM",
                "objectList": [{"objnam": "INCR", "keys": ["MODE"]}]
            })
        );
    }

    #[test]
    fn test_set_param_list_shape() {
        let command = Command::set_param_list(vec![ObjectSettings::new(
            "C0001",
            [("STATUS", "ON")],
        )]);
        assert_eq!(command.name(), "SETPARAMLIST");

        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(value["objectList"][0]["params"]["STATUS"], "ON");
    }

    #[test]
    fn test_custom_command_flattens_payload() {
        let command =
            Command::custom("GetQuery", json!({"queryName": "GetHardwareDefinition"}))
                .expect("valid");
        assert_eq!(command.name(), "GetQuery");

        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(
            value,
            json!({"command": "GetQuery", "queryName": "GetHardwareDefinition"})
        );
    }

    #[test]
    fn test_custom_command_rejects_bad_payloads() {
        assert!(Command::custom("", Value::Null).is_err());
        assert!(Command::custom("X", json!([1, 2])).is_err());
        assert!(Command::custom("X", json!({"messageID": "5"})).is_err());
        assert!(Command::custom("X", Value::Null).is_ok());
    }

    #[test]
    fn test_param_command_deserializes() {
        let command: Command = serde_json::from_value(json!({
            "command": "RequestParamList",
            "objectList": [{"objnam": "P0001", "keys": ["RPM", "PWR"]}]
        }))
        .expect("deserialize");

        assert_eq!(
            command,
            Command::request_param_list(vec![ObjectQuery::new("P0001", ["RPM", "PWR"])])
        );
    }
}
