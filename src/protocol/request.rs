//! Request and Response message types.
//!
//! Defines the envelope of outbound requests and the shape of the device's
//! replies.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

use super::Command;
use super::notification::ObjectParams;

// ============================================================================
// Constants
// ============================================================================

/// Response code signalling success.
pub const SUCCESS_CODE: &str = "200";

// ============================================================================
// Request
// ============================================================================

/// A command request from the client to the device.
///
/// # Format
///
/// ```json
/// {
///   "messageID": "12",
///   "command": "GetParamList",
///   "condition": "",
///   "objectList": [{"objnam": "INCR", "keys": ["MODE"]}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier for request/response correlation.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,

    /// Command name and payload.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Creates a request with the given identifier.
    #[inline]
    #[must_use]
    pub fn new(message_id: MessageId, command: Command) -> Self {
        Self {
            message_id,
            command,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A reply from the device to one request.
///
/// # Format
///
/// ```json
/// {
///   "messageID": "12",
///   "command": "SendParamList",
///   "response": "200",
///   "objectList": [ ... ]
/// }
/// ```
///
/// The device is known to echo the wrong `messageID` after some errors, so
/// correlation is handled leniently by the multiplexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoed identifier; `None` when the device sent something unparseable.
    pub message_id: Option<MessageId>,

    /// Command name echoed by the device.
    pub command: String,

    /// Response code (`"200"` on success).
    pub code: String,

    /// The complete message as received.
    pub body: Map<String, Value>,
}

impl Response {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Turns a failure code into [`Error::Command`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the response code is not `"200"`.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::command(self.command, self.code))
        }
    }

    /// Gets a string field of the message.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Parses the `objectList` payload, if any.
    #[must_use]
    pub fn object_list(&self) -> Vec<ObjectParams> {
        self.body
            .get("objectList")
            .map(ObjectParams::list_from_value)
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Incoming, ObjectQuery};
    use serde_json::json;

    fn response(value: Value) -> Response {
        let Value::Object(map) = value else {
            panic!("test value must be an object");
        };
        match Incoming::classify(map) {
            Incoming::Response(response) => response,
            Incoming::Notification(n) => panic!("expected response, got {n:?}"),
        }
    }

    #[test]
    fn test_request_serialization() {
        let request = Request::new(
            MessageId::new(3),
            Command::request_param_list(vec![ObjectQuery::new("C0001", ["STATUS"])]),
        );
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["messageID"], "3");
        assert_eq!(value["command"], "RequestParamList");
        assert_eq!(value["objectList"][0]["objnam"], "C0001");
    }

    #[test]
    fn test_request_round_trip() {
        let request = Request::new(
            MessageId::new(11),
            Command::custom("GetQuery", json!({"queryName": "GetConfiguration"}))
                .expect("valid"),
        );
        let json = serde_json::to_string(&request).expect("serialize");
        let back: Request = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, request);
    }

    #[test]
    fn test_success_response() {
        let response = response(json!({
            "messageID": "4",
            "command": "SendParamList",
            "response": "200",
            "objectList": [{"objnam": "INCR", "params": {"VER": "1.064"}}]
        }));

        assert!(response.is_success());
        assert_eq!(response.message_id, Some(MessageId::new(4)));
        assert_eq!(response.get_str("command"), Some("SendParamList"));

        let objects = response.object_list();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name, "INCR");
    }

    #[test]
    fn test_error_response_into_result() {
        let response = response(json!({
            "messageID": "5",
            "command": "SETPARAMLIST",
            "response": "400"
        }));

        let err = response.into_result().unwrap_err();
        match err {
            Error::Command { command, code } => {
                assert_eq!(command, "SETPARAMLIST");
                assert_eq!(code, "400");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
