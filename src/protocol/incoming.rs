//! Classification of decoded frames.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::identifiers::MessageId;

use super::notification::Notification;
use super::request::Response;

// ============================================================================
// Incoming
// ============================================================================

/// A decoded frame, split by whether it answers a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Carries both `messageID` and `response`.
    Response(Response),
    /// Everything else.
    Notification(Notification),
}

impl Incoming {
    /// Classifies a decoded JSON object.
    ///
    /// A frame is a response only if it carries both an identifier and a
    /// `response` field. An identifier the client cannot parse still counts
    /// as a response so flow control keeps moving.
    #[must_use]
    pub fn classify(body: Map<String, Value>) -> Self {
        let command = body
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let code = body.get("response").and_then(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        match (body.get("messageID"), code) {
            (Some(raw_id), Some(code)) => {
                let message_id = match raw_id {
                    Value::String(s) => MessageId::parse(s),
                    Value::Number(n) => n.as_u64().map(MessageId::new),
                    _ => None,
                };
                Self::Response(Response {
                    message_id,
                    command,
                    code,
                    body,
                })
            }
            _ => Self::Notification(Notification { command, body }),
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

    fn classify(value: Value) -> Incoming {
        let Value::Object(map) = value else {
            panic!("test value must be an object");
        };
        Incoming::classify(map)
    }

    #[test]
    fn test_response_needs_id_and_code() {
        assert!(matches!(
            classify(json!({"messageID": "1", "command": "X", "response": "200"})),
            Incoming::Response(_)
        ));
        assert!(matches!(
            classify(json!({"messageID": "1", "command": "NotifyList"})),
            Incoming::Notification(_)
        ));
        assert!(matches!(
            classify(json!({"command": "X", "response": "200"})),
            Incoming::Notification(_)
        ));
    }

    #[test]
    fn test_numeric_fields_are_accepted() {
        let Incoming::Response(response) =
            classify(json!({"messageID": 8, "command": "X", "response": 400}))
        else {
            panic!("expected response");
        };
        assert_eq!(response.message_id, Some(MessageId::new(8)));
        assert_eq!(response.code, "400");
    }

    #[test]
    fn test_unparseable_id_is_still_a_response() {
        let Incoming::Response(response) =
            classify(json!({"messageID": "abc-1", "command": "X", "response": "200"}))
        else {
            panic!("expected response");
        };
        assert_eq!(response.message_id, None);
    }

    #[test]
    fn test_end_to_end_notification_example() {
        let Incoming::Notification(n) = classify(json!({
            "command": "NotifyList",
            "objectList": [{"objnam": "C0001", "params": {"STATUS": "ON"}}]
        })) else {
            panic!("expected notification");
        };
        assert_eq!(n.command, "NotifyList");
        assert_eq!(n.updates()[0].params["STATUS"], "ON");
    }
}
