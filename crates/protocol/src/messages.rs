//! Trust-ping protocol message bodies and schema validation.
//!
//! Message bodies are JSON documents with `@type`/`@id` framing fields.
//! [`validate`] is the single entry point for raw inbound bodies: it checks
//! structure only (known type URI, well-formed id, thread id, timestamp)
//! and returns a typed [`ProtocolMessage`]. It performs no cryptography —
//! that is the envelope layer's job — and touches no external state;
//! id uniqueness is the caller's responsibility.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Type URI of a trust-ping message.
pub const PING_MESSAGE_TYPE: &str = "https://agentwire.dev/protocols/trust-ping/1.0/ping";

/// Type URI of a trust-ping response.
pub const PONG_MESSAGE_TYPE: &str = "https://agentwire.dev/protocols/trust-ping/1.0/ping-response";

/// Maximum accepted length of a message or thread id.
pub const MAX_ID_LENGTH: usize = 64;

/// A trust-ping request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMessage {
    /// Message type URI.
    #[serde(rename = "@type")]
    pub typ: String,
    /// Unique message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Whether the sender wants a response.
    #[serde(default)]
    pub response_requested: bool,
    /// Optional human-readable comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Unix timestamp in milliseconds when the ping was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<u64>,
}

impl PingMessage {
    /// Builds a fresh ping with a random id and the current time.
    pub fn new(response_requested: bool, comment: Option<String>) -> Self {
        Self {
            typ: PING_MESSAGE_TYPE.to_string(),
            id: Uuid::new_v4().to_string(),
            response_requested,
            comment,
            sent_time: Some(now_millis()),
        }
    }

    /// Serializes the message body to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A trust-ping response, correlated to its ping by thread id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongMessage {
    /// Message type URI.
    #[serde(rename = "@type")]
    pub typ: String,
    /// Unique message id.
    #[serde(rename = "@id")]
    pub id: String,
    /// Id of the ping this pong answers.
    pub thread_id: String,
    /// Optional human-readable comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Unix timestamp in milliseconds when the pong was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_time: Option<u64>,
}

impl PongMessage {
    /// Builds the pong answering `ping`.
    pub fn reply_to(ping: &PingMessage, comment: Option<String>) -> Self {
        Self {
            typ: PONG_MESSAGE_TYPE.to_string(),
            id: Uuid::new_v4().to_string(),
            thread_id: ping.id.clone(),
            comment,
            sent_time: Some(now_millis()),
        }
    }

    /// Serializes the message body to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A validated protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Trust-ping request.
    Ping(PingMessage),
    /// Trust-ping response.
    Pong(PongMessage),
}

/// Validates a raw message body and returns its typed form.
///
/// Checks performed: the body is a JSON object; `@type` is a known type
/// URI; `@id` is present, non-empty and well-formed; a pong carries a
/// non-empty `thread_id`; `sent_time`, when present, is a valid point in
/// time. Any violation is reported with the specific offending field.
pub fn validate(raw: &[u8]) -> Result<ProtocolMessage> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    let object = value.as_object().ok_or(ProtocolError::SchemaViolation {
        field: "body",
        reason: "message body must be a JSON object".to_string(),
    })?;

    let typ = require_string(object, "@type")?;
    check_id(object, "@id")?;
    check_timestamp(object)?;
    if let Some(comment) = object.get("comment") {
        if !comment.is_string() {
            return Err(ProtocolError::SchemaViolation {
                field: "comment",
                reason: "must be a string".to_string(),
            });
        }
    }

    match typ.as_str() {
        PING_MESSAGE_TYPE => {
            if let Some(flag) = object.get("response_requested") {
                if !flag.is_boolean() {
                    return Err(ProtocolError::SchemaViolation {
                        field: "response_requested",
                        reason: "must be a boolean".to_string(),
                    });
                }
            }
            Ok(ProtocolMessage::Ping(serde_json::from_value(value)?))
        }
        PONG_MESSAGE_TYPE => {
            check_id(object, "thread_id")?;
            Ok(ProtocolMessage::Pong(serde_json::from_value(value)?))
        }
        other => Err(ProtocolError::SchemaViolation {
            field: "@type",
            reason: format!("unknown message type `{other}`"),
        }),
    }
}

fn require_string(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
) -> Result<String> {
    object
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(ProtocolError::SchemaViolation {
            field,
            reason: "required string field is missing".to_string(),
        })
}

/// An id must be a non-empty printable string of bounded length with no
/// whitespace. Uniqueness is not checked here.
fn check_id(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
) -> Result<()> {
    let id = require_string(object, field)?;
    if id.is_empty() {
        return Err(ProtocolError::SchemaViolation {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(ProtocolError::SchemaViolation {
            field,
            reason: format!("exceeds {MAX_ID_LENGTH} characters"),
        });
    }
    if !id.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ProtocolError::SchemaViolation {
            field,
            reason: "must contain only printable ASCII without whitespace".to_string(),
        });
    }
    Ok(())
}

fn check_timestamp(object: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
    if let Some(value) = object.get("sent_time") {
        let millis = value.as_u64().ok_or(ProtocolError::SchemaViolation {
            field: "sent_time",
            reason: "must be a non-negative integer of Unix milliseconds".to_string(),
        })?;
        if millis == 0 {
            return Err(ProtocolError::SchemaViolation {
                field: "sent_time",
                reason: "must be a valid point in time".to_string(),
            });
        }
    }
    Ok(())
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_validates() {
        let ping = PingMessage::new(true, Some("hello".to_string()));
        let validated = validate(&ping.to_bytes().unwrap()).unwrap();
        assert_eq!(validated, ProtocolMessage::Ping(ping));
    }

    #[test]
    fn test_pong_validates() {
        let ping = PingMessage::new(true, None);
        let pong = PongMessage::reply_to(&ping, None);
        assert_eq!(pong.thread_id, ping.id);
        let validated = validate(&pong.to_bytes().unwrap()).unwrap();
        assert_eq!(validated, ProtocolMessage::Pong(pong));
    }

    #[test]
    fn test_ping_ids_are_unique_looking() {
        let a = PingMessage::new(false, None);
        let b = PingMessage::new(false, None);
        assert_ne!(a.id, b.id);
        assert!(!a.id.is_empty());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let body = serde_json::json!({
            "@type": "https://agentwire.dev/protocols/basicmessage/1.0/message",
            "@id": "abc-123",
        });
        let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation { field: "@type", .. }
        ));
    }

    #[test]
    fn test_missing_type_rejected() {
        let body = serde_json::json!({ "@id": "abc-123" });
        let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation { field: "@type", .. }
        ));
    }

    #[test]
    fn test_missing_id_rejected() {
        let body = serde_json::json!({ "@type": PING_MESSAGE_TYPE });
        let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation { field: "@id", .. }
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let body = serde_json::json!({ "@type": PING_MESSAGE_TYPE, "@id": "" });
        let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation { field: "@id", .. }
        ));
    }

    #[test]
    fn test_whitespace_id_rejected() {
        let body = serde_json::json!({ "@type": PING_MESSAGE_TYPE, "@id": "has spaces" });
        assert!(validate(&serde_json::to_vec(&body).unwrap()).is_err());
    }

    #[test]
    fn test_oversized_id_rejected() {
        let body = serde_json::json!({
            "@type": PING_MESSAGE_TYPE,
            "@id": "x".repeat(MAX_ID_LENGTH + 1),
        });
        assert!(validate(&serde_json::to_vec(&body).unwrap()).is_err());
    }

    #[test]
    fn test_pong_without_thread_rejected() {
        let body = serde_json::json!({ "@type": PONG_MESSAGE_TYPE, "@id": "abc-123" });
        let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation {
                field: "thread_id",
                ..
            }
        ));
    }

    #[test]
    fn test_pong_with_empty_thread_rejected() {
        let body = serde_json::json!({
            "@type": PONG_MESSAGE_TYPE,
            "@id": "abc-123",
            "thread_id": "",
        });
        assert!(validate(&serde_json::to_vec(&body).unwrap()).is_err());
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        for bad in [
            serde_json::json!("yesterday"),
            serde_json::json!(-5),
            serde_json::json!(0),
        ] {
            let body = serde_json::json!({
                "@type": PING_MESSAGE_TYPE,
                "@id": "abc-123",
                "sent_time": bad,
            });
            let err = validate(&serde_json::to_vec(&body).unwrap()).unwrap_err();
            assert!(matches!(
                err,
                ProtocolError::SchemaViolation {
                    field: "sent_time",
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_non_boolean_response_requested_rejected() {
        let body = serde_json::json!({
            "@type": PING_MESSAGE_TYPE,
            "@id": "abc-123",
            "response_requested": "yes",
        });
        assert!(validate(&serde_json::to_vec(&body).unwrap()).is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        let err = validate(b"[1,2,3]").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SchemaViolation { field: "body", .. }
        ));
    }

    #[test]
    fn test_response_requested_defaults_to_false() {
        let body = serde_json::json!({ "@type": PING_MESSAGE_TYPE, "@id": "abc-123" });
        let validated = validate(&serde_json::to_vec(&body).unwrap()).unwrap();
        match validated {
            ProtocolMessage::Ping(ping) => assert!(!ping.response_requested),
            other => panic!("expected ping, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_is_structural_only() {
        // A forged-looking but well-formed pong passes schema validation;
        // thread correlation is the protocol layer's job.
        let body = serde_json::json!({
            "@type": PONG_MESSAGE_TYPE,
            "@id": "abc-123",
            "thread_id": "never-sent",
        });
        assert!(validate(&serde_json::to_vec(&body).unwrap()).is_ok());
    }
}
