// Message envelope and transport-opaque identifiers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Physical queue identifier as produced by a `DestinationResolver`.
///
/// A URL, an ARN, a map key - opaque to the container, meaningful only to the
/// transport that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueEndpoint(String);

impl QueueEndpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt handle minted by the transport for one delivery.
///
/// Required to delete (acknowledge) the message; valid only for the delivery
/// it was returned with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckToken(String);

impl AckToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single received message: opaque payload, attribute map, and the
/// acknowledgment token for this delivery.
///
/// Created by the transport when a batch is received and consumed exactly
/// once by the dispatcher; never persisted by the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub ack_token: AckToken,
}

impl MessageEnvelope {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>, ack_token: AckToken) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            attributes: HashMap::new(),
            ack_token,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_attributes() {
        let envelope = MessageEnvelope::new("m-1", "payload", AckToken::new("rh-1"))
            .with_attribute("trace-id", "abc")
            .with_attribute("content-type", "text/plain");

        assert_eq!(envelope.message_id, "m-1");
        assert_eq!(envelope.attributes.get("trace-id").map(String::as_str), Some("abc"));
        assert_eq!(envelope.ack_token.as_str(), "rh-1");
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let envelope = MessageEnvelope::new("m-2", r#"{"order":42}"#, AckToken::new("rh-2"));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: MessageEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.message_id, "m-2");
        assert_eq!(back.body, envelope.body);
        assert_eq!(back.ack_token, envelope.ack_token);
    }
}
