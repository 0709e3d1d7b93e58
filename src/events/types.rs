//! # Domain Event Model
//!
//! Events are immutable, fire-and-forget notifications of business
//! occurrences. They carry no persisted identity of their own: an event either
//! reaches its delivery target within the current call or is dropped.
//!
//! The serialized form matches the webhook wire contract: `type`, `user_id`,
//! ISO-8601 `timestamp`, free-form `data`, and an optional `identity` block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Optional identity block attached to events that describe a person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIdentity {
    /// Identifier in the external automation system (e.g. messenger user id)
    pub external_id: String,
    /// Display attributes such as first name or username
    #[serde(flatten)]
    pub display_fields: Map<String, Value>,
}

impl EventIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.display_fields.insert(key.into(), value.into());
        self
    }
}

/// A business event destined for an external automation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Subject the event is about; serialized as `user_id` on the wire
    #[serde(rename = "user_id")]
    pub subject_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<EventIdentity>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            subject_id: subject_id.into(),
            timestamp: Utc::now(),
            data: Map::new(),
            identity: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_identity(mut self, identity: EventIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::event_types;

    #[test]
    fn serializes_to_wire_contract() {
        let event = Event::new(event_types::PAYMENT_SUCCESS, "42")
            .with_data("planId", "premium")
            .with_data("amount", 1990);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "payment_success");
        assert_eq!(json["user_id"], "42");
        assert_eq!(json["data"]["amount"], 1990);
        assert_eq!(json["data"]["planId"], "premium");
        // ISO-8601 timestamp
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        // Absent identity is omitted, not null
        assert!(json.get("identity").is_none());
    }

    #[test]
    fn identity_fields_flatten() {
        let event = Event::new(event_types::USER_REGISTERED, "42").with_identity(
            EventIdentity::new("tg-991")
                .with_field("first_name", "Ada")
                .with_field("username", "ada_l"),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["identity"]["external_id"], "tg-991");
        assert_eq!(json["identity"]["first_name"], "Ada");
        assert_eq!(json["identity"]["username"], "ada_l");
    }
}
