//! Message envelope (JSON body of every frame).
//!
//! `id` and `timestamp` stay optional on the wire; [`Envelope::stamp_defaults`]
//! is the single place where absent values are generated.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope carried in request and response bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Correlation id. Older clients send it as `_id`.
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// POSIX time as text, e.g. `1700000000.250000`.
    #[serde(
        default,
        deserialize_with = "posix_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    /// Routing key.
    pub topic: String,
    /// Opaque payload. A present `null` is kept as `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: None,
            topic: topic.into(),
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Fill a missing `id` with a fresh one and a missing `timestamp` with now.
    pub fn stamp_defaults(&mut self) {
        if self.id.is_none() {
            self.id = Some(new_message_id());
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(posix_now());
        }
    }

    /// Id or the empty string when not yet stamped.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Envelope for a reply: same id, timestamp and topic, no payload.
    pub fn reply(&self) -> Self {
        Self {
            id: self.id.clone(),
            timestamp: self.timestamp.clone(),
            topic: self.topic.clone(),
            payload: None,
        }
    }
}

/// 128 random bits as 32 lowercase hex chars.
pub fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current POSIX time with microsecond precision.
pub fn posix_now() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

// Accepts the textual form and the numeric form older clients emit.
fn posix_text<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stamp {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Stamp>::deserialize(de)?.map(|stamp| match stamp {
        Stamp::Text(text) => text,
        Stamp::Number(n) => n.to_string(),
    }))
}

// `Option<Value>` alone reads `null` as `None`; any present value is `Some`.
fn present_value<'de, D>(de: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(de).map(Some)
}
