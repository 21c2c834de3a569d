use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChannelError, Result};

/// Partitions the shared transport into independent conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// A fresh, unique channel id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-message id. Diagnostics only; carries no protocol meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery envelope carried by every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: ChannelId,
    #[serde(default)]
    pub id: MessageId,
}

/// A single cross-frame message.
///
/// `payload` is opaque at this layer; receivers decode it with
/// [`Message::payload_as`] and must treat decoding failures as untrusted input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    pub envelope: Envelope,
}

impl Message {
    /// Build a message stamped with `channel` and a fresh message id.
    pub fn new(name: impl Into<String>, payload: Value, channel: ChannelId) -> Self {
        Self {
            name: name.into(),
            payload,
            envelope: Envelope {
                channel,
                id: MessageId::generate(),
            },
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.envelope.channel
    }

    pub fn id(&self) -> &MessageId {
        &self.envelope.id
    }

    /// Wire representation.
    pub fn to_value(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert(
            "channel".to_string(),
            Value::String(self.envelope.channel.0.clone()),
        );
        envelope.insert("id".to_string(), Value::String(self.envelope.id.0.clone()));

        let mut message = Map::new();
        message.insert("name".to_string(), Value::String(self.name.clone()));
        message.insert("payload".to_string(), self.payload.clone());
        message.insert("envelope".to_string(), Value::Object(envelope));
        Value::Object(message)
    }

    /// Recognise a raw inbound value as a message.
    ///
    /// Returns `None` unless the value is an object with a string `name` and
    /// an object `envelope` holding a string `channel`. Foreign traffic on the
    /// shared transport is expected, so this never errors.
    pub fn from_value(data: &Value) -> Option<Self> {
        let object = data.as_object()?;
        let name = object.get("name")?.as_str()?;
        let envelope = object.get("envelope")?.as_object()?;
        let channel = envelope.get("channel")?.as_str()?;
        let id = envelope
            .get("id")
            .and_then(Value::as_str)
            .map(|id| MessageId(id.to_string()))
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            payload: object.get("payload").cloned().unwrap_or(Value::Null),
            envelope: Envelope {
                channel: ChannelId(channel.to_string()),
                id,
            },
        })
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|source| {
            ChannelError::InvalidPayload {
                name: self.name.clone(),
                source,
            }
        })
    }
}
