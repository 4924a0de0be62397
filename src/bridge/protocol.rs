//! Wire format of the host channel
//!
//! Two JSON envelopes and one bare sentinel make up the whole protocol:
//!
//! ```text
//! UI   → host  {"type":"SHARED_STATE_UPDATE","key":"<key>","value":<json>}
//! host → UI    {"type":"SHARED_STATE_UPDATE_FROM_NATIVE","key":"<key>","value":<json>}
//! either       PING
//! ```
//!
//! There is no version field; unknown `type` values are reported as
//! [`BridgeError::UnknownType`] so receivers can ignore them quietly.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// `type` of updates sent by the UI layer
pub const UPDATE_TYPE: &str = "SHARED_STATE_UPDATE";

/// `type` of updates pushed by the native host
pub const UPDATE_FROM_NATIVE_TYPE: &str = "SHARED_STATE_UPDATE_FROM_NATIVE";

/// Liveness probe sentinel
pub const PING: &str = "PING";

/// One message on the host channel
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeMessage {
    /// UI → host state update
    Update { key: String, value: Value },
    /// Host → UI state update
    UpdateFromNative { key: String, value: Value },
    /// Liveness probe
    Ping,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    key: &'a str,
    value: &'a Value,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    key: Option<String>,
    /// `None` when absent, `Some(Value::Null)` for an explicit null
    #[serde(default, deserialize_with = "present")]
    value: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl BridgeMessage {
    /// Outbound update for `key`
    pub fn update(key: impl Into<String>, value: Value) -> Self {
        BridgeMessage::Update {
            key: key.into(),
            value,
        }
    }

    /// Host-originated update for `key`
    pub fn from_native(key: impl Into<String>, value: Value) -> Self {
        BridgeMessage::UpdateFromNative {
            key: key.into(),
            value,
        }
    }

    /// Wire `type` of this message, `None` for the ping sentinel
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            BridgeMessage::Update { .. } => Some(UPDATE_TYPE),
            BridgeMessage::UpdateFromNative { .. } => Some(UPDATE_FROM_NATIVE_TYPE),
            BridgeMessage::Ping => None,
        }
    }

    /// Serialize to the string sent over the channel
    pub fn encode(&self) -> Result<String> {
        let (kind, key, value) = match self {
            BridgeMessage::Update { key, value } => (UPDATE_TYPE, key, value),
            BridgeMessage::UpdateFromNative { key, value } => (UPDATE_FROM_NATIVE_TYPE, key, value),
            BridgeMessage::Ping => return Ok(PING.to_string()),
        };
        Ok(serde_json::to_string(&Envelope { kind, key, value })?)
    }

    /// Parse a string received from the channel
    ///
    /// The ping sentinel is accepted both bare and as a JSON string.
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == PING {
            return Ok(BridgeMessage::Ping);
        }

        let parsed: Value = serde_json::from_str(raw)?;
        if parsed.as_str() == Some(PING) {
            return Ok(BridgeMessage::Ping);
        }

        let envelope: RawEnvelope = serde_json::from_value(parsed)?;
        let kind = envelope.kind.ok_or(BridgeError::MissingField("type"))?;
        if kind != UPDATE_TYPE && kind != UPDATE_FROM_NATIVE_TYPE {
            return Err(BridgeError::UnknownType(kind));
        }
        let key = envelope.key.ok_or(BridgeError::MissingField("key"))?;
        let value = envelope.value.ok_or(BridgeError::MissingField("value"))?;

        Ok(if kind == UPDATE_TYPE {
            BridgeMessage::Update { key, value }
        } else {
            BridgeMessage::UpdateFromNative { key, value }
        })
    }
}
