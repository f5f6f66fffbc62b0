//! Signal message format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::SHM_SIZE;
use crate::error::SignalError;

/// A message delivered through the signal channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub id: i64,
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

impl SignalMessage {
    /// Serializes the message, enforcing the buffer size limit.
    pub fn encode(&self) -> Result<String, SignalError> {
        let text =
            serde_json::to_string(self).map_err(|e| SignalError::InvalidJson(e.to_string()))?;
        if text.len() >= SHM_SIZE {
            return Err(SignalError::TooLarge {
                size: text.len(),
                limit: SHM_SIZE,
            });
        }
        Ok(text)
    }

    /// Parses a message read back from shared memory.
    pub fn decode(text: &str) -> Result<Self, SignalError> {
        serde_json::from_str(text).map_err(|e| SignalError::InvalidJson(e.to_string()))
    }
}

/// Returns `true` if `key` starts with a letter or underscore and contains only
/// letters, digits and underscores.
pub fn validate_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parses a JSON object payload into identifier keys and string values.
///
/// String values are kept verbatim; any other JSON value is stored as its JSON
/// text.
pub fn parse_payload(raw: &str) -> Result<BTreeMap<String, String>, SignalError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| SignalError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SignalError::InvalidJson(
            "payload must be a JSON object".to_string(),
        ));
    };

    let mut payload = BTreeMap::new();
    for (key, value) in map {
        if !validate_key(&key) {
            return Err(SignalError::InvalidKey(key));
        }
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        payload.insert(key, text);
    }
    Ok(payload)
}

/// Builds and serializes a message from its id and raw JSON payload.
///
/// # Returns
///
/// The serialized message, guaranteed to fit in the shared buffer.
pub fn create_message(id: i64, raw_payload: Option<&str>) -> Result<String, SignalError> {
    let payload = match raw_payload {
        Some(raw) => parse_payload(raw)?,
        None => BTreeMap::new(),
    };
    SignalMessage { id, payload }.encode()
}
