//! Chat message records as they travel over the wire and into the log.
//!
//! The schema is open: any JSON object with a `message` key is a record.
//! Unknown fields are carried through untouched, in their original order,
//! so recipients and the log see exactly what the sender submitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRecord(Map<String, Value>);

impl MessageRecord {
    /// Parse an inbound frame. Returns `None` for anything that is not a
    /// JSON object carrying a `message` field; such frames are dropped.
    pub fn from_wire(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(map) => Self::from_map(map),
            _ => None,
        }
    }

    fn from_map(map: Map<String, Value>) -> Option<Self> {
        map.contains_key("message").then_some(Self(map))
    }

    /// Wrap an entry read back from the log. Stored entries are replayed
    /// as-is, whether or not they carry `message`.
    pub fn from_stored(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Declared recipient, if the sender supplied one as a string.
    pub fn to(&self) -> Option<&str> {
        self.str_field("to")
    }

    pub fn from(&self) -> Option<&str> {
        self.str_field("from")
    }

    /// Sender name used by older clients in place of `from`.
    pub fn legacy_username(&self) -> Option<&str> {
        self.str_field("username")
    }

    /// Whether `identity` may see this record in its history.
    pub fn visible_to(&self, identity: &str, group: &str) -> bool {
        self.to() == Some(group)
            || self.to() == Some(identity)
            || self.from() == Some(identity)
            || self.legacy_username() == Some(identity)
    }

    /// Serialize for an outbound frame.
    pub fn to_wire(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}
