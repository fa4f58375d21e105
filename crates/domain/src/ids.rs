use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default length of generated record ids.
pub const DEFAULT_ID_LENGTH: usize = 16;

/// Stable string identifier of a record within its owning collection.
///
/// Ids are generated once, when a record is first created or first seen
/// without an `_id`, and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random id of `len` hex characters (clamped to 1..=32).
    pub fn generate(len: usize) -> Self {
        let len = len.clamp(1, 32);
        let mut raw = Uuid::new_v4().simple().to_string();
        raw.truncate(len);
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Read the `_id` of a serialized record, if it carries a non-empty one.
    pub fn of(value: &serde_json::Value) -> Option<Self> {
        value
            .get("_id")
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::generate(DEFAULT_ID_LENGTH)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_have_requested_length() {
        assert_eq!(RecordId::generate(16).as_str().len(), 16);
        assert_eq!(RecordId::generate(8).as_str().len(), 8);
        assert_eq!(RecordId::generate(0).as_str().len(), 1);
        assert_eq!(RecordId::generate(64).as_str().len(), 32);
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(RecordId::generate(16), RecordId::generate(16));
    }

    #[test]
    fn of_reads_non_empty_ids_only() {
        assert_eq!(RecordId::of(&json!({"_id": "abc"})), Some(RecordId::new("abc")));
        assert_eq!(RecordId::of(&json!({"_id": ""})), None);
        assert_eq!(RecordId::of(&json!({"_id": 4})), None);
        assert_eq!(RecordId::of(&json!({"name": "x"})), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RecordId::new("sword01");
        assert_eq!(serde_json::to_value(&id).ok(), Some(json!("sword01")));
    }
}
