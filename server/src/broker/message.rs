//! Published message record and field validation

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::core::constants::TOPIC_NAME_MAX_LEN;

/// An immutable published message.
///
/// Shared as `Arc<Message>` between a topic's ring buffer and every
/// subscriber queue it is fanned out to.
#[derive(Debug, Clone)]
pub struct Message {
    /// Caller-supplied id, validated as a canonical lowercase UUID
    pub id: String,
    /// Opaque structured payload; the broker never inspects it
    pub payload: Value,
    /// Server-assigned publish timestamp
    pub ts: DateTime<Utc>,
}

impl Message {
    /// Stamp a new message at the current wall clock
    pub fn stamped(id: String, payload: Value) -> Self {
        Self {
            id,
            payload,
            ts: Utc::now(),
        }
    }

    /// RFC 3339 rendering of the publish timestamp
    pub fn ts_rfc3339(&self) -> String {
        self.ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Check that `id` is a canonical universally-unique identifier in
/// lowercase hyphenated form (the only accepted rendering).
pub fn is_canonical_uuid(id: &str) -> bool {
    match Uuid::try_parse(id) {
        Ok(parsed) => parsed.hyphenated().to_string() == id,
        Err(_) => false,
    }
}

/// Validate a topic name: `[A-Za-z0-9][A-Za-z0-9-]*`, length 1..=128
pub fn is_valid_topic_name(name: &str) -> bool {
    if name.is_empty() || name.len() > TOPIC_NAME_MAX_LEN {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty checked above");
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_uuid_accepted() {
        assert!(is_canonical_uuid("11111111-1111-4111-8111-111111111111"));
        assert!(is_canonical_uuid(
            &Uuid::new_v4().hyphenated().to_string()
        ));
    }

    #[test]
    fn test_non_canonical_uuid_rejected() {
        assert!(!is_canonical_uuid("not-a-uuid"));
        assert!(!is_canonical_uuid(""));
        // Uppercase parses, but is not the canonical rendering
        assert!(!is_canonical_uuid("11111111-1111-4111-8111-11111111111A"));
        // Braced and simple forms parse, but are not canonical either
        assert!(!is_canonical_uuid(
            "{11111111-1111-4111-8111-111111111111}"
        ));
        assert!(!is_canonical_uuid("11111111111141118111111111111111"));
    }

    #[test]
    fn test_topic_name_validation() {
        assert!(is_valid_topic_name("orders"));
        assert!(is_valid_topic_name("orders-v2"));
        assert!(is_valid_topic_name("0"));
        assert!(is_valid_topic_name(&"a".repeat(128)));

        assert!(!is_valid_topic_name(""));
        assert!(!is_valid_topic_name("-orders"));
        assert!(!is_valid_topic_name("bad name!"));
        assert!(!is_valid_topic_name("orders_v2"));
        assert!(!is_valid_topic_name(&"a".repeat(129)));
    }

    #[test]
    fn test_stamped_message_renders_rfc3339() {
        let msg = Message::stamped(
            "11111111-1111-4111-8111-111111111111".to_string(),
            serde_json::json!({"v": 1}),
        );
        let ts = msg.ts_rfc3339();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
