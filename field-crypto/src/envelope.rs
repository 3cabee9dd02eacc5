//! Wire shape for an encrypted field value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Self-describing envelope stored in place of an encrypted field value.
///
/// Binary members are base64. `salt` is carried for ciphers that derive
/// per-value keys; AES-GCM leaves it unset. `deny_unknown_fields` keeps
/// envelope detection strict: an ordinary object with extra members never
/// qualifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    pub algorithm: String,
    pub timestamp: DateTime<Utc>,
}

impl EncryptedEnvelope {
    /// Reinterpret a JSON value as an envelope, if it has exactly the
    /// envelope shape. This is how the read path spots encrypted fields.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// JSON form stored in place of the original field value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EncryptedEnvelope {
        EncryptedEnvelope {
            ciphertext: "Y2lwaGVy".into(),
            iv: "bm9uY2U=".into(),
            salt: None,
            algorithm: "AES-256-GCM".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_value_roundtrip() {
        let envelope = sample();
        let value = envelope.to_value();
        let back = EncryptedEnvelope::from_value(&value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_plain_values_are_not_envelopes() {
        assert!(EncryptedEnvelope::from_value(&json!("hello")).is_none());
        assert!(EncryptedEnvelope::from_value(&json!(42)).is_none());
        assert!(EncryptedEnvelope::from_value(&json!({"message": "hi"})).is_none());
        // Extra members disqualify an otherwise envelope-shaped object.
        let mut value = sample().to_value();
        value["extra"] = json!(true);
        assert!(EncryptedEnvelope::from_value(&value).is_none());
    }

    #[test]
    fn test_salt_is_omitted_when_absent() {
        let value = sample().to_value();
        assert!(value.get("salt").is_none());

        let with_salt = EncryptedEnvelope {
            salt: Some("c2FsdA==".into()),
            ..sample()
        };
        assert_eq!(with_salt.to_value()["salt"], json!("c2FsdA=="));
    }
}
