//! Lock DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a lock create-or-update request
///
/// `keywords` is kept as raw JSON so that non-string entries can be reported
/// as a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockPayload {
    #[serde(default, alias = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,

    /// JSON schema document as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<serde_json::Value>,
}

impl LockPayload {
    /// Unconditional lock expiring at `expires_at` (or the default expiry)
    pub fn unconditional(expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            expires_at,
            ..Default::default()
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = keywords
            .into_iter()
            .map(|k| serde_json::Value::String(k.into()))
            .collect();
        self.keywords = Some(serde_json::Value::Array(list));
        self
    }

    pub fn with_regexp(mut self, regexp: impl Into<String>) -> Self {
        self.regexp = Some(regexp.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Response of a lock delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLockResponse {
    pub status: String,
    /// `deleted` or `already_deleted`
    pub detail: String,
}

impl DeleteLockResponse {
    pub fn new(deleted: bool) -> Self {
        Self {
            status: "OK".to_string(),
            detail: if deleted { "deleted" } else { "already_deleted" }.to_string(),
        }
    }

    pub fn was_deleted(&self) -> bool {
        self.detail == "deleted"
    }
}
