//! Lock domain types
//!
//! A lock is an admission guard placed on a pipeline. Without filters it
//! blocks every run of the pipeline; with filters it blocks only the runs
//! whose payload satisfies all of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Admission lock, identified by `(lock_id, pipeline_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub lock_id: String,
    pub pipeline_id: String,
    pub expires_at: DateTime<Utc>,
    /// Regular expression searched anywhere in the payload
    pub regexp: Option<String>,
    /// JSON schema document, kept as text
    pub schema: Option<String>,
    /// Literal substrings, any of which matches
    #[serde(default)]
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Regexp filter, if configured (blank counts as absent)
    pub fn regexp_filter(&self) -> Option<&str> {
        self.regexp.as_deref().filter(|r| !r.is_empty())
    }

    /// Schema filter, if configured (blank counts as absent)
    pub fn schema_filter(&self) -> Option<&str> {
        self.schema.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Keyword filter, if configured
    pub fn keywords_filter(&self) -> Option<&[String]> {
        if self.keywords.is_empty() {
            None
        } else {
            Some(&self.keywords)
        }
    }

    /// Number of configured payload filters; zero means an unconditional lock
    pub fn filter_count(&self) -> usize {
        [
            self.regexp_filter().is_some(),
            self.schema_filter().is_some(),
            self.keywords_filter().is_some(),
        ]
        .into_iter()
        .filter(|configured| *configured)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lock() -> Lock {
        let now = Utc::now();
        Lock {
            lock_id: "global".to_string(),
            pipeline_id: "deploy".to_string(),
            expires_at: now + Duration::hours(1),
            regexp: None,
            schema: None,
            keywords: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_filter_count() {
        let mut lock = lock();
        assert_eq!(lock.filter_count(), 0);

        lock.regexp = Some("v[0-9]+".to_string());
        assert_eq!(lock.filter_count(), 1);

        lock.schema = Some(r#"{"type": "object"}"#.to_string());
        lock.keywords = vec!["release".to_string()];
        assert_eq!(lock.filter_count(), 3);
    }

    #[test]
    fn test_blank_filters_are_not_configured() {
        let mut lock = lock();
        lock.regexp = Some(String::new());
        lock.schema = Some("   ".to_string());
        assert_eq!(lock.filter_count(), 0);
        assert!(lock.regexp_filter().is_none());
        assert!(lock.schema_filter().is_none());
    }

    #[test]
    fn test_expiry() {
        let mut lock = lock();
        let now = Utc::now();
        assert!(!lock.is_expired(now));

        lock.expires_at = now - Duration::seconds(1);
        assert!(lock.is_expired(now));
    }
}
