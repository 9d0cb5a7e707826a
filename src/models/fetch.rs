//! Per-URL fetch observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record per distinct URL per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    /// SHA-256 of the body, hex encoded; absent when no body was obtained
    pub content_hash: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Last HTTP status seen; absent when every attempt failed below HTTP
    pub http_status: Option<u16>,
    pub attempt_count: u32,
}

impl FetchRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_hash: None,
            fetched_at: Utc::now(),
            http_status: None,
            attempt_count: 0,
        }
    }
}
