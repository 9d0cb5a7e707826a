// src/error.rs

//! Unified error handling for the crawl-and-build pipeline.
//!
//! `AppError` is what the run surfaces to callers. The narrower types below
//! it describe per-entity failures that the pipeline records and isolates.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed or used
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The directory listing could not be fetched; nothing was staged.
    #[error("Directory unavailable at {url}: {source}")]
    DirectoryUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Aggregate safety checks refused to replace the published tree.
    #[error(transparent)]
    PublishAborted(#[from] PublishAbort),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a directory-unavailable error.
    pub fn directory(url: impl Into<String>, source: FetchError) -> Self {
        Self::DirectoryUnavailable {
            url: url.into(),
            source,
        }
    }
}

/// Failure to obtain a page body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Retryable condition (429, 5xx, timeout, connection reset).
    #[error("transient failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    /// Retry budget spent on transient failures.
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Non-retryable client error (4xx other than 429).
    #[error("{url} rejected with HTTP {status} after {attempts} attempt(s)")]
    Rejected {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// The request could not be built (malformed URL and the like).
    #[error("invalid request for {url}: {reason}")]
    Invalid { url: String, reason: String },

    /// robots.txt disallows the path for our user agent.
    #[error("{url} is disallowed by robots.txt")]
    RobotsDisallowed { url: String },
}

impl FetchError {
    /// URL the failure belongs to.
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. }
            | Self::Exhausted { url, .. }
            | Self::Rejected { url, .. }
            | Self::Invalid { url, .. }
            | Self::RobotsDisallowed { url } => url,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A required field could not be mapped to its canonical form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("name {name:?} produces an empty slug")]
    EmptySlug { name: String },
}

/// Diagnostic emitted when a staged build must not replace the last good one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("publish aborted: {}", .reasons.join("; "))]
pub struct PublishAbort {
    pub reasons: Vec<String>,
}

impl PublishAbort {
    pub fn new(reasons: Vec<String>) -> Self {
        Self { reasons }
    }
}
