//! Service layer for the crawler.
//!
//! - Polite fetching (`RateLimitedFetcher`)
//! - Change detection (`ChangeDetectionCache`)
//! - Listing and profile parsing (`DirectoryParser`, `ProfileParser`)
//! - Canonicalization and validation (`Normalizer`, `SchemaValidator`)

pub mod cache;
pub mod directory;
pub mod fetcher;
pub mod normalizer;
pub mod profile;
pub mod validator;

pub use cache::{CacheEntry, CachedParse, ChangeDetectionCache};
pub use directory::{DirectoryCrawl, DirectoryPage, DirectoryParser};
pub use fetcher::{
    FetchedPage, HttpTransport, RateLimitedFetcher, RawResponse, RetryPolicy, Transport,
};
pub use normalizer::{IdKind, IdRegistry, Normalizer, normalize_stage};
pub use profile::{ProfileParser, REPORTED_FIELDS};
pub use validator::{SchemaValidator, ValidationResult};

use scraper::Selector;

use crate::error::{AppError, Result};

/// Parse a CSS selector, reporting the offending text on failure.
pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
