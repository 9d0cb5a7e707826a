//! Publishing of the static JSON tree.
//!
//! ## Directory Structure
//!
//! ```text
//! docs/
//! ├── meta.json
//! ├── companies/
//! │   ├── all.json
//! │   └── {slug}.json
//! ├── categories/{id}.json
//! ├── partners/{id}.json
//! ├── stages/{stage}.json
//! └── first-partnered/{year}.json
//! ```

pub mod local;
pub mod tree;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BuildManifest, CompanyRecord};

// Re-export for convenience
pub use local::LocalPublisher;
pub use tree::{OutputTree, read_tree, verify_tree};

/// The currently published build, as far as the next run needs it.
#[derive(Debug, Clone)]
pub struct LastGood {
    pub manifest: BuildManifest,
    pub companies: Vec<CompanyRecord>,
}

/// Checks decided upstream of the publisher.
#[derive(Debug, Clone, Default)]
pub struct PublishChecks {
    /// Reasons already known to block publication (rate guards)
    pub blocking: Vec<String>,
    /// Skip the count-drop guard
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The staged tree replaced the published one
    Published { files: usize },
    /// Identical to what is already published; nothing was touched
    Unchanged,
}

/// Destination for built trees.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Load the currently published build, if any.
    async fn load_last_good(&self) -> Result<Option<LastGood>>;

    /// Stage, check and swap in `tree`. On any failed check returns
    /// [`AppError::PublishAborted`](crate::error::AppError::PublishAborted)
    /// and leaves the published build untouched.
    async fn publish(
        &self,
        tree: &OutputTree,
        last_good: Option<&LastGood>,
        checks: &PublishChecks,
    ) -> Result<PublishOutcome>;
}
