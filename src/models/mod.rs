// src/models/mod.rs

//! Domain models for the crawl-and-build pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod company;
mod config;
mod entry;
mod fetch;
mod published;
mod report;

// Re-export all public types
pub use company::{CompanyRecord, CompanySummary, Milestones, SourceUrls, Stage, TeamMember};
pub use config::{
    BuildConfig, Config, CrawlerConfig, DirectoryConfig, PathsConfig, SafetyConfig, SourceConfig,
};
pub use entry::{DirectoryEntry, InlineFields, ProfileFields};
pub use fetch::FetchRecord;
pub use published::{BuildManifest, CategoryIndex, PartnerIndex, StageIndex, YearIndex};
pub use report::{
    BuildDiff, Exclusion, ExtractionReport, FieldCompleteness, FieldTally, RunReport,
};
