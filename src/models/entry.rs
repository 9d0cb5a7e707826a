//! Raw, pre-normalization data produced by the parsers.
//!
//! These are what the change-detection cache stores per URL, so an unchanged
//! page can skip parsing and still feed the normalizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Milestones, TeamMember};

/// Fields visible on the directory listing row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineFields {
    pub stage: Option<String>,
    pub categories: Vec<String>,
    pub partners: Vec<String>,
    pub first_partnered_year: Option<i32>,
}

/// One entity discovered on the directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub profile_url: String,
    pub source_id: Option<String>,
    /// Directory page the entry was found on
    pub directory_url: String,
    pub inline: InlineFields,
}

/// Raw fields pulled from a profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub socials: BTreeMap<String, String>,
    pub categories: Vec<String>,
    pub milestones: Milestones,
    pub partners: Vec<String>,
    pub team: Vec<TeamMember>,
    pub why_partnered: Option<String>,
}
