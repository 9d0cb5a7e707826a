//! Canonical company record and its building blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Investment phase. Closed set; anything unrecognised is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    PreSeedSeed,
    Early,
    Growth,
    Ipo,
    Acquired,
    Unknown,
}

impl Stage {
    /// Every stage, in publication order.
    pub const ALL: [Stage; 6] = [
        Stage::PreSeedSeed,
        Stage::Early,
        Stage::Growth,
        Stage::Ipo,
        Stage::Acquired,
        Stage::Unknown,
    ];

    /// Identifier used in file names and JSON.
    pub fn id(self) -> &'static str {
        match self {
            Stage::PreSeedSeed => "pre-seed-seed",
            Stage::Early => "early",
            Stage::Growth => "growth",
            Stage::Ipo => "ipo",
            Stage::Acquired => "acquired",
            Stage::Unknown => "unknown",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::PreSeedSeed => "Pre-Seed / Seed",
            Stage::Early => "Early",
            Stage::Growth => "Growth",
            Stage::Ipo => "IPO",
            Stage::Acquired => "Acquired",
            Stage::Unknown => "Unknown",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Milestone years found on a profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
    pub founded_year: Option<i32>,
    pub partnered_year: Option<i32>,
    pub ipo_year: Option<i32>,
    pub acquired_year: Option<i32>,
}

impl Milestones {
    pub fn is_empty(&self) -> bool {
        self.founded_year.is_none()
            && self.partnered_year.is_none()
            && self.ipo_year.is_none()
            && self.acquired_year.is_none()
    }

    /// Named years, for validation and reporting.
    pub fn years(&self) -> [(&'static str, Option<i32>); 4] {
        [
            ("milestones.founded_year", self.founded_year),
            ("milestones.partnered_year", self.partnered_year),
            ("milestones.ipo_year", self.ipo_year),
            ("milestones.acquired_year", self.acquired_year),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrls {
    pub directory: String,
    pub profile: String,
}

/// Canonical entity record, as published under `companies/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// `{prefix}:{slug}`
    pub id: String,
    /// Identifier shown in the directory listing, when it has one
    pub source_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub website: Option<String>,
    /// Platform name to profile URL
    pub socials: BTreeMap<String, String>,
    /// Normalized category ids
    pub categories: BTreeSet<String>,
    pub current_stage: Stage,
    pub first_partnered_year: Option<i32>,
    /// Normalized partner ids, first occurrence order, no duplicates
    pub partners: Vec<String>,
    pub primary_partner: Option<String>,
    pub milestones: Milestones,
    pub team: Vec<TeamMember>,
    pub why_partnered: Option<String>,
    pub source_urls: SourceUrls,
}

/// `{id, name, slug}` entry used by every index document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanySummary {
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl From<&CompanyRecord> for CompanySummary {
    fn from(record: &CompanyRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            slug: record.slug.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_as_kebab_id() {
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.id()));
            assert_eq!(Stage::from_id(stage.id()), Some(stage));
        }
    }

    #[test]
    fn unknown_stage_id_is_rejected_on_read() {
        assert!(serde_json::from_str::<Stage>("\"series-b\"").is_err());
        assert_eq!(Stage::from_id("series-b"), None);
    }

    #[test]
    fn empty_milestones() {
        assert!(Milestones::default().is_empty());
        let m = Milestones {
            ipo_year: Some(2019),
            ..Default::default()
        };
        assert!(!m.is_empty());
    }
}
