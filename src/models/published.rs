//! Documents in the published JSON tree.
//!
//! ```text
//! meta.json                      BuildManifest
//! companies/all.json             [CompanyRecord]
//! companies/{slug}.json          CompanyRecord
//! categories/{id}.json           CategoryIndex
//! partners/{id}.json             PartnerIndex
//! stages/{id}.json               StageIndex
//! first-partnered/{year}.json    YearIndex
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CompanySummary;

/// Summary metadata, published as `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub last_updated_iso: String,
    pub schema_version: String,
    pub total_companies: usize,
    /// Every stage id, including those with zero companies
    pub counts_by_stage: BTreeMap<String, usize>,
    /// One entry per category index file
    pub counts_by_category: BTreeMap<String, usize>,
    pub source_entry_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryIndex {
    pub id: String,
    pub label: String,
    pub companies: Vec<CompanySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerIndex {
    pub id: String,
    pub name: String,
    pub companies: Vec<CompanySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIndex {
    pub id: String,
    pub label: String,
    pub companies: Vec<CompanySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearIndex {
    pub year: i32,
    pub companies: Vec<CompanySummary>,
}
