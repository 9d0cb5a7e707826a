//! Derived index generation.
//!
//! Records are keyed by id before anything is emitted, so the order in which
//! workers finished never shows up in the output: identical inputs give
//! identical indexes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{
    BuildManifest, CategoryIndex, CompanyRecord, CompanySummary, PartnerIndex, Stage, StageIndex,
    YearIndex,
};
use crate::services::{IdKind, IdRegistry};

/// Everything the publisher needs to render the output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltIndex {
    /// Sorted by id
    pub companies: Vec<CompanyRecord>,
    pub categories: BTreeMap<String, CategoryIndex>,
    pub partners: BTreeMap<String, PartnerIndex>,
    /// One per stage, in [`Stage::ALL`] order
    pub stages: Vec<StageIndex>,
    pub years: BTreeMap<i32, YearIndex>,
    pub manifest: BuildManifest,
}

/// Manifest fields that do not come from the records.
#[derive(Debug, Clone)]
pub struct ManifestInfo {
    pub generated_at: DateTime<Utc>,
    pub schema_version: String,
    pub source_entry_url: String,
}

/// Builder for the derived indexes.
pub struct IndexBuilder<'r> {
    registry: &'r IdRegistry,
    records: BTreeMap<String, CompanyRecord>,
}

impl<'r> IndexBuilder<'r> {
    /// `registry` supplies category labels and partner names.
    pub fn new(registry: &'r IdRegistry) -> Self {
        Self {
            registry,
            records: BTreeMap::new(),
        }
    }

    /// Add a validated record. Returns `false` (and keeps the existing one)
    /// if a record with the same id was already added.
    pub fn add_record(&mut self, record: CompanyRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        true
    }

    pub fn add_records(&mut self, records: impl IntoIterator<Item = CompanyRecord>) {
        for record in records {
            self.add_record(record);
        }
    }

    /// Build every index and the manifest.
    pub fn build(self, info: &ManifestInfo) -> BuiltIndex {
        let mut category_members: BTreeMap<&str, BTreeSet<CompanySummary>> = BTreeMap::new();
        let mut partner_members: BTreeMap<&str, BTreeSet<CompanySummary>> = BTreeMap::new();
        let mut stage_members: BTreeMap<Stage, BTreeSet<CompanySummary>> = BTreeMap::new();
        let mut year_members: BTreeMap<i32, BTreeSet<CompanySummary>> = BTreeMap::new();

        for record in self.records.values() {
            let summary = CompanySummary::from(record);
            for category in &record.categories {
                category_members
                    .entry(category)
                    .or_default()
                    .insert(summary.clone());
            }
            for partner in &record.partners {
                partner_members
                    .entry(partner)
                    .or_default()
                    .insert(summary.clone());
            }
            if let Some(year) = record.first_partnered_year {
                year_members.entry(year).or_default().insert(summary.clone());
            }
            stage_members
                .entry(record.current_stage)
                .or_default()
                .insert(summary);
        }

        let categories: BTreeMap<String, CategoryIndex> = category_members
            .into_iter()
            .map(|(id, members)| {
                let index = CategoryIndex {
                    id: id.to_string(),
                    label: self
                        .registry
                        .label(IdKind::Category, id)
                        .unwrap_or_else(|| id.to_string()),
                    companies: members.into_iter().collect(),
                };
                (id.to_string(), index)
            })
            .collect();

        let partners = partner_members
            .into_iter()
            .map(|(id, members)| {
                let index = PartnerIndex {
                    id: id.to_string(),
                    name: self
                        .registry
                        .label(IdKind::Partner, id)
                        .unwrap_or_else(|| id.to_string()),
                    companies: members.into_iter().collect(),
                };
                (id.to_string(), index)
            })
            .collect();

        let stages: Vec<StageIndex> = Stage::ALL
            .into_iter()
            .map(|stage| StageIndex {
                id: stage.id().to_string(),
                label: stage.label().to_string(),
                companies: stage_members
                    .remove(&stage)
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            })
            .collect();

        let years = year_members
            .into_iter()
            .map(|(year, members)| {
                (
                    year,
                    YearIndex {
                        year,
                        companies: members.into_iter().collect(),
                    },
                )
            })
            .collect();

        let companies: Vec<CompanyRecord> = self.records.into_values().collect();

        let manifest = BuildManifest {
            last_updated_iso: info
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            schema_version: info.schema_version.clone(),
            total_companies: companies.len(),
            counts_by_stage: stages
                .iter()
                .map(|s| (s.id.clone(), s.companies.len()))
                .collect(),
            counts_by_category: categories
                .iter()
                .map(|(id, c)| (id.clone(), c.companies.len()))
                .collect(),
            source_entry_url: info.source_entry_url.clone(),
        };

        BuiltIndex {
            companies,
            categories,
            partners,
            stages,
            years,
            manifest,
        }
    }
}

/// Build indexes from a set of records in one call.
pub fn build_index(
    records: impl IntoIterator<Item = CompanyRecord>,
    registry: &IdRegistry,
    info: &ManifestInfo,
) -> BuiltIndex {
    let mut builder = IndexBuilder::new(registry);
    builder.add_records(records);
    builder.build(info)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Milestones, SourceUrls};
    use chrono::TimeZone;

    pub(crate) fn sample_record(
        registry: &IdRegistry,
        slug: &str,
        stage: Stage,
        categories: &[&str],
        partners: &[&str],
        year: Option<i32>,
    ) -> CompanyRecord {
        let partners: Vec<String> = partners
            .iter()
            .filter_map(|p| registry.register(IdKind::Partner, p))
            .collect();
        CompanyRecord {
            id: format!("source:{slug}"),
            source_id: None,
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            description: None,
            website: None,
            socials: BTreeMap::new(),
            categories: categories
                .iter()
                .filter_map(|c| registry.register(IdKind::Category, c))
                .collect(),
            current_stage: stage,
            first_partnered_year: year,
            primary_partner: partners.first().cloned(),
            partners,
            milestones: Milestones::default(),
            team: Vec::new(),
            why_partnered: None,
            source_urls: SourceUrls::default(),
        }
    }

    pub(crate) fn info() -> ManifestInfo {
        ManifestInfo {
            generated_at: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
            schema_version: "1.0.0".into(),
            source_entry_url: "https://example.com/our-companies/".into(),
        }
    }

    fn sample(registry: &IdRegistry) -> Vec<CompanyRecord> {
        vec![
            sample_record(registry, "zeta", Stage::Growth, &["AI"], &["Jane Roe"], Some(2015)),
            sample_record(
                registry,
                "acme",
                Stage::Growth,
                &["Fintech", "AI"],
                &["John Doe", "Jane Roe"],
                Some(2015),
            ),
            sample_record(registry, "beta", Stage::Ipo, &[], &[], None),
        ]
    }

    #[test]
    fn test_build_index() {
        let registry = IdRegistry::new();
        let index = build_index(sample(&registry), &registry, &info());

        let ids: Vec<&str> = index.companies.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["source:acme", "source:beta", "source:zeta"]);

        let ai = &index.categories["ai"];
        assert_eq!(ai.label, "AI");
        assert_eq!(
            ai.companies.iter().map(|c| c.slug.as_str()).collect::<Vec<_>>(),
            vec!["acme", "zeta"]
        );
        assert_eq!(index.partners["jane-roe"].name, "Jane Roe");
        assert_eq!(index.partners["jane-roe"].companies.len(), 2);
        assert_eq!(index.years[&2015].companies.len(), 2);
        assert!(!index.years.contains_key(&0));
    }

    #[test]
    fn test_every_stage_present_and_counts_consistent() {
        let registry = IdRegistry::new();
        let index = build_index(sample(&registry), &registry, &info());
        let manifest = &index.manifest;

        assert_eq!(index.stages.len(), 6);
        assert_eq!(manifest.counts_by_stage.len(), 6);
        assert_eq!(manifest.counts_by_stage["growth"], 2);
        assert_eq!(manifest.counts_by_stage["early"], 0);
        assert_eq!(manifest.total_companies, 3);
        assert_eq!(
            manifest.counts_by_stage.values().sum::<usize>(),
            manifest.total_companies
        );
        assert_eq!(manifest.counts_by_category["fintech"], 1);
        assert_eq!(manifest.counts_by_category.len(), index.categories.len());
        assert_eq!(manifest.last_updated_iso, "2026-10-01T12:00:00Z");
    }

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let registry = IdRegistry::new();
        let mut records = sample(&registry);
        let forward = build_index(records.clone(), &registry, &info());
        records.reverse();
        let backward = build_index(records, &registry, &info());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let registry = IdRegistry::new();
        let mut builder = IndexBuilder::new(&registry);
        assert!(builder.add_record(sample_record(&registry, "a", Stage::Early, &[], &[], None)));
        assert!(!builder.add_record(sample_record(&registry, "a", Stage::Ipo, &[], &[], None)));
        let index = builder.build(&info());
        assert_eq!(index.companies[0].current_stage, Stage::Early);
    }
}
