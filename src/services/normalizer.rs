// src/services/normalizer.rs

//! Raw fields to canonical [`CompanyRecord`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::NormalizationError;
use crate::models::{
    CompanyRecord, DirectoryEntry, Milestones, ProfileFields, SourceUrls, Stage, TeamMember,
};
use crate::utils::{clean_text, slugify};

/// Namespaces the registry keeps ids in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdKind {
    Category,
    Partner,
}

/// Run-wide id to display label mapping for categories and partners.
///
/// Shared by every normalizer worker. When several raw labels map to the
/// same id, the lexicographically smallest label is kept, so the published
/// label does not depend on which entity registered first.
#[derive(Debug, Default)]
pub struct IdRegistry {
    ids: Mutex<BTreeMap<(IdKind, String), String>>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(IdKind, String), String>> {
        self.ids.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Id for `label`, registering it if new. `None` when the label has no
    /// slug-able characters.
    pub fn register(&self, kind: IdKind, label: &str) -> Option<String> {
        let label = clean_text(label);
        let id = slugify(&label);
        if id.is_empty() {
            return None;
        }
        let mut ids = self.lock();
        let stored = ids.entry((kind, id.clone())).or_insert_with(|| label.clone());
        if label < *stored {
            *stored = label;
        }
        Some(id)
    }

    pub fn contains(&self, kind: IdKind, id: &str) -> bool {
        self.lock().contains_key(&(kind, id.to_string()))
    }

    pub fn label(&self, kind: IdKind, id: &str) -> Option<String> {
        self.lock().get(&(kind, id.to_string())).cloned()
    }

    /// Every id of `kind` with its label, sorted by id.
    pub fn labels(&self, kind: IdKind) -> BTreeMap<String, String> {
        self.lock()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), label)| (id.clone(), label.clone()))
            .collect()
    }
}

/// Map a raw stage label to the closed stage set.
///
/// Comparison ignores case and punctuation, so "Pre-Seed/Seed",
/// "pre seed / seed" and the id "pre-seed-seed" all agree. Anything not in
/// the table is [`Stage::Unknown`].
pub fn normalize_stage(raw: &str) -> Stage {
    let key = raw
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    match key.as_str() {
        "pre seed seed" | "pre seed" | "preseed" | "seed" | "seed stage" => Stage::PreSeedSeed,
        "early" | "early stage" | "venture" => Stage::Early,
        "growth" | "growth stage" | "late" | "late stage" => Stage::Growth,
        "ipo" | "public" | "ipo public" => Stage::Ipo,
        "acquired" | "acquisition" | "m a" => Stage::Acquired,
        _ => Stage::Unknown,
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(clean_text).filter(|t| !t.is_empty())
}

pub struct Normalizer<'r> {
    id_prefix: String,
    registry: &'r IdRegistry,
}

impl<'r> Normalizer<'r> {
    pub fn new(id_prefix: impl Into<String>, registry: &'r IdRegistry) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            registry,
        }
    }

    /// Combine a listing entry and its profile fields into a canonical record.
    ///
    /// The directory is authoritative for name, stage and first-partnered
    /// year; the profile fills what the listing lacks.
    pub fn normalize(
        &self,
        entry: &DirectoryEntry,
        fields: &ProfileFields,
    ) -> Result<CompanyRecord, NormalizationError> {
        let name = non_empty(Some(entry.name.as_str()))
            .or_else(|| non_empty(fields.name.as_deref()))
            .unwrap_or_default();
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(NormalizationError::EmptySlug { name });
        }

        let categories: BTreeSet<String> = fields
            .categories
            .iter()
            .chain(&entry.inline.categories)
            .filter_map(|label| self.registry.register(IdKind::Category, label))
            .collect();

        let mut partners: Vec<String> = Vec::new();
        for label in fields.partners.iter().chain(&entry.inline.partners) {
            if let Some(id) = self.registry.register(IdKind::Partner, label) {
                if !partners.contains(&id) {
                    partners.push(id);
                }
            }
        }

        let milestones = fields.milestones.clone();
        let current_stage = resolve_stage(entry.inline.stage.as_deref(), &milestones);

        let team = fields
            .team
            .iter()
            .filter_map(|member| {
                let name = non_empty(Some(member.name.as_str()))?;
                Some(TeamMember {
                    name,
                    role: non_empty(member.role.as_deref()),
                })
            })
            .collect();

        Ok(CompanyRecord {
            id: format!("{}:{}", self.id_prefix, slug),
            source_id: non_empty(entry.source_id.as_deref()),
            name,
            slug,
            description: non_empty(fields.description.as_deref()),
            website: non_empty(fields.website.as_deref()),
            socials: fields.socials.clone(),
            categories,
            current_stage,
            first_partnered_year: entry
                .inline
                .first_partnered_year
                .or(milestones.partnered_year),
            primary_partner: partners.first().cloned(),
            partners,
            milestones,
            team,
            why_partnered: non_empty(fields.why_partnered.as_deref()),
            source_urls: SourceUrls {
                directory: entry.directory_url.clone(),
                profile: entry.profile_url.clone(),
            },
        })
    }
}

/// Listing stage when recognised, otherwise inferred from milestone years.
fn resolve_stage(listed: Option<&str>, milestones: &Milestones) -> Stage {
    match listed.map(normalize_stage) {
        Some(stage) if stage != Stage::Unknown => stage,
        _ if milestones.acquired_year.is_some() => Stage::Acquired,
        _ if milestones.ipo_year.is_some() => Stage::Ipo,
        _ => Stage::Unknown,
    }
}
