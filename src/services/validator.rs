// src/services/validator.rs

//! Canonical record contract checks.

use crate::models::CompanyRecord;
use crate::utils::is_valid_slug;

use super::normalizer::{IdKind, IdRegistry};

/// Slugs that would collide with index documents under `companies/`.
const RESERVED_SLUGS: &[&str] = &["all"];

/// Outcome of validating one record. Violations are human-readable,
/// prefixed with the offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub violations: Vec<String>,
}

impl ValidationResult {
    fn from_violations(violations: Vec<String>) -> Self {
        Self {
            ok: violations.is_empty(),
            violations,
        }
    }
}

pub struct SchemaValidator<'r> {
    id_prefix: String,
    registry: &'r IdRegistry,
}

impl<'r> SchemaValidator<'r> {
    pub fn new(id_prefix: impl Into<String>, registry: &'r IdRegistry) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            registry,
        }
    }

    /// Check every rule and collect all violations. Never stops at the first.
    ///
    /// `current_stage` needs no check: [`Stage`](crate::models::Stage) is a
    /// closed enum.
    pub fn validate(&self, record: &CompanyRecord) -> ValidationResult {
        let mut violations = Vec::new();

        if record.name.trim().is_empty() {
            violations.push("name: must not be empty".to_string());
        }
        if record.slug.is_empty() {
            violations.push("slug: must not be empty".to_string());
        } else if !is_valid_slug(&record.slug) {
            violations.push(format!(
                "slug: {:?} does not match ^[a-z0-9]+(-[a-z0-9]+)*$",
                record.slug
            ));
        } else if RESERVED_SLUGS.contains(&record.slug.as_str()) {
            violations.push(format!("slug: {:?} is reserved", record.slug));
        }

        let expected_id = format!("{}:{}", self.id_prefix, record.slug);
        if record.id.is_empty() {
            violations.push("id: must not be empty".to_string());
        } else if record.id != expected_id {
            violations.push(format!(
                "id: {:?} does not match {:?}",
                record.id, expected_id
            ));
        }

        for category in &record.categories {
            if !self.registry.contains(IdKind::Category, category) {
                violations.push(format!("categories: unknown id {category:?}"));
            }
        }
        for partner in &record.partners {
            if !self.registry.contains(IdKind::Partner, partner) {
                violations.push(format!("partners: unknown id {partner:?}"));
            }
        }
        if let Some(primary) = &record.primary_partner {
            if !record.partners.contains(primary) {
                violations.push(format!("primary_partner: {primary:?} not among partners"));
            }
        }

        for (i, member) in record.team.iter().enumerate() {
            if member.name.trim().is_empty() {
                violations.push(format!("team[{i}].name: must not be empty"));
            }
        }

        let years = record
            .milestones
            .years()
            .into_iter()
            .chain([("first_partnered_year", record.first_partnered_year)]);
        for (field, year) in years {
            if let Some(year) = year {
                if !(1000..=9999).contains(&year) {
                    violations.push(format!("{field}: {year} is not a four-digit year"));
                }
            }
        }

        ValidationResult::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Milestones, SourceUrls, Stage, TeamMember};
    use std::collections::{BTreeMap, BTreeSet};

    fn record(registry: &IdRegistry) -> CompanyRecord {
        let category = registry.register(IdKind::Category, "Fintech").unwrap();
        let partner = registry.register(IdKind::Partner, "Jane Roe").unwrap();
        CompanyRecord {
            id: "source:acme-inc".into(),
            source_id: None,
            name: "Acme Inc".into(),
            slug: "acme-inc".into(),
            description: None,
            website: None,
            socials: BTreeMap::new(),
            categories: BTreeSet::from([category]),
            current_stage: Stage::Growth,
            first_partnered_year: Some(2015),
            partners: vec![partner.clone()],
            primary_partner: Some(partner),
            milestones: Milestones::default(),
            team: vec![TeamMember {
                name: "Wile".into(),
                role: None,
            }],
            why_partnered: None,
            source_urls: SourceUrls::default(),
        }
    }

    #[test]
    fn test_valid_record() {
        let registry = IdRegistry::new();
        let validator = SchemaValidator::new("source", &registry);
        let result = validator.validate(&record(&registry));
        assert!(result.ok, "{:?}", result.violations);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_collects_every_violation() {
        let registry = IdRegistry::new();
        let validator = SchemaValidator::new("source", &registry);
        let mut bad = record(&registry);
        bad.id = "other:acme-inc".into();
        bad.categories.insert("unregistered".into());
        bad.team.push(TeamMember {
            name: "".into(),
            role: Some("CTO".into()),
        });
        bad.milestones.founded_year = Some(99);
        bad.primary_partner = Some("someone-else".into());

        let result = validator.validate(&bad);
        assert!(!result.ok);
        assert_eq!(result.violations.len(), 5, "{:?}", result.violations);
        assert!(result.violations.iter().any(|v| v.starts_with("id:")));
        assert!(result.violations.iter().any(|v| v.starts_with("categories:")));
        assert!(result.violations.iter().any(|v| v.starts_with("team[1].name")));
        assert!(
            result
                .violations
                .iter()
                .any(|v| v.starts_with("milestones.founded_year"))
        );
    }

    #[test]
    fn test_slug_rules() {
        let registry = IdRegistry::new();
        let validator = SchemaValidator::new("source", &registry);

        let mut bad = record(&registry);
        bad.slug = "Acme_Inc".into();
        bad.id = "source:Acme_Inc".into();
        assert!(!validator.validate(&bad).ok);

        let mut reserved = record(&registry);
        reserved.slug = "all".into();
        reserved.id = "source:all".into();
        let result = validator.validate(&reserved);
        assert_eq!(result.violations, vec![r#"slug: "all" is reserved"#]);

        let mut empty = record(&registry);
        empty.name = " ".into();
        empty.slug = String::new();
        empty.id = String::new();
        assert_eq!(validator.validate(&empty).violations.len(), 3);
    }
}
