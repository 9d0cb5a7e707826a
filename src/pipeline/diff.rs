//! Change summary between the last good build and the staged one.
//!
//! Reported in the run report; it never gates publication by itself.

use std::collections::BTreeMap;

use crate::models::{BuildDiff, CompanyRecord};

/// Calculator for computing diffs between record sets.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator {
    /// Whether to detect updates (content changes for the same id)
    detect_updates: bool,
}

impl DiffCalculator {
    pub fn new() -> Self {
        Self {
            detect_updates: true,
        }
    }

    /// A calculator that only reports additions and removals.
    pub fn additions_only() -> Self {
        Self {
            detect_updates: false,
        }
    }

    /// Ids added, updated and removed, each sorted.
    pub fn calculate(&self, previous: &[CompanyRecord], current: &[CompanyRecord]) -> BuildDiff {
        let prev: BTreeMap<&str, &CompanyRecord> =
            previous.iter().map(|r| (r.id.as_str(), r)).collect();
        let curr: BTreeMap<&str, &CompanyRecord> =
            current.iter().map(|r| (r.id.as_str(), r)).collect();

        let added = curr
            .keys()
            .filter(|id| !prev.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        let removed = prev
            .keys()
            .filter(|id| !curr.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        let updated = if self.detect_updates {
            curr.iter()
                .filter(|(id, record)| prev.get(*id).is_some_and(|old| old != *record))
                .map(|(id, _)| id.to_string())
                .collect()
        } else {
            Vec::new()
        };

        BuildDiff {
            added,
            updated,
            removed,
        }
    }
}

/// Convenience function to calculate a diff.
pub fn calculate_diff(previous: &[CompanyRecord], current: &[CompanyRecord]) -> BuildDiff {
    DiffCalculator::new().calculate(previous, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Milestones, SourceUrls, Stage};

    fn make_record(slug: &str, name: &str) -> CompanyRecord {
        CompanyRecord {
            id: format!("source:{slug}"),
            source_id: None,
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            website: None,
            socials: Default::default(),
            categories: Default::default(),
            current_stage: Stage::Unknown,
            first_partnered_year: None,
            partners: Vec::new(),
            primary_partner: None,
            milestones: Milestones::default(),
            team: Vec::new(),
            why_partnered: None,
            source_urls: SourceUrls::default(),
        }
    }

    #[test]
    fn test_no_changes() {
        let prev = vec![make_record("a", "A"), make_record("b", "B")];
        let diff = calculate_diff(&prev, &prev.clone());
        assert!(!diff.has_changes());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_mixed_changes() {
        let prev = vec![
            make_record("keep", "Keep"),
            make_record("update", "Update Me"),
            make_record("remove", "Remove Me"),
        ];
        let curr = vec![
            make_record("new", "New"),
            make_record("keep", "Keep"),
            make_record("update", "Updated"),
        ];

        let diff = calculate_diff(&prev, &curr);
        assert_eq!(diff.added, vec!["source:new"]);
        assert_eq!(diff.updated, vec!["source:update"]);
        assert_eq!(diff.removed, vec!["source:remove"]);
        assert_eq!(diff.change_count(), 3);
    }

    #[test]
    fn test_additions_only_ignores_updates() {
        let prev = vec![make_record("a", "Old")];
        let curr = vec![make_record("a", "New"), make_record("b", "B")];

        let diff = DiffCalculator::additions_only().calculate(&prev, &curr);
        assert_eq!(diff.added, vec!["source:b"]);
        assert!(diff.updated.is_empty());
    }

    #[test]
    fn test_empty_to_full_and_back() {
        let full = vec![make_record("z", "Z"), make_record("a", "A")];
        let diff = calculate_diff(&[], &full);
        assert_eq!(diff.added, vec!["source:a", "source:z"]);

        let diff = calculate_diff(&full, &[]);
        assert_eq!(diff.removed, vec!["source:a", "source:z"]);
    }
}
