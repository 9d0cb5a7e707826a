//! Run-scoped reporting: extraction completeness and the run report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FetchRecord;

/// Attempt/success tally for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTally {
    pub attempted: usize,
    pub succeeded: usize,
}

impl FieldTally {
    pub fn percent(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.attempted as f64 * 1000.0).round() / 10.0
    }
}

/// Field name to tally. Sorted so serialized reports are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionReport {
    fields: BTreeMap<String, FieldTally>,
}

impl ExtractionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one extraction attempt for `field`.
    pub fn record(&mut self, field: &str, succeeded: bool) {
        let tally = self.fields.entry(field.to_string()).or_default();
        tally.attempted += 1;
        if succeeded {
            tally.succeeded += 1;
        }
    }

    /// Fold another report (typically one entity's delta) into this one.
    pub fn merge(&mut self, other: &ExtractionReport) {
        for (field, tally) in &other.fields {
            let entry = self.fields.entry(field.clone()).or_default();
            entry.attempted += tally.attempted;
            entry.succeeded += tally.succeeded;
        }
    }

    pub fn get(&self, field: &str) -> Option<FieldTally> {
        self.fields.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldTally)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Completeness percentages, keyed by field.
    pub fn completeness(&self) -> BTreeMap<String, FieldCompleteness> {
        self.fields
            .iter()
            .map(|(field, tally)| {
                (
                    field.clone(),
                    FieldCompleteness {
                        attempted: tally.attempted,
                        succeeded: tally.succeeded,
                        percent: tally.percent(),
                    },
                )
            })
            .collect()
    }

    /// Log one line per field with a 20-column bar.
    pub fn log_summary(&self) {
        log::info!("Extraction completeness:");
        for (field, tally) in self.iter() {
            let filled = ((tally.percent() / 5.0) as usize).min(20);
            log::info!(
                "  {:<16} {:>4}/{:<4} ({:>5.1}%) [{}{}]",
                field,
                tally.succeeded,
                tally.attempted,
                tally.percent(),
                "#".repeat(filled),
                ".".repeat(20 - filled)
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompleteness {
    pub attempted: usize,
    pub succeeded: usize,
    pub percent: f64,
}

/// Something left out of the published set, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    /// Profile URL of the entity
    pub subject: String,
    pub reasons: Vec<String>,
}

/// Id-level changes versus the last good build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiff {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl BuildDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Persisted summary of one build run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub directory_pages: usize,
    pub directory_entries: usize,
    pub directory_rows_dropped: usize,
    pub profiles_attempted: usize,
    pub reparsed: usize,
    pub reused_from_cache: usize,
    pub fetch_failures: Vec<Exclusion>,
    pub normalization_failures: Vec<Exclusion>,
    pub excluded: Vec<Exclusion>,
    pub published_count: usize,
    pub completeness: BTreeMap<String, FieldCompleteness>,
    pub fetches: Vec<FetchRecord>,
    pub diff: Option<BuildDiff>,
    pub published: bool,
    pub unchanged: bool,
    pub abort_reasons: Vec<String>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            directory_pages: 0,
            directory_entries: 0,
            directory_rows_dropped: 0,
            profiles_attempted: 0,
            reparsed: 0,
            reused_from_cache: 0,
            fetch_failures: Vec::new(),
            normalization_failures: Vec::new(),
            excluded: Vec::new(),
            published_count: 0,
            completeness: BTreeMap::new(),
            fetches: Vec::new(),
            diff: None,
            published: false,
            unchanged: false,
            abort_reasons: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
