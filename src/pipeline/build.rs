// src/pipeline/build.rs

//! The crawl-and-build run.
//!
//! Directory → profiles (bounded worker pool, cache-gated parsing) →
//! normalize → validate → index → publish. Everything after the directory
//! stage degrades per entity; only the directory fetch and the aggregate
//! publish guards can stop a run.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use url::Url;

use crate::error::{AppError, FetchError, Result};
use crate::models::{
    CompanyRecord, Config, DirectoryEntry, Exclusion, ExtractionReport, ProfileFields, RunReport,
};
use crate::services::{
    CachedParse, ChangeDetectionCache, DirectoryParser, IdRegistry, Normalizer, ProfileParser,
    RateLimitedFetcher, SchemaValidator, Transport,
};
use crate::storage::{OutputTree, PublishChecks, PublishOutcome, Publisher, tree::to_json_bytes};
use crate::utils::{RobotsTxt, url as url_utils};

use super::circuit_breaker::CircuitBreaker;
use super::diff::calculate_diff;
use super::index::{IndexBuilder, ManifestInfo};

/// Per-run switches that do not belong in the config file.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Bypass the count-drop guard only
    pub force: bool,
    /// Process at most this many directory entries (overrides `source.limit`)
    pub limit: Option<usize>,
}

/// What a run produced once it got past the directory stage.
#[derive(Debug)]
pub struct BuildOutcome {
    pub report: RunReport,
    pub publish: Result<PublishOutcome>,
}

impl BuildOutcome {
    /// The report on success, the publish error otherwise.
    pub fn into_result(self) -> Result<RunReport> {
        self.publish.map(|_| self.report)
    }
}

enum ProfileOutcome {
    Parsed {
        entry: DirectoryEntry,
        fields: ProfileFields,
        report: ExtractionReport,
        reused: bool,
    },
    Failed {
        entry: DirectoryEntry,
        error: FetchError,
    },
}

async fn load_robots(fetcher: &RateLimitedFetcher, base: &Url) -> RobotsTxt {
    let Ok(url) = base.join("/robots.txt") else {
        return RobotsTxt::allow_all();
    };
    match fetcher.fetch(url.as_str()).await {
        Ok(page) => RobotsTxt::parse(&page.text()),
        Err(e) => {
            log::info!("No usable robots.txt ({}); assuming allow-all", e);
            RobotsTxt::allow_all()
        }
    }
}

fn robots_allow(robots: &RobotsTxt, user_agent: &str, url: &str) -> bool {
    url_utils::path_and_query(url).is_none_or(|path| robots.is_allowed(user_agent, &path))
}

/// Fetch one profile; parse it unless the cache holds a parse of this body.
async fn process_profile(
    entry: DirectoryEntry,
    fetcher: &RateLimitedFetcher,
    cache: &ChangeDetectionCache,
    parser: &ProfileParser,
    robots: &RobotsTxt,
    user_agent: &str,
) -> ProfileOutcome {
    let url = entry.profile_url.clone();
    if !robots_allow(robots, user_agent, &url) {
        return ProfileOutcome::Failed {
            entry,
            error: FetchError::RobotsDisallowed { url },
        };
    }

    let page = match fetcher.fetch(&url).await {
        Ok(page) => page,
        Err(error) => return ProfileOutcome::Failed { entry, error },
    };

    if !cache.should_reparse(&url, &page.content_hash) {
        if let Some(CachedParse::Profile { fields, report }) =
            cache.cached(&url, &page.content_hash)
        {
            log::debug!("Unchanged: {}", url);
            return ProfileOutcome::Parsed {
                entry,
                fields,
                report,
                reused: true,
            };
        }
    }

    let (fields, report) = parser.parse(&page.text(), &url);
    cache.store(
        &url,
        &page.content_hash,
        CachedParse::Profile {
            fields: fields.clone(),
            report: report.clone(),
        },
    );
    ProfileOutcome::Parsed {
        entry,
        fields,
        report,
        reused: false,
    }
}

/// Run the whole pipeline once.
///
/// Returns `Err` only for failures before anything could be built: bad
/// configuration, a robots.txt ban on the directory, or an unreachable
/// directory. Everything later is reported through [`BuildOutcome`].
pub async fn run_build(
    config: &Config,
    transport: Arc<dyn Transport>,
    cache: &ChangeDetectionCache,
    publisher: &dyn Publisher,
    options: &BuildOptions,
) -> Result<BuildOutcome> {
    let mut report = RunReport::start();
    let user_agent = config.crawler.user_agent.as_str();
    let directory_url = config.source.directory_url()?;

    let mut fetcher = RateLimitedFetcher::new(transport, &config.crawler)?;

    // Step 1: robots.txt
    let robots = if config.crawler.respect_robots {
        let robots = load_robots(&fetcher, &directory_url).await;
        if !robots_allow(&robots, user_agent, directory_url.as_str()) {
            log::error!("robots.txt disallows {}", directory_url);
            return Err(AppError::directory(
                directory_url.as_str(),
                FetchError::RobotsDisallowed {
                    url: directory_url.to_string(),
                },
            ));
        }
        if let Some(delay) = robots.crawl_delay(user_agent) {
            fetcher.slow_to(delay, config.crawler.requests_per_second)?;
        }
        robots
    } else {
        RobotsTxt::allow_all()
    };

    // Step 2: directory
    let directory = DirectoryParser::new(&config.directory, &config.source)?;
    let crawl = directory.crawl(&fetcher, cache, &directory_url).await?;
    report.directory_pages = crawl.pages;
    report.directory_entries = crawl.entries.len();
    report.directory_rows_dropped = crawl.dropped;
    report.reparsed += crawl.reparsed;
    report.reused_from_cache += crawl.reused;

    let mut entries = crawl.entries;
    let limit = options
        .limit
        .or((config.source.limit > 0).then_some(config.source.limit));
    if let Some(limit) = limit {
        if entries.len() > limit {
            log::info!("Limiting run to {} of {} entries", limit, entries.len());
            entries.truncate(limit);
        }
    }
    log::info!(
        "Directory: {} entries on {} page(s), {} row(s) dropped",
        entries.len(),
        crawl.pages,
        crawl.dropped
    );

    // Step 3: profiles, bounded worker pool sharing one rate limiter
    let parser = ProfileParser::new(&config.source)?;
    report.profiles_attempted = entries.len();
    let outcomes: Vec<ProfileOutcome> = {
        let fetcher = &fetcher;
        let parser = &parser;
        let robots = &robots;
        stream::iter(entries)
            .map(|entry| async move {
                process_profile(entry, fetcher, cache, parser, robots, user_agent).await
            })
            .buffer_unordered(config.crawler.max_concurrent.max(1))
            .collect()
            .await
    };
    let pruned = cache.prune_unseen();
    if pruned > 0 {
        log::info!("Dropped {} cache entries for pages no longer listed", pruned);
    }

    // Step 4: single-writer aggregation
    let registry = IdRegistry::new();
    let normalizer = Normalizer::new(config.source.id_prefix.as_str(), &registry);
    let validator = SchemaValidator::new(config.source.id_prefix.as_str(), &registry);
    let mut completeness = ExtractionReport::new();
    let mut candidates = 0usize;
    let mut valid: Vec<CompanyRecord> = Vec::new();

    for outcome in outcomes {
        match outcome {
            ProfileOutcome::Failed { entry, error } => {
                log::warn!("Skipping '{}': {}", entry.name, error);
                report.fetch_failures.push(Exclusion {
                    subject: entry.profile_url,
                    reasons: vec![error.to_string()],
                });
            }
            ProfileOutcome::Parsed {
                entry,
                fields,
                report: delta,
                reused,
            } => {
                candidates += 1;
                if reused {
                    report.reused_from_cache += 1;
                } else {
                    report.reparsed += 1;
                }
                completeness.merge(&delta);

                let record = match normalizer.normalize(&entry, &fields) {
                    Ok(record) => record,
                    Err(e) => {
                        log::warn!("Excluding {}: {}", entry.profile_url, e);
                        report.normalization_failures.push(Exclusion {
                            subject: entry.profile_url,
                            reasons: vec![e.to_string()],
                        });
                        continue;
                    }
                };

                let result = validator.validate(&record);
                if result.ok {
                    valid.push(record);
                } else {
                    for violation in &result.violations {
                        log::warn!("Invalid {}: {}", record.id, violation);
                    }
                    report.excluded.push(Exclusion {
                        subject: record.source_urls.profile,
                        reasons: result.violations,
                    });
                }
            }
        }
    }

    // Worker completion order must not leak into the output.
    valid.sort_by(|a, b| {
        (a.id.as_str(), a.source_urls.profile.as_str())
            .cmp(&(b.id.as_str(), b.source_urls.profile.as_str()))
    });
    report
        .fetch_failures
        .sort_by(|a, b| a.subject.cmp(&b.subject));
    report
        .normalization_failures
        .sort_by(|a, b| a.subject.cmp(&b.subject));

    let mut builder = IndexBuilder::new(&registry);
    for record in valid {
        let (id, profile) = (record.id.clone(), record.source_urls.profile.clone());
        if !builder.add_record(record) {
            log::warn!("Excluding {}: duplicate id {}", profile, id);
            report.excluded.push(Exclusion {
                subject: profile,
                reasons: vec![format!("id: duplicate {id}")],
            });
        }
    }
    report.excluded.sort_by(|a, b| a.subject.cmp(&b.subject));

    completeness.log_summary();
    report.completeness = completeness.completeness();

    // Step 5: aggregate guards
    let breaker = CircuitBreaker::new(&config.safety);
    let excluded = report.normalization_failures.len() + report.excluded.len();
    let blocking: Vec<String> = [
        breaker.fetch_failure_guard(report.fetch_failures.len(), report.profiles_attempted),
        breaker.exclusion_guard(excluded, candidates),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Step 6: index and publish
    let index = builder.build(&ManifestInfo {
        generated_at: Utc::now(),
        schema_version: config.build.schema_version.clone(),
        source_entry_url: directory_url.to_string(),
    });
    report.fetches = fetcher.records();

    let publish = async {
        let tree = OutputTree::render(&index)?;
        let last_good = publisher.load_last_good().await?;
        let diff = calculate_diff(
            last_good.as_ref().map_or(&[][..], |lg| lg.companies.as_slice()),
            &index.companies,
        );
        log::info!(
            "Diff vs last good: {} added, {} updated, {} removed",
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
        report.diff = Some(diff);

        let checks = PublishChecks {
            blocking,
            force: options.force,
        };
        publisher.publish(&tree, last_good.as_ref(), &checks).await
    }
    .await;

    match &publish {
        Ok(outcome) => {
            report.published = true;
            report.unchanged = *outcome == PublishOutcome::Unchanged;
            report.published_count = index.manifest.total_companies;
        }
        Err(AppError::PublishAborted(abort)) => {
            report.abort_reasons = abort.reasons.clone();
        }
        Err(e) => {
            report.abort_reasons = vec![e.to_string()];
        }
    }
    report.finish();

    log::info!(
        "Run finished: {} published, {} fetch failure(s), {} excluded, {} re-parsed, {} reused",
        report.published_count,
        report.fetch_failures.len(),
        excluded,
        report.reparsed,
        report.reused_from_cache
    );

    Ok(BuildOutcome { report, publish })
}

/// Persist the run report as pretty JSON.
pub async fn save_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, to_json_bytes(report)?).await?;
    Ok(())
}
