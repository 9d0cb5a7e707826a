//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP politeness and retry behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Where the directory and profile pages live
    #[serde(default)]
    pub source: SourceConfig,

    /// Directory listing table layout
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Fail-safe publish thresholds
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Output document settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Persisted state locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if !(self.crawler.requests_per_second > 0.0) {
            return Err(AppError::validation(
                "crawler.requests_per_second must be > 0",
            ));
        }
        if self.crawler.max_attempts == 0 {
            return Err(AppError::validation("crawler.max_attempts must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.backoff_max_ms < self.crawler.backoff_base_ms {
            return Err(AppError::validation(
                "crawler.backoff_max_ms must be >= crawler.backoff_base_ms",
            ));
        }
        Url::parse(&self.source.base_url)
            .map_err(|e| AppError::validation(format!("source.base_url: {e}")))?;
        if self.source.id_prefix.trim().is_empty() {
            return Err(AppError::validation("source.id_prefix is empty"));
        }
        for (name, value) in [
            ("safety.max_exclusion_percent", self.safety.max_exclusion_percent),
            (
                "safety.max_fetch_failure_percent",
                self.safety.max_fetch_failure_percent,
            ),
            ("safety.max_drop_percent", self.safety.max_drop_percent),
        ] {
            if value > 100 {
                return Err(AppError::validation(format!("{name} must be <= 100")));
            }
        }
        Ok(())
    }
}

/// HTTP client and politeness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Aggregate request rate shared by all workers
    #[serde(default = "defaults::requests_per_second")]
    pub requests_per_second: f64,

    /// Upper bound of the random delay spent before each rate-limiter permit
    #[serde(default = "defaults::jitter_ms")]
    pub jitter_ms: u64,

    /// Attempts per URL, first try included
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on every further attempt
    #[serde(default = "defaults::backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling for a single retry delay
    #[serde(default = "defaults::backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Profile pages fetched concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Consult robots.txt before crawling
    #[serde(default = "defaults::respect_robots")]
    pub respect_robots: bool,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            requests_per_second: defaults::requests_per_second(),
            jitter_ms: defaults::jitter_ms(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base_ms(),
            backoff_max_ms: defaults::backoff_max_ms(),
            max_concurrent: defaults::max_concurrent(),
            respect_robots: defaults::respect_robots(),
        }
    }
}

/// Source site layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Scheme and host of the source site
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Path of the first directory page
    #[serde(default = "defaults::directory_path")]
    pub directory_path: String,

    /// Path prefix that marks a profile link
    #[serde(default = "defaults::profile_path_prefix")]
    pub profile_path_prefix: String,

    /// Namespace of record ids (`{id_prefix}:{slug}`)
    #[serde(default = "defaults::id_prefix")]
    pub id_prefix: String,

    /// Query parameter carrying the directory page number
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    /// Hard stop for directory pagination
    #[serde(default = "defaults::max_directory_pages")]
    pub max_directory_pages: u32,

    /// Process at most this many entities (0 = all)
    #[serde(default)]
    pub limit: usize,
}

impl SourceConfig {
    /// Absolute URL of the first directory page.
    pub fn directory_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?.join(&self.directory_path)?)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            directory_path: defaults::directory_path(),
            profile_path_prefix: defaults::profile_path_prefix(),
            id_prefix: defaults::id_prefix(),
            page_param: defaults::page_param(),
            max_directory_pages: defaults::max_directory_pages(),
            limit: 0,
        }
    }
}

/// Directory listing table layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "defaults::container_selector")]
    pub container_selector: String,

    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// Rows carrying this class are expansion rows, not entities
    #[serde(default = "defaults::skip_row_class")]
    pub skip_row_class: String,

    #[serde(default)]
    pub id_column: usize,

    #[serde(default = "defaults::name_column")]
    pub name_column: usize,

    #[serde(default = "defaults::category_column")]
    pub category_column: usize,

    #[serde(default = "defaults::stage_column")]
    pub stage_column: usize,

    #[serde(default = "defaults::partners_column")]
    pub partners_column: usize,

    #[serde(default = "defaults::first_partnered_column")]
    pub first_partnered_column: usize,
}

impl DirectoryConfig {
    /// Minimum cell count for a row to be an entity row.
    pub fn required_cells(&self) -> usize {
        [
            self.id_column,
            self.name_column,
            self.category_column,
            self.stage_column,
            self.partners_column,
            self.first_partnered_column,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            container_selector: defaults::container_selector(),
            row_selector: defaults::row_selector(),
            skip_row_class: defaults::skip_row_class(),
            id_column: 0,
            name_column: defaults::name_column(),
            category_column: defaults::category_column(),
            stage_column: defaults::stage_column(),
            partners_column: defaults::partners_column(),
            first_partnered_column: defaults::first_partnered_column(),
        }
    }
}

/// Fail-safe publish thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Abort when more than this share of normalized records fail validation
    #[serde(default = "defaults::max_exclusion_percent")]
    pub max_exclusion_percent: u8,

    /// Abort when more than this share of profile fetches fail
    #[serde(default = "defaults::max_fetch_failure_percent")]
    pub max_fetch_failure_percent: u8,

    /// Abort when the published count drops by more than this versus last good
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Below this many previous records the drop check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,

    /// Allow an empty build when the last good build was empty too
    #[serde(default = "defaults::allow_cold_start")]
    pub allow_cold_start: bool,

    /// Absolute floor on published companies, catches partial crawls with
    /// no usable baseline. 0 disables it.
    #[serde(default = "defaults::min_companies")]
    pub min_companies: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_exclusion_percent: defaults::max_exclusion_percent(),
            max_fetch_failure_percent: defaults::max_fetch_failure_percent(),
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
            allow_cold_start: defaults::allow_cold_start(),
            min_companies: defaults::min_companies(),
        }
    }
}

/// Output document settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "defaults::schema_version")]
    pub schema_version: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            schema_version: defaults::schema_version(),
        }
    }
}

/// Persisted state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Published tree served by the static host
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Change-detection cache
    #[serde(default = "defaults::cache_file")]
    pub cache_file: PathBuf,

    /// Last run report
    #[serde(default = "defaults::report_file")]
    pub report_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: defaults::output_dir(),
            cache_file: defaults::cache_file(),
            report_file: defaults::report_file(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "portfolio-crawler/0.1 (+https://github.com/portfolio-crawler)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn requests_per_second() -> f64 {
        1.0
    }
    pub fn jitter_ms() -> u64 {
        250
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base_ms() -> u64 {
        1_000
    }
    pub fn backoff_max_ms() -> u64 {
        30_000
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn respect_robots() -> bool {
        true
    }

    // Source defaults
    pub fn base_url() -> String {
        "https://sequoiacap.com".into()
    }
    pub fn directory_path() -> String {
        "/our-companies/".into()
    }
    pub fn profile_path_prefix() -> String {
        "/companies/".into()
    }
    pub fn id_prefix() -> String {
        "source".into()
    }
    pub fn page_param() -> String {
        "_paged".into()
    }
    pub fn max_directory_pages() -> u32 {
        50
    }

    // Directory layout defaults
    pub fn container_selector() -> String {
        ".facetwp-template".into()
    }
    pub fn row_selector() -> String {
        "tr".into()
    }
    pub fn skip_row_class() -> String {
        "child".into()
    }
    pub fn name_column() -> usize {
        1
    }
    pub fn category_column() -> usize {
        2
    }
    pub fn stage_column() -> usize {
        3
    }
    pub fn partners_column() -> usize {
        4
    }
    pub fn first_partnered_column() -> usize {
        5
    }

    // Safety defaults
    pub fn max_exclusion_percent() -> u8 {
        10
    }
    pub fn max_fetch_failure_percent() -> u8 {
        20
    }
    pub fn max_drop_percent() -> u8 {
        20
    }
    pub fn min_baseline() -> usize {
        10
    }
    pub fn allow_cold_start() -> bool {
        true
    }
    pub fn min_companies() -> usize {
        100
    }

    pub fn schema_version() -> String {
        "1.0.0".into()
    }

    // Path defaults
    pub fn output_dir() -> PathBuf {
        PathBuf::from("docs")
    }
    pub fn cache_file() -> PathBuf {
        PathBuf::from(".cache/content.json")
    }
    pub fn report_file() -> PathBuf {
        PathBuf::from(".cache/run-report.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_rate() {
        let mut config = Config::default();
        config.crawler.requests_per_second = 0.0;
        assert!(config.validate().is_err());
        config.crawler.requests_per_second = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_percent_over_100() {
        let mut config = Config::default();
        config.safety.max_drop_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            requests_per_second = 2.5

            [safety]
            max_drop_percent = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.requests_per_second, 2.5);
        assert_eq!(config.crawler.max_attempts, 3);
        assert_eq!(config.safety.max_drop_percent, 5);
        assert_eq!(config.safety.max_exclusion_percent, 10);
        assert_eq!(config.safety.min_companies, 100);
        assert_eq!(config.source.page_param, "_paged");
        assert_eq!(config.paths.output_dir, PathBuf::from("docs"));
    }

    #[test]
    fn sample_config_parses_and_validates() {
        let config: Config = toml::from_str(include_str!("../../crawler.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.id_prefix, "source");
        assert_eq!(config.directory.first_partnered_column, 5);
    }

    #[test]
    fn directory_url_joins_path() {
        let source = SourceConfig::default();
        assert_eq!(
            source.directory_url().unwrap().as_str(),
            "https://sequoiacap.com/our-companies/"
        );
    }

    #[test]
    fn required_cells_covers_highest_column() {
        assert_eq!(DirectoryConfig::default().required_cells(), 6);
    }
}
