//! Local filesystem publisher.
//!
//! ## Layout during a publish
//!
//! ```text
//! {output}/            # last good build, served as-is
//! {output}.staging/    # new tree, written and verified here first
//! {output}.previous/   # last good build while the swap is in flight
//! ```
//!
//! The published directory is only ever replaced by a rename of a staged,
//! verified tree. Any failed check leaves it untouched.
//!
//! A `{output}.previous` with no `{output}` beside it means a swap died
//! between its two renames; it is renamed back before anything else runs.
//! A `.previous` next to a live `{output}` blocks publishing until removed
//! by hand, since only a swap in progress may delete it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, PublishAbort, Result};
use crate::models::{BuildManifest, CompanyRecord};
use crate::pipeline::CircuitBreaker;
use crate::storage::tree::{self, ALL_COMPANIES_FILE, META_FILE, OutputTree};
use crate::storage::{LastGood, PublishChecks, PublishOutcome, Publisher};

/// Publishes to a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    output_dir: PathBuf,
    circuit_breaker: CircuitBreaker,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// What is currently published, as far as the baseline is concerned.
enum Published {
    Nothing,
    Manifest(BuildManifest),
    Unreadable(String),
}

async fn has_entries(dir: &Path) -> Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::Io(e)),
    }
}

impl LocalPublisher {
    pub fn new(output_dir: impl Into<PathBuf>, circuit_breaker: CircuitBreaker) -> Self {
        Self {
            output_dir: output_dir.into(),
            circuit_breaker,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn staging_dir(&self) -> PathBuf {
        sibling(&self.output_dir, ".staging")
    }

    fn previous_dir(&self) -> PathBuf {
        sibling(&self.output_dir, ".previous")
    }

    /// Write `tree` into a fresh staging directory.
    async fn stage(&self, tree: &OutputTree) -> Result<PathBuf> {
        let staging = self.staging_dir();
        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;
        tree.write_to(&staging).await?;
        log::info!("Staged {} files in {:?}", tree.len(), staging);
        Ok(staging)
    }

    /// Replace the output directory with `staging`, restoring the old tree if
    /// the second rename fails.
    async fn swap(&self, staging: &Path) -> Result<()> {
        let previous = self.previous_dir();
        let had_output = tokio::fs::try_exists(&self.output_dir).await?;
        if had_output {
            tokio::fs::rename(&self.output_dir, &previous).await?;
        } else if let Some(parent) = self.output_dir.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if let Err(e) = tokio::fs::rename(staging, &self.output_dir).await {
            log::error!("Swap failed ({}), restoring previous build", e);
            if had_output {
                tokio::fs::rename(&previous, &self.output_dir).await?;
            }
            return Err(AppError::Io(e));
        }

        if had_output {
            remove_dir_if_exists(&previous).await?;
        }
        Ok(())
    }

    /// Rename a stranded `.previous` back into place.
    async fn recover_interrupted_swap(&self) -> Result<()> {
        let previous = self.previous_dir();
        if !tokio::fs::try_exists(&previous).await?
            || tokio::fs::try_exists(&self.output_dir).await?
        {
            return Ok(());
        }
        log::warn!(
            "Restoring last good build from {:?} (interrupted publish)",
            previous
        );
        tokio::fs::rename(&previous, &self.output_dir).await?;
        Ok(())
    }

    async fn published(&self) -> Result<Published> {
        if !has_entries(&self.output_dir).await? {
            return Ok(Published::Nothing);
        }
        match self.read_json::<BuildManifest>(META_FILE).await {
            Ok(Some(manifest)) => Ok(Published::Manifest(manifest)),
            Ok(None) => Ok(Published::Unreadable(format!("{META_FILE} is missing"))),
            Err(AppError::Json(e)) => Ok(Published::Unreadable(format!("{META_FILE}: {e}"))),
            Err(e) => Err(e),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, relative: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.output_dir.join(relative)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn load_last_good(&self) -> Result<Option<LastGood>> {
        self.recover_interrupted_swap().await?;

        let manifest = match self.published().await? {
            Published::Manifest(manifest) => manifest,
            Published::Nothing => {
                log::info!("No published build in {:?}", self.output_dir);
                return Ok(None);
            }
            Published::Unreadable(problem) => {
                // publish() refuses to replace this tree, so a missing
                // baseline here only affects the diff.
                log::warn!(
                    "Unreadable published build in {:?}: {}",
                    self.output_dir,
                    problem
                );
                return Ok(None);
            }
        };
        let companies = match self
            .read_json::<Vec<CompanyRecord>>(ALL_COMPANIES_FILE)
            .await
        {
            Ok(companies) => companies.unwrap_or_default(),
            Err(AppError::Json(e)) => {
                log::warn!("Unreadable {} in {:?}: {}", ALL_COMPANIES_FILE, self.output_dir, e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Some(LastGood {
            manifest,
            companies,
        }))
    }

    async fn publish(
        &self,
        tree: &OutputTree,
        last_good: Option<&LastGood>,
        checks: &PublishChecks,
    ) -> Result<PublishOutcome> {
        self.recover_interrupted_swap().await?;
        let mut reasons = checks.blocking.clone();

        let previous = self.previous_dir();
        if tokio::fs::try_exists(&previous).await? {
            reasons.push(format!(
                "{previous:?} is left over from an interrupted publish; \
                 check {:?} and remove it",
                self.output_dir
            ));
        }

        // The tree on disk is the baseline even if the caller passed none.
        let on_disk = match self.published().await? {
            Published::Manifest(manifest) => manifest.total_companies,
            Published::Nothing => 0,
            Published::Unreadable(problem) => {
                reasons.push(format!(
                    "published tree in {:?} is unreadable ({problem}); \
                     refusing to treat it as a first run",
                    self.output_dir
                ));
                0
            }
        };
        let previous_count = last_good
            .map_or(on_disk, |lg| lg.manifest.total_companies)
            .max(on_disk);
        if checks.force {
            log::warn!("Count-drop guard bypassed (--force)");
        } else if let Some(reason) = self
            .circuit_breaker
            .drop_guard(tree.manifest().total_companies, previous_count)
        {
            reasons.push(reason);
        }

        let staging = self.stage(tree).await?;
        let problems =
            tree::verify_tree(&staging, self.circuit_breaker.min_companies()).await?;
        reasons.extend(problems.into_iter().map(|p| format!("staged tree: {p}")));

        if !reasons.is_empty() {
            for reason in &reasons {
                log::error!("Publish blocked: {}", reason);
            }
            log::error!(
                "Published tree in {:?} left untouched; rejected build kept in {:?}",
                self.output_dir,
                staging
            );
            return Err(PublishAbort::new(reasons).into());
        }

        let published = tree::read_tree(&self.output_dir).await?;
        if tree.matches_published(&published)? {
            log::info!("Output unchanged; keeping published tree as-is");
            remove_dir_if_exists(&staging).await?;
            return Ok(PublishOutcome::Unchanged);
        }

        self.swap(&staging).await?;
        log::info!(
            "Published {} companies ({} files) to {:?}",
            tree.manifest().total_companies,
            tree.len(),
            self.output_dir
        );
        Ok(PublishOutcome::Published { files: tree.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SafetyConfig, Stage};
    use crate::pipeline::build_index;
    use crate::pipeline::index::tests::{info, sample_record};
    use crate::services::IdRegistry;
    use tempfile::TempDir;

    fn tree_of(count: usize) -> OutputTree {
        let registry = IdRegistry::new();
        let records = (0..count).map(|i| {
            sample_record(
                &registry,
                &format!("company-{i}"),
                Stage::Growth,
                &["AI"],
                &["Jane Roe"],
                Some(2020),
            )
        });
        OutputTree::render(&build_index(records, &registry, &info())).unwrap()
    }

    fn publisher(tmp: &TempDir) -> LocalPublisher {
        LocalPublisher::new(
            tmp.path().join("docs"),
            CircuitBreaker::new(&SafetyConfig {
                min_companies: 0,
                ..SafetyConfig::default()
            }),
        )
    }

    fn abort_reasons(err: AppError) -> Vec<String> {
        match err {
            AppError::PublishAborted(abort) => abort.reasons,
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_publish_and_reload() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        assert!(publisher.load_last_good().await.unwrap().is_none());

        let tree = tree_of(3);
        let outcome = publisher
            .publish(&tree, None, &PublishChecks::default())
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Published { files: tree.len() });
        assert!(!publisher.staging_dir().exists());

        let last_good = publisher.load_last_good().await.unwrap().unwrap();
        assert_eq!(last_good.manifest.total_companies, 3);
        assert_eq!(last_good.companies.len(), 3);
    }

    #[tokio::test]
    async fn test_identical_rebuild_is_noop() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        let tree = tree_of(2);
        publisher
            .publish(&tree, None, &PublishChecks::default())
            .await
            .unwrap();
        let before = tree::read_tree(publisher.output_dir()).await.unwrap();

        let rebuilt = tree.with_timestamp("2031-01-01T00:00:00Z").unwrap();
        let last_good = publisher.load_last_good().await.unwrap();
        let outcome = publisher
            .publish(&rebuilt, last_good.as_ref(), &PublishChecks::default())
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Unchanged);
        assert_eq!(tree::read_tree(publisher.output_dir()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_count_collapse_aborts_and_preserves_output() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        publisher
            .publish(&tree_of(20), None, &PublishChecks::default())
            .await
            .unwrap();
        let before = tree::read_tree(publisher.output_dir()).await.unwrap();
        let last_good = publisher.load_last_good().await.unwrap();

        let err = publisher
            .publish(&tree_of(5), last_good.as_ref(), &PublishChecks::default())
            .await
            .unwrap_err();
        match err {
            AppError::PublishAborted(abort) => {
                assert_eq!(abort.reasons.len(), 1);
                assert!(abort.reasons[0].contains("20 -> 5"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(tree::read_tree(publisher.output_dir()).await.unwrap(), before);

        // --force only bypasses the drop guard.
        let forced = PublishChecks {
            force: true,
            ..PublishChecks::default()
        };
        let outcome = publisher
            .publish(&tree_of(5), last_good.as_ref(), &forced)
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        assert!(!tmp.path().join("docs.previous").exists());
    }

    #[tokio::test]
    async fn test_blocking_reasons_abort() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        let checks = PublishChecks {
            blocking: vec!["excluded records: 5/10 (50.0% > 10%)".into()],
            force: true,
        };
        let err = publisher
            .publish(&tree_of(10), None, &checks)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PublishAborted(_)));
        assert!(!publisher.output_dir().exists());
    }

    #[tokio::test]
    async fn test_interrupted_swap_restores_last_good() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        publisher
            .publish(&tree_of(20), None, &PublishChecks::default())
            .await
            .unwrap();
        let before = tree::read_tree(publisher.output_dir()).await.unwrap();

        // Crash between the two renames of a swap.
        let previous = tmp.path().join("docs.previous");
        tokio::fs::rename(publisher.output_dir(), &previous)
            .await
            .unwrap();

        let last_good = publisher.load_last_good().await.unwrap().unwrap();
        assert_eq!(last_good.manifest.total_companies, 20);
        assert!(!previous.exists());

        let reasons = abort_reasons(
            publisher
                .publish(&tree_of(2), Some(&last_good), &PublishChecks::default())
                .await
                .unwrap_err(),
        );
        assert!(reasons.iter().any(|r| r.contains("20 -> 2")), "{reasons:?}");
        assert_eq!(tree::read_tree(publisher.output_dir()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_publish_recovers_without_a_loaded_baseline() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        publisher
            .publish(&tree_of(20), None, &PublishChecks::default())
            .await
            .unwrap();
        let before = tree::read_tree(publisher.output_dir()).await.unwrap();
        tokio::fs::rename(publisher.output_dir(), tmp.path().join("docs.previous"))
            .await
            .unwrap();

        let reasons = abort_reasons(
            publisher
                .publish(&tree_of(2), None, &PublishChecks::default())
                .await
                .unwrap_err(),
        );
        assert!(reasons.iter().any(|r| r.contains("20 -> 2")), "{reasons:?}");
        assert_eq!(tree::read_tree(publisher.output_dir()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_leftover_previous_blocks_and_survives() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        publisher
            .publish(&tree_of(3), None, &PublishChecks::default())
            .await
            .unwrap();
        let previous = tmp.path().join("docs.previous");
        tokio::fs::create_dir_all(&previous).await.unwrap();
        tokio::fs::write(previous.join("meta.json"), b"{}\n")
            .await
            .unwrap();

        let last_good = publisher.load_last_good().await.unwrap();
        let reasons = abort_reasons(
            publisher
                .publish(&tree_of(4), last_good.as_ref(), &PublishChecks::default())
                .await
                .unwrap_err(),
        );
        assert!(reasons.iter().any(|r| r.contains("interrupted publish")), "{reasons:?}");
        assert!(previous.join("meta.json").exists());
    }

    #[tokio::test]
    async fn test_unreadable_manifest_is_not_a_first_run() {
        let tmp = TempDir::new().unwrap();
        let publisher = publisher(&tmp);
        publisher
            .publish(&tree_of(20), None, &PublishChecks::default())
            .await
            .unwrap();
        let meta = publisher.output_dir().join(META_FILE);
        tokio::fs::write(&meta, b"{ truncated").await.unwrap();

        assert!(publisher.load_last_good().await.unwrap().is_none());

        let forced = PublishChecks {
            force: true,
            ..PublishChecks::default()
        };
        let reasons = abort_reasons(
            publisher
                .publish(&tree_of(2), None, &forced)
                .await
                .unwrap_err(),
        );
        assert_eq!(reasons.len(), 1, "{reasons:?}");
        assert!(reasons[0].contains("unreadable"));
        assert_eq!(tokio::fs::read(&meta).await.unwrap(), b"{ truncated");
        assert!(publisher.output_dir().join("companies/company-0.json").exists());
    }

    #[tokio::test]
    async fn test_company_floor_blocks_staged_tree() {
        let tmp = TempDir::new().unwrap();
        let publisher = LocalPublisher::new(
            tmp.path().join("docs"),
            CircuitBreaker::new(&SafetyConfig::default()),
        );
        let reasons = abort_reasons(
            publisher
                .publish(&tree_of(5), None, &PublishChecks::default())
                .await
                .unwrap_err(),
        );
        assert_eq!(
            reasons,
            vec!["staged tree: only 5 companies, expected at least 100".to_string()]
        );
        assert!(!publisher.output_dir().exists());
    }
}
