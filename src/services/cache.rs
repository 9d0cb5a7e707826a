// src/services/cache.rs

//! Content-hash change detection persisted across runs.
//!
//! For each URL the cache remembers the hash of the last body it saw and the
//! parser output for that body. A matching hash on the next run means the
//! stored parse is reused verbatim and the page is not parsed again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{DirectoryEntry, ExtractionReport, ProfileFields};

const CACHE_VERSION: u32 = 1;

/// Parser output stored alongside a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedParse {
    Directory {
        entries: Vec<DirectoryEntry>,
        total_pages: u32,
        dropped: usize,
    },
    Profile {
        fields: ProfileFields,
        report: ExtractionReport,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub parsed: Option<CachedParse>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// URL-keyed hash cache. Interior lock so workers can share `&self`.
#[derive(Debug, Default)]
pub struct ChangeDetectionCache {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    /// URLs looked up or recorded during this run
    seen: Mutex<BTreeSet<String>>,
}

impl ChangeDetectionCache {
    /// Empty cache (first run, or caching disabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk. Missing file gives an empty cache; an unreadable or
    /// foreign-version file is discarded with a warning.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        match serde_json::from_slice::<CacheFile>(&bytes) {
            Ok(file) if file.version == CACHE_VERSION => {
                log::debug!("Loaded {} cache entries from {:?}", file.entries.len(), path);
                Ok(Self {
                    entries: Mutex::new(file.entries),
                    seen: Mutex::default(),
                })
            }
            Ok(file) => {
                log::warn!(
                    "Ignoring cache {:?} with version {} (expected {})",
                    path,
                    file.version,
                    CACHE_VERSION
                );
                Ok(Self::new())
            }
            Err(e) => {
                log::warn!("Ignoring unreadable cache {:?}: {}", path, e);
                Ok(Self::new())
            }
        }
    }

    /// Persist atomically (write to temp, then rename).
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.lock().clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        let mut out = tokio::fs::File::create(&tmp).await?;
        out.write_all(&bytes).await?;
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn mark_seen(&self, url: &str) {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.to_string());
    }

    /// Drop entries for URLs this run never touched, so pages that left the
    /// directory do not linger in the saved cache. Returns how many went.
    pub fn prune_unseen(&self) -> usize {
        let seen = self.seen.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|url, _| seen.contains(url));
        before - entries.len()
    }

    /// True unless the stored hash equals `new_hash` and a parse is on file.
    pub fn should_reparse(&self, url: &str, new_hash: &str) -> bool {
        self.mark_seen(url);
        self.lock()
            .get(url)
            .is_none_or(|entry| entry.content_hash != new_hash || entry.parsed.is_none())
    }

    /// Remember `hash` for `url`. Drops a stored parse if the hash moved.
    pub fn record(&self, url: &str, hash: &str) {
        self.mark_seen(url);
        let mut entries = self.lock();
        match entries.get_mut(url) {
            Some(entry) if entry.content_hash == hash => entry.recorded_at = Utc::now(),
            _ => {
                entries.insert(
                    url.to_string(),
                    CacheEntry {
                        content_hash: hash.to_string(),
                        recorded_at: Utc::now(),
                        parsed: None,
                    },
                );
            }
        }
    }

    /// Remember `hash` together with the parse it produced.
    pub fn store(&self, url: &str, hash: &str, parsed: CachedParse) {
        self.mark_seen(url);
        self.lock().insert(
            url.to_string(),
            CacheEntry {
                content_hash: hash.to_string(),
                recorded_at: Utc::now(),
                parsed: Some(parsed),
            },
        );
    }

    /// Stored parse for `url`, only if it was produced from `hash`.
    pub fn cached(&self, url: &str, hash: &str) -> Option<CachedParse> {
        self.mark_seen(url);
        self.lock()
            .get(url)
            .filter(|entry| entry.content_hash == hash)
            .and_then(|entry| entry.parsed.clone())
    }

    pub fn hash_of(&self, url: &str) -> Option<String> {
        self.lock().get(url).map(|e| e.content_hash.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::content_hash;
    use tempfile::TempDir;

    fn profile_parse(name: &str) -> CachedParse {
        CachedParse::Profile {
            fields: ProfileFields {
                name: Some(name.to_string()),
                ..ProfileFields::default()
            },
            report: ExtractionReport::new(),
        }
    }

    #[test]
    fn unknown_url_needs_parse() {
        let cache = ChangeDetectionCache::new();
        assert!(cache.should_reparse("https://x.test/a", "abc"));
    }

    #[test]
    fn same_hash_with_parse_is_skipped() {
        let cache = ChangeDetectionCache::new();
        let hash = content_hash(b"<html>a</html>");
        cache.store("https://x.test/a", &hash, profile_parse("A"));

        assert!(!cache.should_reparse("https://x.test/a", &hash));
        assert_eq!(
            cache.cached("https://x.test/a", &hash),
            Some(profile_parse("A"))
        );
    }

    #[test]
    fn changed_hash_invalidates() {
        let cache = ChangeDetectionCache::new();
        cache.store("https://x.test/a", "old", profile_parse("A"));

        assert!(cache.should_reparse("https://x.test/a", "new"));
        assert_eq!(cache.cached("https://x.test/a", "new"), None);

        cache.record("https://x.test/a", "new");
        assert_eq!(cache.hash_of("https://x.test/a").as_deref(), Some("new"));
        // Hash alone, without a parse, still needs parsing.
        assert!(cache.should_reparse("https://x.test/a", "new"));
    }

    #[test]
    fn record_same_hash_keeps_parse() {
        let cache = ChangeDetectionCache::new();
        cache.store("https://x.test/a", "h", profile_parse("A"));
        cache.record("https://x.test/a", "h");
        assert!(cache.cached("https://x.test/a", "h").is_some());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/cache.json");

        let cache = ChangeDetectionCache::new();
        cache.store("https://x.test/a", "h1", profile_parse("A"));
        cache.save(&path).await.unwrap();

        let loaded = ChangeDetectionCache::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.should_reparse("https://x.test/a", "h1"));
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_gives_empty_cache() {
        let tmp = TempDir::new().unwrap();
        let missing = ChangeDetectionCache::load(tmp.path().join("nope.json"))
            .await
            .unwrap();
        assert!(missing.is_empty());

        let corrupt = tmp.path().join("bad.json");
        tokio::fs::write(&corrupt, b"{not json").await.unwrap();
        let loaded = ChangeDetectionCache::load(&corrupt).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn prune_drops_urls_not_seen_this_run() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let first = ChangeDetectionCache::new();
        first.store("https://x.test/kept", "h1", profile_parse("Kept"));
        first.store("https://x.test/gone", "h2", profile_parse("Gone"));
        first.save(&path).await.unwrap();

        let next = ChangeDetectionCache::load(&path).await.unwrap();
        assert!(next.cached("https://x.test/kept", "h1").is_some());
        assert_eq!(next.prune_unseen(), 1);
        next.save(&path).await.unwrap();

        let reloaded = ChangeDetectionCache::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.hash_of("https://x.test/kept").as_deref(), Some("h1"));
        assert!(reloaded.hash_of("https://x.test/gone").is_none());
    }
}
