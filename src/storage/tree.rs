//! In-memory rendering of the output tree and on-disk verification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::{BuildManifest, CategoryIndex, CompanyRecord, Stage, StageIndex};
use crate::pipeline::BuiltIndex;

pub const META_FILE: &str = "meta.json";
pub const ALL_COMPANIES_FILE: &str = "companies/all.json";

/// Pretty JSON with a trailing newline.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Every published file, keyed by path relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTree {
    manifest: BuildManifest,
    files: BTreeMap<String, Vec<u8>>,
}

impl OutputTree {
    /// Render every document of `index`.
    pub fn render(index: &BuiltIndex) -> Result<Self> {
        let mut files = BTreeMap::new();

        files.insert(META_FILE.to_string(), to_json_bytes(&index.manifest)?);
        files.insert(
            ALL_COMPANIES_FILE.to_string(),
            to_json_bytes(&index.companies)?,
        );
        for record in &index.companies {
            files.insert(
                format!("companies/{}.json", record.slug),
                to_json_bytes(record)?,
            );
        }
        for (id, category) in &index.categories {
            files.insert(format!("categories/{id}.json"), to_json_bytes(category)?);
        }
        for (id, partner) in &index.partners {
            files.insert(format!("partners/{id}.json"), to_json_bytes(partner)?);
        }
        for stage in &index.stages {
            files.insert(format!("stages/{}.json", stage.id), to_json_bytes(stage)?);
        }
        for (year, entry) in &index.years {
            files.insert(format!("first-partnered/{year}.json"), to_json_bytes(entry)?);
        }

        Ok(Self {
            manifest: index.manifest.clone(),
            files,
        })
    }

    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Same tree with `meta.json` carrying a different timestamp.
    pub fn with_timestamp(&self, last_updated_iso: &str) -> Result<Self> {
        let manifest = BuildManifest {
            last_updated_iso: last_updated_iso.to_string(),
            ..self.manifest.clone()
        };
        let mut files = self.files.clone();
        files.insert(META_FILE.to_string(), to_json_bytes(&manifest)?);
        Ok(Self { manifest, files })
    }

    /// Whether `published` holds exactly this tree, ignoring when it was built.
    pub fn matches_published(&self, published: &BTreeMap<String, Vec<u8>>) -> Result<bool> {
        let Some(meta) = published.get(META_FILE) else {
            return Ok(false);
        };
        let Ok(manifest) = serde_json::from_slice::<BuildManifest>(meta) else {
            return Ok(false);
        };
        Ok(self.with_timestamp(&manifest.last_updated_iso)?.files == *published)
    }

    /// Write every file under `root`, which must not already hold a tree.
    pub async fn write_to(&self, root: &Path) -> Result<()> {
        for (relative, bytes) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await?;
        }
        Ok(())
    }
}

/// Read every regular file under `root` into memory. A missing root yields
/// an empty map.
pub async fn read_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    if !tokio::fs::try_exists(root).await? {
        return Ok(files);
    }

    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .map_err(|e| AppError::validation(format!("{}: {e}", path.display())))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(relative, tokio::fs::read(&path).await?);
        }
    }
    Ok(files)
}

async fn read_json<T: DeserializeOwned>(
    root: &Path,
    relative: &str,
    problems: &mut Vec<String>,
) -> Option<T> {
    let bytes = match tokio::fs::read(root.join(relative)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            problems.push(format!("{relative}: {e}"));
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            problems.push(format!("{relative}: {e}"));
            None
        }
    }
}

/// Check a tree on disk for internal consistency with its manifest, and that
/// it lists at least `min_companies` companies (0 skips the floor).
///
/// Returns the list of problems found; empty means consistent.
pub async fn verify_tree(root: &Path, min_companies: usize) -> Result<Vec<String>> {
    let mut problems = Vec::new();

    let Some(manifest) = read_json::<BuildManifest>(root, META_FILE, &mut problems).await else {
        return Ok(problems);
    };
    let Some(companies) =
        read_json::<Vec<CompanyRecord>>(root, ALL_COMPANIES_FILE, &mut problems).await
    else {
        return Ok(problems);
    };

    let total = manifest.total_companies;
    if total < min_companies {
        problems.push(format!(
            "only {total} companies, expected at least {min_companies}"
        ));
    }
    if companies.len() != total {
        problems.push(format!(
            "{ALL_COMPANIES_FILE} has {} companies, manifest says {total}",
            companies.len()
        ));
    }
    let stage_sum: usize = manifest.counts_by_stage.values().sum();
    if stage_sum != total {
        problems.push(format!(
            "counts_by_stage sums to {stage_sum}, manifest says {total}"
        ));
    }

    for record in &companies {
        let path = format!("companies/{}.json", record.slug);
        if !tokio::fs::try_exists(root.join(&path)).await? {
            problems.push(format!("{path} is missing"));
        }
    }

    let mut stage_files_total = 0;
    for stage in Stage::ALL {
        let path = format!("stages/{}.json", stage.id());
        let Some(index) = read_json::<StageIndex>(root, &path, &mut problems).await else {
            continue;
        };
        stage_files_total += index.companies.len();
        let expected = manifest.counts_by_stage.get(stage.id()).copied();
        if expected != Some(index.companies.len()) {
            problems.push(format!(
                "{path} lists {} companies, counts_by_stage says {expected:?}",
                index.companies.len()
            ));
        }
    }
    if stage_files_total != total {
        problems.push(format!(
            "stage indexes list {stage_files_total} companies, manifest says {total}"
        ));
    }

    for (id, expected) in &manifest.counts_by_category {
        let path = format!("categories/{id}.json");
        let Some(index) = read_json::<CategoryIndex>(root, &path, &mut problems).await else {
            continue;
        };
        if index.companies.len() != *expected {
            problems.push(format!(
                "{path} lists {} companies, counts_by_category says {expected}",
                index.companies.len()
            ));
        }
    }
    let category_files = read_tree(&root.join("categories")).await?.len();
    if category_files != manifest.counts_by_category.len() {
        problems.push(format!(
            "{category_files} category files, counts_by_category has {}",
            manifest.counts_by_category.len()
        ));
    }

    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::index::tests::{info, sample_record};
    use crate::pipeline::build_index;
    use crate::services::IdRegistry;
    use tempfile::TempDir;

    fn sample_tree() -> OutputTree {
        let registry = IdRegistry::new();
        let records = vec![
            sample_record(&registry, "acme", Stage::Growth, &["AI"], &["Jane Roe"], Some(2015)),
            sample_record(&registry, "beta", Stage::Early, &["AI", "Fintech"], &[], None),
        ];
        OutputTree::render(&build_index(records, &registry, &info())).unwrap()
    }

    #[test]
    fn test_render_layout() {
        let tree = sample_tree();
        let paths: Vec<&str> = tree.files().keys().map(String::as_str).collect();
        for expected in [
            "meta.json",
            "companies/all.json",
            "companies/acme.json",
            "companies/beta.json",
            "categories/ai.json",
            "categories/fintech.json",
            "partners/jane-roe.json",
            "stages/pre-seed-seed.json",
            "stages/unknown.json",
            "first-partnered/2015.json",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
        assert!(tree.files().values().all(|b| b.ends_with(b"}\n") || b.ends_with(b"]\n")));
    }

    #[test]
    fn test_timestamp_is_ignored_for_comparison() {
        let tree = sample_tree();
        let later = tree.with_timestamp("2030-01-01T00:00:00Z").unwrap();
        assert_ne!(tree, later);
        assert!(tree.matches_published(later.files()).unwrap());

        let mut changed = later.files().clone();
        changed.insert("partners/new.json".into(), b"{}\n".to_vec());
        assert!(!tree.matches_published(&changed).unwrap());
    }

    #[tokio::test]
    async fn test_written_tree_verifies() {
        let tmp = TempDir::new().unwrap();
        let tree = sample_tree();
        tree.write_to(tmp.path()).await.unwrap();

        assert_eq!(verify_tree(tmp.path(), 0).await.unwrap(), Vec::<String>::new());
        assert_eq!(read_tree(tmp.path()).await.unwrap(), *tree.files());
    }

    #[tokio::test]
    async fn test_verify_reports_inconsistencies() {
        let tmp = TempDir::new().unwrap();
        sample_tree().write_to(tmp.path()).await.unwrap();
        tokio::fs::remove_file(tmp.path().join("companies/beta.json"))
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("categories/extra.json"), b"{}\n")
            .await
            .unwrap();

        let problems = verify_tree(tmp.path(), 0).await.unwrap();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems[0].contains("companies/beta.json"));
    }

    #[tokio::test]
    async fn test_verify_enforces_company_floor() {
        let tmp = TempDir::new().unwrap();
        sample_tree().write_to(tmp.path()).await.unwrap();

        assert!(verify_tree(tmp.path(), 2).await.unwrap().is_empty());
        let problems = verify_tree(tmp.path(), 100).await.unwrap();
        assert_eq!(problems, vec!["only 2 companies, expected at least 100".to_string()]);
    }

    #[tokio::test]
    async fn test_verify_missing_meta() {
        let tmp = TempDir::new().unwrap();
        let problems = verify_tree(tmp.path(), 0).await.unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("meta.json"));
    }
}
