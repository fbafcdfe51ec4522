use std::path::{Path, PathBuf};

use crate::paper::Paper;

/// On-disk result cache, one JSON file per canonical DOI.
///
/// Entries are immutable: written once per successful fetch, never partially
/// updated. Concurrent writers racing on the same key is last-write-wins,
/// which is fine because both derive the same content from the same DOI.
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache file path for a DOI: `<dir>/<md5(doi)>.json`.
    pub fn key_path(&self, doi: &str) -> PathBuf {
        let digest = md5::compute(doi.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    /// Load a cached paper. Missing or unreadable entries are treated as
    /// absent.
    pub fn load(&self, doi: &str) -> Option<Paper> {
        let path = self.key_path(doi);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(_) => return None,
        };
        match serde_json::from_str(&data) {
            Ok(paper) => Some(paper),
            Err(e) => {
                tracing::warn!("Discarding malformed cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a paper. A paper without a DOI cannot be keyed and is silently
    /// skipped; write failures are logged, not surfaced.
    pub fn store(&self, paper: &Paper) {
        if paper.doi.is_empty() {
            return;
        }
        let path = self.key_path(&paper.doi);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(paper) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!("Failed to write cache for {}: {}", paper.doi, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize cache for {}: {}", paper.doi, e),
        }
    }

    /// Delete every cached entry.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && std::fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }
        removed
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Source;

    fn cached_paper(doi: &str) -> Paper {
        Paper {
            doi: doi.into(),
            title: "A cached paper".into(),
            full_text: "Some full text.".into(),
            source: Source::OpenAccess,
            ..Default::default()
        }
    }

    #[test]
    fn test_key_is_md5_of_doi() {
        let cache = ResultCache::new("/tmp/whatever");
        let path = cache.key_path("10.1038/nphys1509");
        // md5("10.1038/nphys1509")
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{:x}.json", md5::compute(b"10.1038/nphys1509")),
        );
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let paper = cached_paper("10.1000/roundtrip");
        cache.store(&paper);
        assert_eq!(cache.load("10.1000/roundtrip"), Some(paper));
    }

    #[test]
    fn test_store_without_doi_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        cache.store(&Paper::default());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_malformed_entry_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        std::fs::write(cache.key_path("10.1000/bad"), "{not json").unwrap();
        assert_eq!(cache.load("10.1000/bad"), None);
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        cache.store(&cached_paper("10.1000/a"));
        cache.store(&cached_paper("10.1000/b"));
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.load("10.1000/a"), None);
    }
}
