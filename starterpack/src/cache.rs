//! Durable release cache keyed by `owner/repo`.
//!
//! The cache is a single JSON document rewritten after every successful
//! resolution. Loading never fails: malformed entries are dropped and an
//! unreadable document yields an empty cache.

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub urls: Vec<String>,
    /// Parallel to `urls`.
    pub filenames: Vec<String>,
    /// ETag of the release response that produced this entry.
    pub validator: String,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(urls: Vec<String>, filenames: Vec<String>, validator: String, fetched_at: DateTime<Utc>) -> Self {
        Self {
            urls,
            filenames,
            validator,
            fetched_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

/// On-disk shapes. The legacy single-asset form is still accepted on load.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum StoredEntry {
    Multi {
        urls: Vec<String>,
        filenames: Vec<String>,
        timestamp: String,
        etag: String,
    },
    Legacy {
        url: String,
        filename: String,
        timestamp: String,
        etag: String,
    },
}

impl StoredEntry {
    fn into_entry(self) -> Option<CacheEntry> {
        let (urls, filenames, timestamp, etag) = match self {
            StoredEntry::Multi {
                urls,
                filenames,
                timestamp,
                etag,
            } => (urls, filenames, timestamp, etag),
            StoredEntry::Legacy {
                url,
                filename,
                timestamp,
                etag,
            } => (vec![url], vec![filename], timestamp, etag),
        };

        if urls.len() != filenames.len() {
            return None;
        }
        let fetched_at = parse_timestamp(&timestamp)?;
        Some(CacheEntry::new(urls, filenames, etag, fetched_at))
    }

    fn from_entry(entry: &CacheEntry) -> Self {
        StoredEntry::Multi {
            urls: entry.urls.clone(),
            filenames: entry.filenames.clone(),
            timestamp: entry.fetched_at.to_rfc3339(),
            etag: entry.validator.clone(),
        }
    }
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[derive(Debug)]
pub struct ReleaseCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl ReleaseCache {
    /// An empty cache that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache document, dropping anything that does not parse.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::empty(path);
        if !cache.path.exists() {
            return cache;
        }

        let content = match std::fs::read_to_string(&cache.path) {
            Ok(content) => content,
            Err(e) => {
                error!("Error loading cache {}: {}", cache.path.display(), e);
                return cache;
            }
        };

        let document: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&content) {
                Ok(document) => document,
                Err(e) => {
                    error!("Error loading cache {}: {}", cache.path.display(), e);
                    return cache;
                }
            };

        for (key, value) in document {
            match serde_json::from_value::<StoredEntry>(value)
                .ok()
                .and_then(StoredEntry::into_entry)
            {
                Some(entry) => {
                    cache.entries.insert(key, entry);
                }
                None => warn!("Invalid cache entry for {}, ignoring.", key),
            }
        }

        debug!(
            "Loaded {} cache entries from {}",
            cache.entries.len(),
            cache.path.display()
        );
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Replace the entry for `key` and persist immediately.
    pub fn put(&mut self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        self.save()
    }

    /// Drop one key, or the whole document when `key` is `None`.
    pub fn invalidate(&mut self, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => {
                if self.entries.remove(key).is_some() {
                    self.save()?;
                }
            }
            None => {
                self.entries.clear();
                if self.path.exists() {
                    std::fs::remove_file(&self.path)?;
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let document: BTreeMap<&str, StoredEntry> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.as_str(), StoredEntry::from_entry(entry)))
            .collect();

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, &document)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        debug!("Updated cache in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn entry(now: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            vec!["https://example.com/a.cia".to_string()],
            vec!["a.cia".to_string()],
            "\"etag-1\"".to_string(),
            now,
        )
    }

    #[test]
    fn test_drops_entry_missing_etag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
  "good/repo": {
    "urls": ["https://example.com/a.cia"],
    "filenames": ["a.cia"],
    "timestamp": "2024-05-01T12:00:00+00:00",
    "etag": "W/\"abc\""
  },
  "bad/repo": {
    "urls": ["https://example.com/b.cia"],
    "filenames": ["b.cia"],
    "timestamp": "2024-05-01T12:00:00+00:00"
  }
}"#,
        )
        .unwrap();

        let cache = ReleaseCache::load(&path);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("good/repo").is_some());
        assert!(cache.get("bad/repo").is_none());
    }

    #[test]
    fn test_loads_legacy_single_asset_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"LumaTeam/Luma3DS": {
                "url": "https://example.com/Luma3DS.zip",
                "filename": "Luma3DS.zip",
                "timestamp": "2024-05-01T12:00:00.123456",
                "etag": ""
            }}"#,
        )
        .unwrap();

        let cache = ReleaseCache::load(&path);
        let entry = cache.get("LumaTeam/Luma3DS").unwrap();
        assert_eq!(entry.urls, vec!["https://example.com/Luma3DS.zip"]);
        assert_eq!(entry.filenames, vec!["Luma3DS.zip"]);
        assert_eq!(
            entry.fetched_at.timestamp(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn test_drops_mismatched_and_unparseable_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
  "a/b": {"urls": ["u1", "u2"], "filenames": ["f1"], "timestamp": "2024-05-01T12:00:00Z", "etag": ""},
  "c/d": {"urls": ["u1"], "filenames": ["f1"], "timestamp": "yesterday", "etag": ""},
  "e/f": "not an object"
}"#,
        )
        .unwrap();

        let cache = ReleaseCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_document_yields_empty_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ this is not json").unwrap();

        let cache = ReleaseCache::load(&path);
        assert!(cache.is_empty());
        assert_eq!(cache.path(), path.as_path());
    }

    #[test]
    fn test_put_persists_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let now = Utc::now();

        let mut cache = ReleaseCache::load(&path);
        cache.put("owner/repo", entry(now)).unwrap();

        let reloaded = ReleaseCache::load(&path);
        let stored = reloaded.get("owner/repo").unwrap();
        assert_eq!(stored.urls, entry(now).urls);
        assert_eq!(stored.validator, "\"etag-1\"");
        assert_eq!(stored.fetched_at.timestamp(), now.timestamp());
    }

    #[test]
    fn test_invalidate_all_removes_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ReleaseCache::empty(&path);
        cache.put("owner/repo", entry(Utc::now())).unwrap();
        assert!(path.exists());

        cache.invalidate(None).unwrap();
        assert!(!path.exists());
        assert!(cache.is_empty());

        // Clearing an absent document is fine.
        cache.invalidate(None).unwrap();
    }

    #[test]
    fn test_invalidate_single_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ReleaseCache::empty(&path);
        cache.put("one/repo", entry(Utc::now())).unwrap();
        cache.put("two/repo", entry(Utc::now())).unwrap();
        cache.invalidate(Some("one/repo")).unwrap();

        let reloaded = ReleaseCache::load(&path);
        assert!(reloaded.get("one/repo").is_none());
        assert!(reloaded.get("two/repo").is_some());
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let ttl = chrono::Duration::hours(24);

        let recent = entry(now - chrono::Duration::hours(23));
        assert!(recent.is_fresh(now, ttl));

        let boundary = entry(now - ttl);
        assert!(!boundary.is_fresh(now, ttl));
    }
}
