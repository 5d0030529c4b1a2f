//! On-disk snapshot of the last fresh run.
//!
//! The snapshot is all-or-nothing: it is written to a sibling temp file and
//! renamed over the old one, and any read problem counts as a miss.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::CategoryMap;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),

    #[error("cache json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the cache file holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
    pub products: CategoryMap,
}

impl RunSnapshot {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.captured_at)
    }

    /// Fresh while younger than `max_age`. Timestamps from the future count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => self.age(now) < max_age,
            Err(_) => true,
        }
    }
}

pub struct ResultCache {
    path: PathBuf,
    max_age: Duration,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached snapshot, if one exists, parses, and is still fresh.
    pub fn load(&self) -> Option<RunSnapshot> {
        self.load_at(Utc::now())
    }

    fn load_at(&self, now: DateTime<Utc>) -> Option<RunSnapshot> {
        let snapshot = match self.peek() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "cache load failed");
                return None;
            }
        };
        if !snapshot.is_fresh(now, self.max_age) {
            tracing::info!(
                path = %self.path.display(),
                captured_at = %snapshot.captured_at,
                "cache is stale"
            );
            return None;
        }
        Some(snapshot)
    }

    /// Read the snapshot without any freshness check. `Ok(None)` when there is no file.
    pub fn peek(&self) -> Result<Option<RunSnapshot>, CacheError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Replace the snapshot with `products`, stamped now. Failures are only logged.
    pub fn save(&self, products: &CategoryMap) {
        let snapshot = RunSnapshot {
            captured_at: Utc::now(),
            products: products.clone(),
        };
        match self.write(&snapshot) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "cache saved"),
            Err(err) => tracing::warn!(path = %self.path.display(), error = %err, "cache save failed"),
        }
    }

    fn write(&self, snapshot: &RunSnapshot) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.tmp_path();
        if let Err(err) = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Product, ProductId};

    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

    fn sample() -> CategoryMap {
        let mut map = CategoryMap::new();
        map.insert(
            "Böcker & Ljud",
            vec![Product {
                id: ProductId::parse("B000000001").unwrap(),
                title: "Röda rummet".to_string(),
                image_url: Some("https://m.media-amazon.com/images/I/a._AC_SL300_.jpg".to_string()),
                canonical_url: "https://www.amazon.se/dp/B000000001".to_string(),
            }],
        );
        map.insert("Electronics", Vec::new());
        map
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("products_cache.json"), TWO_HOURS);

        cache.save(&sample());
        let snapshot = cache.load().unwrap();
        assert_eq!(snapshot.products, sample());
        assert!(!dir.path().join("products_cache.json.tmp").exists());
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("none.json"), TWO_HOURS);
        assert!(cache.load().is_none());
        assert!(cache.peek().unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products_cache.json");
        fs::write(&path, r#"{"timestamp": "not a date", "products": {}}"#).unwrap();
        let cache = ResultCache::new(&path, TWO_HOURS);
        assert!(cache.load().is_none());

        fs::write(&path, "{ truncated").unwrap();
        assert!(cache.load().is_none());
        assert!(cache.peek().is_err());
    }

    #[test]
    fn stale_snapshot_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products_cache.json");
        let old = RunSnapshot {
            captured_at: Utc::now() - chrono::Duration::hours(3),
            products: sample(),
        };
        fs::write(&path, serde_json::to_string(&old).unwrap()).unwrap();

        let cache = ResultCache::new(&path, TWO_HOURS);
        assert!(cache.load().is_none());
        assert_eq!(cache.peek().unwrap().unwrap(), old);
    }

    #[test]
    fn freshness_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("c.json"), TWO_HOURS);
        cache.save(&sample());
        let captured = cache.peek().unwrap().unwrap().captured_at;

        let almost = captured + chrono::Duration::hours(2) - chrono::Duration::seconds(1);
        assert!(cache.load_at(almost).is_some());
        assert!(cache.load_at(captured + chrono::Duration::hours(2)).is_none());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("c.json"), TWO_HOURS);
        cache.save(&sample());
        cache.save(&CategoryMap::new());
        assert!(cache.load().unwrap().products.is_empty());
    }

    #[test]
    fn unwritable_location_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let cache = ResultCache::new(blocker.join("c.json"), TWO_HOURS);
        cache.save(&sample());
        assert!(cache.load().is_none());
    }

    #[test]
    fn timestamp_is_iso8601_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        ResultCache::new(&path, TWO_HOURS).save(&sample());
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let stamp = raw["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
        assert_eq!(raw["products"]["Böcker & Ljud"][0]["asin"], "B000000001");
    }
}
