//! Snapshot directory reader

use crate::error::{Error, Result};
use crate::model::{CollectionDescriptor, RawRecord, RecordEnvelope};
use crate::sync::RepositoryStats;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const METADATA_FILE: &str = "metadata.json";
const ACTIVITY_FILE: &str = "activity.json";
const COLLECTIONS_FILE: &str = "collections.json";
const STATS_FILE: &str = "repository-stats.json";
const PROFILE_FILE: &str = "profile.json";

/// `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub last_updated: DateTime<Utc>,
    /// Items per dataset
    #[serde(default)]
    pub data_count: BTreeMap<String, usize>,
}

/// Datasets loaded from a snapshot directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    stale_after: Duration,
    metadata: Option<SnapshotMetadata>,
    activity: Vec<RecordEnvelope>,
    collections: Vec<CollectionDescriptor>,
    stats: Option<RepositoryStats>,
    profile: Option<Value>,
}

impl SnapshotStore {
    /// Load every dataset in `dir`.
    ///
    /// Missing files are empty datasets; a file that exists but does not
    /// parse is an error.
    pub async fn open(dir: impl AsRef<Path>, stale_after: Duration) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let metadata: Option<SnapshotMetadata> = read_json(&dir, METADATA_FILE).await?;
        let activity: Vec<RawRecord> = read_json(&dir, ACTIVITY_FILE).await?.unwrap_or_default();
        let collections: Vec<CollectionDescriptor> =
            read_json(&dir, COLLECTIONS_FILE).await?.unwrap_or_default();
        let stats: Option<RepositoryStats> = read_json(&dir, STATS_FILE).await?;
        let profile: Option<Value> = read_json(&dir, PROFILE_FILE).await?;

        let activity: Vec<RecordEnvelope> = activity
            .into_iter()
            .map(|raw| RecordEnvelope::from_raw(raw, ""))
            .collect();

        tracing::info!(
            "Loaded snapshot from {} ({} activity records, {} collections)",
            dir.display(),
            activity.len(),
            collections.len()
        );

        Ok(Self {
            dir,
            stale_after,
            metadata,
            activity,
            collections,
            stats,
            profile,
        })
    }

    /// A snapshot holding nothing, always stale
    pub fn empty(stale_after: Duration) -> Self {
        Self {
            dir: PathBuf::new(),
            stale_after,
            metadata: None,
            activity: Vec::new(),
            collections: Vec::new(),
            stats: None,
            profile: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.metadata.as_ref()
    }

    pub fn activity(&self) -> &[RecordEnvelope] {
        &self.activity
    }

    pub fn collections(&self) -> &[CollectionDescriptor] {
        &self.collections
    }

    pub fn stats(&self) -> Option<&RepositoryStats> {
        self.stats.as_ref()
    }

    pub fn profile(&self) -> Option<&Value> {
        self.profile.as_ref()
    }

    /// Whether any dataset holds data
    pub fn has_data(&self) -> bool {
        !self.activity.is_empty()
            || !self.collections.is_empty()
            || self.stats.as_ref().is_some_and(|s| !s.is_empty())
            || self.profile.is_some()
    }

    /// Age of the snapshot at `now`; `None` without metadata
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.metadata.as_ref().map(|m| now - m.last_updated)
    }

    /// Older than the stale threshold, or undated
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.age(now) {
            Some(age) => age.to_std().map_or(false, |age| age > self.stale_after),
            None => true,
        }
    }
}

async fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>> {
    let path = dir.join(name);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Snapshot file {} not present", path.display());
            return Ok(None);
        }
        Err(e) => return Err(Error::Io(e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Snapshot(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_open_full_snapshot() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            METADATA_FILE,
            r#"{"lastUpdated": "2025-06-15T12:00:00Z", "dataCount": {"activity": 1}}"#,
        );
        write(
            &dir,
            ACTIVITY_FILE,
            r#"[{"uri": "at://did:plc:a/app.bsky.feed.post/1", "cid": "b",
                 "value": {"$type": "app.bsky.feed.post", "text": "hi", "createdAt": "2025-06-15T11:00:00Z"}}]"#,
        );
        write(&dir, PROFILE_FILE, r#"{"handle": "alice.test"}"#);

        let store = SnapshotStore::open(dir.path(), HOUR).await.unwrap();
        assert!(store.has_data());
        assert_eq!(store.activity().len(), 1);
        assert_eq!(store.activity()[0].collection, "app.bsky.feed.post");
        assert_eq!(store.metadata().unwrap().data_count["activity"], 1);
        assert!(store.collections().is_empty());
        assert!(store.stats().is_none());
        assert_eq!(store.profile().unwrap()["handle"], "alice.test");

        let fresh = Utc.with_ymd_and_hms(2025, 6, 15, 12, 30, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2025, 6, 15, 13, 0, 1).unwrap();
        assert!(!store.is_stale(fresh));
        assert!(store.is_stale(stale));
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_and_stale() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path().join("nope"), HOUR)
            .await
            .unwrap();
        assert!(!store.has_data());
        assert!(store.is_stale(Utc::now()));
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, STATS_FILE, "{not json");
        let err = SnapshotStore::open(dir.path(), HOUR).await.unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }
}
