//! Interchangeable data sources for repository overviews

use super::stats::RepositoryStats;
use super::synchronizer::Synchronizer;
use crate::error::Result;
use crate::model::{CollectionDescriptor, RecordEnvelope};
use crate::snapshot::SnapshotStore;
use async_trait::async_trait;
use chrono::Utc;

/// Read side of the synchronizer, injectable as either a network-backed
/// or an offline implementation
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    async fn recent_activity(&self, repository_id: &str, limit: usize)
        -> Result<Vec<RecordEnvelope>>;

    async fn repository_stats(&self, repository_id: &str) -> Result<RepositoryStats>;

    async fn collections(&self, repository_id: &str) -> Result<Vec<CollectionDescriptor>>;
}

#[async_trait]
impl RecordSource for Synchronizer {
    fn name(&self) -> &str {
        "live"
    }

    async fn recent_activity(
        &self,
        repository_id: &str,
        limit: usize,
    ) -> Result<Vec<RecordEnvelope>> {
        self.get_recent_activity(repository_id, limit).await
    }

    async fn repository_stats(&self, repository_id: &str) -> Result<RepositoryStats> {
        self.get_repository_stats(repository_id).await
    }

    async fn collections(&self, repository_id: &str) -> Result<Vec<CollectionDescriptor>> {
        self.get_collections(repository_id).await
    }
}

/// Serves a build-time snapshot.
///
/// A snapshot describes a single repository, so the requested identifier
/// is not consulted.
pub struct SnapshotSource {
    store: SnapshotStore,
}

impl SnapshotSource {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}

#[async_trait]
impl RecordSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn recent_activity(&self, _repository_id: &str, limit: usize) -> Result<Vec<RecordEnvelope>> {
        let mut activity = self.store.activity().to_vec();
        activity.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        activity.truncate(limit);
        Ok(activity)
    }

    async fn repository_stats(&self, _repository_id: &str) -> Result<RepositoryStats> {
        let stats = match self.store.stats() {
            Some(stats) => stats.clone(),
            None => {
                let last_updated = self
                    .store
                    .metadata()
                    .map(|m| m.last_updated)
                    .unwrap_or_else(Utc::now);
                RepositoryStats::empty(last_updated)
            }
        };
        Ok(stats)
    }

    async fn collections(&self, _repository_id: &str) -> Result<Vec<CollectionDescriptor>> {
        Ok(self.store.collections().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_source_orders_and_limits_activity() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("activity.json"),
            r#"[
                {"uri": "at://did:plc:a/app.bsky.feed.post/1", "value": {"createdAt": "2025-06-01T00:00:00Z"}},
                {"uri": "at://did:plc:a/app.bsky.feed.post/2", "value": {"createdAt": "2025-06-03T00:00:00Z"}},
                {"uri": "at://did:plc:a/app.bsky.feed.like/3", "value": {"createdAt": "2025-06-02T00:00:00Z"}}
            ]"#,
        )
        .unwrap();
        let store = SnapshotStore::open(dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        let source = SnapshotSource::new(store);

        let recent = source.recent_activity("anyone", 2).await.unwrap();
        let keys: Vec<_> = recent.iter().filter_map(|r| r.record_key()).collect();
        assert_eq!(keys, vec!["2", "3"]);

        let stats = source.repository_stats("anyone").await.unwrap();
        assert!(stats.is_empty());
        assert!(source.collections("anyone").await.unwrap().is_empty());
        assert_eq!(source.name(), "snapshot");
    }
}
