//! Cache-first repository synchronizer

use super::stats::RepositoryStats;
use super::timestamp::TimestampGuard;
use crate::cache::Cache;
use crate::config::AtSyncConfig;
use crate::config::SyncConfig;
use crate::discovery::DiscoveryEngine;
use crate::error::Result;
use crate::model::{AtUri, CollectionDescriptor, RecordEnvelope};
use crate::xrpc::RepositoryApi;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// Upstream page size ceiling
const MAX_PAGE_SIZE: u32 = 100;

/// Fetches repository data through per-type TTL caches.
///
/// Every public fetch checks its cache first, then the network. When the
/// network fails, the last cached value (however old) is served; with no
/// previous value an empty result is returned. Only session errors
/// propagate.
pub struct Synchronizer {
    api: Arc<dyn RepositoryApi>,
    discovery: DiscoveryEngine,
    config: SyncConfig,
    guard: TimestampGuard,
    handles: Cache<String>,
    records: Cache<Vec<RecordEnvelope>>,
    single: Cache<Option<RecordEnvelope>>,
    collections: Cache<Vec<CollectionDescriptor>>,
    stats: Cache<RepositoryStats>,
}

impl Synchronizer {
    /// Build a synchronizer and its discovery engine from configuration
    pub fn new(api: Arc<dyn RepositoryApi>, config: &AtSyncConfig) -> Self {
        let discovery = DiscoveryEngine::new(api.clone(), config.discovery.clone());
        Self::with_discovery(api, discovery, config)
    }

    pub fn with_discovery(
        api: Arc<dyn RepositoryApi>,
        discovery: DiscoveryEngine,
        config: &AtSyncConfig,
    ) -> Self {
        let ttl = config.cache.ttl();
        Self {
            api,
            discovery,
            guard: TimestampGuard::from_config(&config.sync.timestamp_guard),
            config: config.sync.clone(),
            handles: Cache::new(ttl),
            records: Cache::new(ttl),
            single: Cache::new(ttl),
            collections: Cache::new(ttl),
            stats: Cache::new(ttl),
        }
    }

    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    pub fn timestamp_guard(&self) -> &TimestampGuard {
        &self.guard
    }

    /// Resolve a handle to its DID; DIDs pass through.
    ///
    /// When resolution fails and nothing is cached, the identifier itself is
    /// used: the upstream accepts handles wherever it accepts DIDs.
    pub async fn resolve_repository(&self, repository_id: &str) -> Result<String> {
        if repository_id.starts_with("did:") {
            return Ok(repository_id.to_string());
        }
        let key = format!("handle:{}", repository_id);
        cached(&self.handles, &key, repository_id.to_string(), || async {
            self.api.resolve_handle(repository_id).await
        })
        .await
    }

    /// One page of a collection, at most `limit` records
    pub async fn get_records(
        &self,
        repository_id: &str,
        collection: &str,
        limit: u32,
    ) -> Result<Vec<RecordEnvelope>> {
        let repo = self.resolve_repository(repository_id).await?;
        let key = format!("records:{}:{}:{}", repo, collection, limit);
        cached(&self.records, &key, Vec::new(), || async {
            let page = self
                .api
                .list_records(&repo, collection, limit.clamp(1, MAX_PAGE_SIZE), None)
                .await?;
            Ok(page
                .records
                .into_iter()
                .map(|raw| RecordEnvelope::from_raw(raw, collection))
                .collect())
        })
        .await
    }

    /// Every record of a collection, following cursors in order until they
    /// run out, repeat, or `max_total` records have been collected
    pub async fn get_all_records(
        &self,
        repository_id: &str,
        collection: &str,
        max_total: usize,
    ) -> Result<Vec<RecordEnvelope>> {
        let repo = self.resolve_repository(repository_id).await?;
        let key = format!("all:{}:{}:{}", repo, collection, max_total);
        cached(&self.records, &key, Vec::new(), || {
            self.paginate(&repo, collection, max_total)
        })
        .await
    }

    /// Most recent records across the priority collections, newest first.
    ///
    /// Records failing the timestamp guard are dropped before truncating.
    pub async fn get_recent_activity(
        &self,
        repository_id: &str,
        limit: usize,
    ) -> Result<Vec<RecordEnvelope>> {
        let repo = self.resolve_repository(repository_id).await?;
        let key = format!("activity:{}:{}", repo, limit);
        cached(&self.records, &key, Vec::new(), || async {
            tokio::time::sleep(self.config.burst_delay()).await;

            let per_collection = self.config.activity_per_collection;
            let results = futures::future::join_all(
                self.config
                    .priority_collections
                    .iter()
                    .map(|c| self.get_records(&repo, c, per_collection)),
            )
            .await;

            let mut merged = Vec::new();
            for records in results {
                merged.extend(records?);
            }
            Ok(select_recent(merged, limit, &self.guard, Utc::now()))
        })
        .await
    }

    /// Totals and activity windows over every collection of the repository
    pub async fn get_repository_stats(&self, repository_id: &str) -> Result<RepositoryStats> {
        let repo = self.resolve_repository(repository_id).await?;
        let key = format!("stats:{}", repo);
        cached(&self.stats, &key, RepositoryStats::empty(Utc::now()), || async {
            let names = self.discovery.list_collection_names(&repo).await?;
            tokio::time::sleep(self.config.burst_delay()).await;

            let max_total = self.config.max_total;
            let fetched: Vec<(String, Result<Vec<RecordEnvelope>>)> = stream::iter(names)
                .map(|name| {
                    let repo = repo.as_str();
                    async move {
                        let records = self.get_all_records(repo, &name, max_total).await;
                        (name, records)
                    }
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;

            let mut collections = Vec::with_capacity(fetched.len());
            for (name, records) in fetched {
                collections.push((name, records?));
            }

            let stats = RepositoryStats::compute(
                collections
                    .iter()
                    .map(|(name, records)| (name.as_str(), records.as_slice())),
                &self.guard.allowing_now(),
                Utc::now(),
            );
            tracing::info!(
                "Computed stats for {}: {} records in {} collections",
                repo,
                stats.total_records,
                stats.active_collections
            );
            Ok(stats)
        })
        .await
    }

    /// Discovered collections and their shapes
    pub async fn get_collections(&self, repository_id: &str) -> Result<Vec<CollectionDescriptor>> {
        let repo = self.resolve_repository(repository_id).await?;
        let key = format!("collections:{}", repo);
        cached(&self.collections, &key, Vec::new(), || {
            self.discovery.discover_collections(&repo)
        })
        .await
    }

    /// One record by URI; `None` when it does not exist or the URI is
    /// malformed
    pub async fn get_record(&self, uri: &str) -> Result<Option<RecordEnvelope>> {
        let Ok(at_uri) = AtUri::parse(uri) else {
            tracing::warn!("Ignoring malformed record URI {}", uri);
            return Ok(None);
        };

        let key = format!("record:{}", uri);
        cached(&self.single, &key, None, || async {
            match self
                .api
                .get_record(&at_uri.authority, &at_uri.collection, &at_uri.rkey)
                .await
            {
                Ok(raw) => Ok(Some(RecordEnvelope::from_raw(raw, &at_uri.collection))),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Drop cached lists touching a collection of a repository, e.g. after
    /// a live commit event for it
    pub async fn invalidate_collection(&self, did: &str, collection: &str) -> usize {
        let mut removed = 0;
        for prefix in [
            format!("records:{}:{}:", did, collection),
            format!("all:{}:{}:", did, collection),
            format!("activity:{}:", did),
        ] {
            removed += self.records.invalidate_prefix(&prefix).await;
        }
        removed += self.stats.invalidate_prefix(&format!("stats:{}", did)).await;
        tracing::debug!("Invalidated {} cache entries for {}/{}", removed, did, collection);
        removed
    }

    async fn paginate(
        &self,
        repo: &str,
        collection: &str,
        max_total: usize,
    ) -> Result<Vec<RecordEnvelope>> {
        let page_size = self.config.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        while records.len() < max_total {
            let remaining = max_total - records.len();
            let limit = page_size.min(u32::try_from(remaining).unwrap_or(u32::MAX));
            let page = self
                .api
                .list_records(repo, collection, limit, cursor.as_deref())
                .await?;

            let fetched = page.records.len();
            records.extend(
                page.records
                    .into_iter()
                    .take(remaining)
                    .map(|raw| RecordEnvelope::from_raw(raw, collection)),
            );

            match page.cursor {
                Some(next) if fetched > 0 && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        if records.len() >= max_total {
            tracing::warn!(
                "Stopped paginating {} in {} at {} records",
                collection,
                repo,
                max_total
            );
        }
        Ok(records)
    }
}

/// Keep records passing `guard`, newest first, at most `limit`
pub fn select_recent(
    records: Vec<RecordEnvelope>,
    limit: usize,
    guard: &TimestampGuard,
    now: DateTime<Utc>,
) -> Vec<RecordEnvelope> {
    let mut recent: Vec<RecordEnvelope> = records
        .into_iter()
        .filter(|r| guard.accepts(r.indexed_at, now))
        .collect();
    recent.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
    recent.truncate(limit);
    recent
}

/// Cache-first fetch with stale fallback.
///
/// A fresh entry is returned as is. Otherwise `fetch` runs; success is
/// cached, a session error propagates, and any other error falls back to
/// the previous entry or `empty`.
async fn cached<T, F, Fut>(cache: &Cache<T>, key: &str, empty: T, fetch: F) -> Result<T>
where
    T: Clone + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(data) = cache.get(key).await {
        return Ok(data);
    }

    match fetch().await {
        Ok(data) => {
            cache.set(key, data.clone()).await;
            Ok(data)
        }
        Err(e) if e.is_session() => Err(e),
        Err(e) => match cache.entry(key).await {
            Some(entry) => {
                tracing::warn!(
                    key,
                    written_at = %entry.written_at,
                    "Fetch failed, serving stale data: {}",
                    e
                );
                Ok(entry.data)
            }
            None => {
                tracing::warn!(key, "Fetch failed with nothing cached: {}", e);
                Ok(empty)
            }
        },
    }
}
