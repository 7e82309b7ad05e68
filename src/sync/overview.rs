//! Snapshot-first overview loading

use super::source::RecordSource;
use super::stats::RepositoryStats;
use crate::error::Result;
use crate::model::{CollectionDescriptor, RecordEnvelope};
use crate::snapshot::SnapshotStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Where an overview's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Snapshot younger than its stale threshold
    Snapshot,
    Live,
    /// Live fetch produced nothing; an old snapshot stood in
    StaleSnapshot,
    /// Nothing available anywhere
    Empty,
}

/// Everything a repository landing view needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub recent_activity: Vec<RecordEnvelope>,
    pub stats: RepositoryStats,
    pub collections: Vec<CollectionDescriptor>,
    pub origin: DataOrigin,
}

impl Overview {
    fn empty() -> Self {
        Self {
            recent_activity: Vec::new(),
            stats: RepositoryStats::empty(Utc::now()),
            collections: Vec::new(),
            origin: DataOrigin::Empty,
        }
    }

    fn has_data(&self) -> bool {
        !self.recent_activity.is_empty() || !self.stats.is_empty() || !self.collections.is_empty()
    }
}

/// Chooses between a snapshot and a live source
pub struct OverviewLoader {
    live: Arc<dyn RecordSource>,
    snapshot: Option<SnapshotStore>,
    activity_limit: usize,
}

impl OverviewLoader {
    pub fn new(live: Arc<dyn RecordSource>, snapshot: Option<SnapshotStore>) -> Self {
        Self {
            live,
            snapshot,
            activity_limit: 20,
        }
    }

    pub fn with_activity_limit(mut self, limit: usize) -> Self {
        self.activity_limit = limit;
        self
    }

    /// Load an overview for `repository_id`.
    ///
    /// A fresh snapshot wins outright. Otherwise the live source is asked;
    /// if it yields nothing (or has no session) a stale snapshot is used,
    /// and failing that an explicit empty overview.
    pub async fn load(&self, repository_id: &str) -> Result<Overview> {
        let now = Utc::now();
        let snapshot = self.snapshot.as_ref().filter(|s| s.has_data());

        if let Some(store) = snapshot.filter(|s| !s.is_stale(now)) {
            tracing::debug!("Serving fresh snapshot from {}", store.dir().display());
            return Ok(self.from_snapshot(store, DataOrigin::Snapshot));
        }

        let live = match self.fetch_live(repository_id).await {
            Ok(live) => live,
            Err(e) if e.is_session() => match snapshot {
                Some(store) => {
                    tracing::warn!("No session for live fetch, serving stale snapshot: {}", e);
                    return Ok(self.from_snapshot(store, DataOrigin::StaleSnapshot));
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        if live.has_data() {
            return Ok(live);
        }

        match snapshot {
            Some(store) => {
                tracing::info!(
                    "Live source ({}) returned nothing, serving stale snapshot",
                    self.live.name()
                );
                Ok(self.from_snapshot(store, DataOrigin::StaleSnapshot))
            }
            None => Ok(Overview::empty()),
        }
    }

    async fn fetch_live(&self, repository_id: &str) -> Result<Overview> {
        let recent_activity = self
            .live
            .recent_activity(repository_id, self.activity_limit)
            .await?;
        let stats = self.live.repository_stats(repository_id).await?;
        let collections = self.live.collections(repository_id).await?;
        Ok(Overview {
            recent_activity,
            stats,
            collections,
            origin: DataOrigin::Live,
        })
    }

    fn from_snapshot(&self, store: &SnapshotStore, origin: DataOrigin) -> Overview {
        let mut recent_activity = store.activity().to_vec();
        recent_activity.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        recent_activity.truncate(self.activity_limit);

        let stats = store.stats().cloned().unwrap_or_else(|| {
            RepositoryStats::empty(store.metadata().map_or_else(Utc::now, |m| m.last_updated))
        });

        Overview {
            recent_activity,
            stats,
            collections: store.collections().to_vec(),
            origin,
        }
    }
}
