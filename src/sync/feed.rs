//! Live content feed
//!
//! A [`LiveFeed`] starts from a repository's recent activity and then
//! follows the subscription bus: creates and updates replace the record
//! with the same URI, deletes remove it. Every applied event also drops
//! the synchronizer's cached lists for that collection.

use super::synchronizer::Synchronizer;
use crate::error::Result;
use crate::model::{Operation, RawRecord, RecordEnvelope, StreamEvent};
use crate::stream::{Subscription, SubscriptionBus};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Items shared between the feed and its bus callbacks
struct FeedState {
    did: String,
    capacity: usize,
    items: RwLock<Vec<RecordEnvelope>>,
}

impl FeedState {
    fn apply(&self, event: &StreamEvent) -> bool {
        if event.repository_id != self.did {
            return false;
        }

        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        match event.operation {
            Operation::Delete => {
                let before = items.len();
                items.retain(|item| item.uri != event.uri);
                items.len() != before
            }
            Operation::Create | Operation::Update => {
                let Some(value) = event.record_value.clone() else {
                    tracing::warn!("{} event for {} carries no record", event.operation, event.uri);
                    return false;
                };
                let mut record = RecordEnvelope::from_raw(
                    RawRecord {
                        uri: event.uri.clone(),
                        cid: String::new(),
                        value,
                        indexed_at: None,
                    },
                    &event.collection,
                );
                if record.indexed_at.is_none() {
                    record.indexed_at = micros_to_datetime(event.received_at_micros);
                }

                items.retain(|item| item.uri != record.uri);
                items.push(record);
                items.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
                items.truncate(self.capacity);
                true
            }
        }
    }
}

fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Recent activity of one repository, kept current from the live stream
pub struct LiveFeed {
    sync: Arc<Synchronizer>,
    state: Arc<FeedState>,
    subscriptions: Mutex<Vec<Subscription>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LiveFeed {
    /// Seed the feed with up to `capacity` recent records
    pub async fn load(sync: Arc<Synchronizer>, repository_id: &str, capacity: usize) -> Result<Self> {
        let did = sync.resolve_repository(repository_id).await?;
        let items = sync.get_recent_activity(&did, capacity).await?;
        tracing::info!("Live feed for {} seeded with {} records", did, items.len());

        Ok(Self {
            sync,
            state: Arc::new(FeedState {
                did,
                capacity,
                items: RwLock::new(items),
            }),
            subscriptions: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        })
    }

    pub fn repository(&self) -> &str {
        &self.state.did
    }

    /// Follow `collections` on `bus`.
    ///
    /// Must be called inside a tokio runtime; cache invalidation runs on a
    /// background task.
    pub fn attach(&self, bus: &SubscriptionBus, collections: &[String]) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for collection in collections {
            let state = self.state.clone();
            let tx = tx.clone();
            subscriptions.push(bus.subscribe(format!("collection:{}", collection), move |event| {
                if event.repository_id != state.did {
                    return;
                }
                state.apply(event);
                // Worker gone means the feed is detaching
                let _ = tx.send(event.collection.clone());
            }));
        }

        let sync = self.sync.clone();
        let did = self.state.did.clone();
        let worker = tokio::spawn(async move {
            while let Some(collection) = rx.recv().await {
                sync.invalidate_collection(&did, &collection).await;
            }
        });

        let previous = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(worker);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!("Live feed for {} following {} collections", self.state.did, collections.len());
    }

    /// Apply one event directly; returns whether the items changed
    pub fn apply(&self, event: &StreamEvent) -> bool {
        self.state.apply(event)
    }

    /// Stop following the bus; returns how many subscriptions were removed
    pub fn detach(&self) -> usize {
        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let removed = subscriptions
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count();

        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
        removed
    }

    /// Current items, newest first
    pub fn items(&self) -> Vec<RecordEnvelope> {
        self.filter(|_| true)
    }

    pub fn by_shape(&self, shape_id: &str) -> Vec<RecordEnvelope> {
        self.filter(|item| item.shape_id == shape_id)
    }

    pub fn by_collection(&self, collection: &str) -> Vec<RecordEnvelope> {
        self.filter(|item| item.collection == collection)
    }

    /// Items whose value mentions `query`, case-insensitively
    pub fn search(&self, query: &str) -> Vec<RecordEnvelope> {
        let query = query.to_lowercase();
        self.filter(|item| item.value.to_string().to_lowercase().contains(&query))
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<RecordEnvelope>
    where
        F: Fn(&RecordEnvelope) -> bool,
    {
        self.state
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|item| predicate(*item))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.detach();
    }
}
