//! Subscription bus
//!
//! Callbacks are grouped by filter key. Dispatch snapshots the matching
//! callbacks under the read lock and invokes them after releasing it, so a
//! callback may subscribe or unsubscribe without deadlocking.

use super::filter::EventFilter;
use crate::model::StreamEvent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use uuid::Uuid;

/// Shape id of short-form posts
pub const POST_SHAPE: &str = "app.bsky.feed.post";
/// Shape id of status updates
pub const STATUS_SHAPE: &str = "a.status.update";
/// Collection holding galleries
pub const GALLERY_COLLECTION: &str = "social.grain.gallery";

/// Subscriber callback
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

struct FilterGroup {
    filter: EventFilter,
    callbacks: Vec<(Uuid, EventCallback)>,
}

type Groups = RwLock<HashMap<String, FilterGroup>>;

/// Fans stream events out to filtered subscribers
#[derive(Default)]
pub struct SubscriptionBus {
    groups: Arc<Groups>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `filter_key`.
    ///
    /// The subscription stays active until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not remove it.
    pub fn subscribe<F>(&self, filter_key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let key = filter_key.into();
        let id = Uuid::new_v4();

        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry(key.clone())
            .or_insert_with(|| FilterGroup {
                filter: EventFilter::parse(&key),
                callbacks: Vec::new(),
            })
            .callbacks
            .push((id, Arc::new(callback)));
        tracing::debug!(filter = %key, id = %id, "Subscribed");

        Subscription {
            key,
            id,
            groups: Arc::downgrade(&self.groups),
        }
    }

    /// New posts and post updates
    pub fn subscribe_posts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscribe(format!("$type:{}", POST_SHAPE), callback)
    }

    pub fn subscribe_status_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscribe(format!("$type:{}", STATUS_SHAPE), callback)
    }

    /// Every gallery change, deletes included
    pub fn subscribe_gallery_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscribe(format!("collection:{}", GALLERY_COLLECTION), callback)
    }

    /// Invoke every callback whose filter matches; returns how many ran
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let matching: Vec<EventCallback> = {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            groups
                .values()
                .filter(|group| group.filter.matches(event))
                .flat_map(|group| group.callbacks.iter().map(|(_, cb)| cb.clone()))
                .collect()
        };

        for callback in &matching {
            callback(event);
        }
        matching.len()
    }

    /// Registered filter keys, sorted
    pub fn filter_keys(&self) -> Vec<String> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = groups.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Total callbacks across all keys
    pub fn subscriber_count(&self) -> usize {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.values().map(|g| g.callbacks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }
}

/// Handle to one registered callback
#[derive(Debug)]
#[must_use = "a subscription is only removed through unsubscribe()"]
pub struct Subscription {
    key: String,
    id: Uuid,
    groups: Weak<Groups>,
}

impl Subscription {
    pub fn filter_key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove this callback; the key goes with its last callback.
    ///
    /// Returns false when the bus is gone or the callback was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(groups) = self.groups.upgrade() else {
            return false;
        };
        let mut groups = groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(group) = groups.get_mut(&self.key) else {
            return false;
        };

        let before = group.callbacks.len();
        group.callbacks.retain(|(id, _)| *id != self.id);
        let removed = group.callbacks.len() < before;
        if group.callbacks.is_empty() {
            groups.remove(&self.key);
        }
        tracing::debug!(filter = %self.key, id = %self.id, "Unsubscribed");
        removed
    }
}
