//! In-memory repository backend

use super::types::{ListRecordsPage, RepoDescription};
use super::RepositoryApi;
use crate::error::{Error, Result};
use crate::model::RawRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    /// handle -> did
    handles: HashMap<String, String>,
    /// did -> collection -> records in listing order
    repos: HashMap<String, BTreeMap<String, Vec<RawRecord>>>,
    failing: HashSet<String>,
    session_expired: bool,
}

/// Repository held entirely in memory.
///
/// Supports failure injection per collection, an expired session, a
/// backend without `describe_repo`, and a cursor that never terminates.
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
    describe_supported: AtomicBool,
    looping_cursor: AtomicBool,
    list_calls: AtomicUsize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            describe_supported: AtomicBool::new(true),
            looping_cursor: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Register a handle for a DID
    pub async fn add_handle(&self, handle: &str, did: &str) {
        self.state
            .write()
            .await
            .handles
            .insert(handle.to_string(), did.to_string());
    }

    /// Append a record; returns its URI
    pub async fn insert(&self, did: &str, collection: &str, rkey: &str, value: Value) -> String {
        let uri = format!("at://{}/{}/{}", did, collection, rkey);
        let record = RawRecord {
            uri: uri.clone(),
            cid: content_id(&value),
            value,
            indexed_at: None,
        };

        let mut state = self.state.write().await;
        let records = state
            .repos
            .entry(did.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        match records.iter_mut().find(|r| r.uri == uri) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        uri
    }

    /// Create an empty repository so that `describe_repo` succeeds for it
    pub async fn ensure_repo(&self, did: &str) {
        self.state
            .write()
            .await
            .repos
            .entry(did.to_string())
            .or_default();
    }

    /// Make every call touching `collection` fail with a transient error
    pub async fn set_failing(&self, collection: &str, failing: bool) {
        let mut state = self.state.write().await;
        if failing {
            state.failing.insert(collection.to_string());
        } else {
            state.failing.remove(collection);
        }
    }

    /// Make every call fail with a session error
    pub async fn set_session_expired(&self, expired: bool) {
        self.state.write().await.session_expired = expired;
    }

    pub fn set_describe_supported(&self, supported: bool) {
        self.describe_supported.store(supported, Ordering::SeqCst);
    }

    /// Always hand back a cursor, even past the last record
    pub fn set_looping_cursor(&self, looping: bool) {
        self.looping_cursor.store(looping, Ordering::SeqCst);
    }

    /// Number of `list_records` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn resolve_did(state: &MemoryState, repo: &str) -> String {
        state
            .handles
            .get(repo)
            .cloned()
            .unwrap_or_else(|| repo.to_string())
    }

    fn check(state: &MemoryState, collection: Option<&str>) -> Result<()> {
        if state.session_expired {
            return Err(Error::Session("ExpiredToken: token has expired".to_string()));
        }
        if let Some(collection) = collection {
            if state.failing.contains(collection) {
                return Err(Error::Xrpc {
                    status: 502,
                    error: "UpstreamFailure".to_string(),
                    message: format!("injected failure for {}", collection),
                });
            }
        }
        Ok(())
    }
}

/// Deterministic stand-in for a content hash
fn content_id(value: &Value) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("bafy{:016x}", hasher.finish())
}

#[async_trait]
impl RepositoryApi for MemoryRepository {
    async fn resolve_handle(&self, handle: &str) -> Result<String> {
        let state = self.state.read().await;
        Self::check(&state, None)?;
        state.handles.get(handle).cloned().ok_or_else(|| Error::Xrpc {
            status: 400,
            error: "InvalidRequest".to_string(),
            message: format!("Unable to resolve handle: {}", handle),
        })
    }

    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ListRecordsPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Self::check(&state, Some(collection))?;

        let did = Self::resolve_did(&state, repo);
        let records = state
            .repos
            .get(&did)
            .and_then(|collections| collections.get(collection))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let start = cursor
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0)
            .min(records.len());
        let end = (start + limit.max(1) as usize).min(records.len());
        let page = records[start..end].to_vec();

        let cursor = if self.looping_cursor.load(Ordering::SeqCst) {
            Some(if end >= records.len() { 0 } else { end }.to_string())
        } else if end < records.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(ListRecordsPage {
            records: page,
            cursor,
        })
    }

    async fn get_record(&self, repo: &str, collection: &str, rkey: &str) -> Result<RawRecord> {
        let state = self.state.read().await;
        Self::check(&state, Some(collection))?;

        let did = Self::resolve_did(&state, repo);
        let uri = format!("at://{}/{}/{}", did, collection, rkey);
        state
            .repos
            .get(&did)
            .and_then(|collections| collections.get(collection))
            .and_then(|records| records.iter().find(|r| r.uri == uri))
            .cloned()
            .ok_or_else(|| Error::Xrpc {
                status: 400,
                error: "RecordNotFound".to_string(),
                message: format!("Could not locate record: {}", uri),
            })
    }

    async fn describe_repo(&self, repo: &str) -> Result<RepoDescription> {
        if !self.supports_describe() {
            return Err(Error::Xrpc {
                status: 501,
                error: "MethodNotImplemented".to_string(),
                message: "describeRepo is not available".to_string(),
            });
        }

        let state = self.state.read().await;
        Self::check(&state, None)?;

        let did = Self::resolve_did(&state, repo);
        let collections = state.repos.get(&did).ok_or_else(|| Error::Xrpc {
            status: 400,
            error: "RepoNotFound".to_string(),
            message: format!("Could not find repo: {}", repo),
        })?;
        let handle = state
            .handles
            .iter()
            .find(|(_, d)| **d == did)
            .map(|(h, _)| h.clone())
            .unwrap_or_default();

        Ok(RepoDescription {
            handle_is_correct: !handle.is_empty(),
            handle,
            did,
            collections: collections
                .iter()
                .filter(|(_, records)| !records.is_empty())
                .map(|(name, _)| name.clone())
                .collect(),
        })
    }

    fn supports_describe(&self) -> bool {
        self.describe_supported.load(Ordering::SeqCst)
    }
}
