//! atsync configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main atsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtSyncConfig {
    /// Upstream repository configuration
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Synchronizer configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Live stream configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Build-time snapshot configuration
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl AtSyncConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `ATSYNC_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(service) = std::env::var("ATSYNC_SERVICE") {
            self.repository.service = service;
        }
        if let Ok(identifier) = std::env::var("ATSYNC_IDENTIFIER") {
            self.repository.identifier = identifier;
        }
        if let Ok(did) = std::env::var("ATSYNC_DID") {
            self.repository.did = Some(did);
        }
        if let Some(ttl) = std::env::var("ATSYNC_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.cache.ttl_secs = ttl;
        }
        if let Ok(endpoint) = std::env::var("ATSYNC_STREAM_ENDPOINT") {
            self.stream.endpoint = endpoint;
        }
        if let Ok(dir) = std::env::var("ATSYNC_SNAPSHOT_DIR") {
            self.snapshot.dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.repository.identifier.trim().is_empty() {
            return Err(Error::Config(
                "repository.identifier must not be empty".to_string(),
            ));
        }
        reqwest::Url::parse(&self.repository.service).map_err(|e| {
            Error::Config(format!(
                "Invalid repository.service URL '{}': {}",
                self.repository.service, e
            ))
        })?;
        if self.discovery.batch_size == 0 {
            return Err(Error::Config(
                "discovery.batch_size must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.sync.page_size) {
            return Err(Error::Config(format!(
                "sync.page_size must be within 1..=100, got {}",
                self.sync.page_size
            )));
        }
        if self.sync.max_concurrency == 0 {
            return Err(Error::Config(
                "sync.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Upstream repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Personal data server base URL
    pub service: String,

    /// Handle or DID of the repository to synchronize
    pub identifier: String,

    /// Pinned DID (skips handle resolution when set)
    #[serde(default)]
    pub did: Option<String>,

    /// Name of the environment variable holding the app password.
    /// When unset, requests are made without a session.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            service: "https://bsky.social".to_string(),
            identifier: "bsky.app".to_string(),
            did: None,
            password_env: None,
            timeout_secs: 30,
        }
    }
}

impl RepositoryConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The identity to address: the pinned DID if any, else the identifier
    pub fn repository_id(&self) -> &str {
        self.did.as_deref().unwrap_or(&self.identifier)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// How discovery learns which collections exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Ask the repository when it supports it, otherwise probe
    #[default]
    Auto,
    /// Probe the candidate catalog only
    Probe,
    /// Use the repository-reported collection list only
    Reported,
}

/// A candidate collection name for probe-mode discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCandidate {
    /// Collection NSID
    pub name: String,

    /// Human description
    #[serde(default)]
    pub description: String,

    /// Owning service (e.g. "bsky.app")
    #[serde(default)]
    pub service: String,

    /// Higher priority is probed first
    #[serde(default)]
    pub priority: i32,

    /// Disabled candidates are never probed
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery mode
    #[serde(default)]
    pub mode: DiscoveryMode,

    /// Probes issued concurrently per batch
    pub batch_size: usize,

    /// Pause between probe batches in milliseconds
    pub batch_delay_ms: u64,

    /// Listing size used for an existence probe (caps the reported count)
    pub probe_limit: u32,

    /// Records sampled per collection for shape sketches
    pub sample_size: u32,

    /// Maximum nesting depth of a property sketch
    pub max_depth: usize,

    /// Extra candidates appended to the built-in catalog
    #[serde(default)]
    pub candidates: Vec<CollectionCandidate>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Auto,
            batch_size: 10,
            batch_delay_ms: 100,
            probe_limit: 10,
            sample_size: 10,
            max_depth: 3,
            candidates: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Timestamp plausibility rules applied to activity feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampGuardConfig {
    /// Drop records without a timestamp
    pub reject_missing: bool,

    /// Drop records stamped with exactly the current instant
    pub reject_now: bool,

    /// Drop records stamped after the current instant
    pub reject_future: bool,

    /// Drop records older than this many days (None = no limit)
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for TimestampGuardConfig {
    fn default() -> Self {
        Self {
            reject_missing: true,
            reject_now: true,
            reject_future: true,
            max_age_days: Some(365),
        }
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Collections merged into the recent-activity feed
    pub priority_collections: Vec<String>,

    /// Records fetched per priority collection for the activity feed
    pub activity_per_collection: u32,

    /// Pause before the first burst of concurrent requests in milliseconds
    pub burst_delay_ms: u64,

    /// Page size for paginated bulk fetches (upstream maximum is 100)
    pub page_size: u32,

    /// Safety cap for paginated bulk fetches
    pub max_total: usize,

    /// Concurrent requests for fan-out over discovered collections
    pub max_concurrency: usize,

    /// Timestamp plausibility rules
    #[serde(default)]
    pub timestamp_guard: TimestampGuardConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            priority_collections: vec![
                "app.bsky.feed.post".to_string(),
                "app.bsky.feed.like".to_string(),
                "app.bsky.feed.repost".to_string(),
                "app.bsky.graph.follow".to_string(),
                "com.whtwnd.blog.entry".to_string(),
            ],
            activity_per_collection: 5,
            burst_delay_ms: 100,
            page_size: 100,
            max_total: 10_000,
            max_concurrency: 8,
            timestamp_guard: TimestampGuardConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn burst_delay(&self) -> Duration {
        Duration::from_millis(self.burst_delay_ms)
    }
}

/// Live stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Jetstream subscribe endpoint
    pub endpoint: String,

    /// Collections of interest
    pub wanted_collections: Vec<String>,

    /// Repository allow-list (empty = all repositories)
    #[serde(default)]
    pub wanted_dids: Vec<String>,

    /// Resume cursor in microseconds
    #[serde(default)]
    pub cursor: Option<i64>,

    /// Capacity of the lifecycle notification channel
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://jetstream2.us-east.bsky.network/subscribe".to_string(),
            wanted_collections: vec![
                "app.bsky.feed.post".to_string(),
                "a.status.update".to_string(),
                "social.grain.gallery".to_string(),
                "social.grain.gallery.item".to_string(),
                "social.grain.photo".to_string(),
                "com.whtwnd.blog.entry".to_string(),
            ],
            wanted_dids: Vec::new(),
            cursor: None,
            channel_capacity: 64,
        }
    }
}

/// Build-time snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory holding the snapshot JSON documents
    pub dir: PathBuf,

    /// Age after which a snapshot counts as stale, in seconds
    pub stale_after_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            stale_after_secs: 3600,
        }
    }
}

impl SnapshotConfig {
    /// Default snapshot directory (~/.atsync/snapshot/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".atsync")
            .join("snapshot")
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}
