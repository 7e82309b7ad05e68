//! Upstream repository protocol
//!
//! [`RepositoryApi`] is the seam between the sync core and a personal data
//! server. [`XrpcClient`] speaks XRPC over HTTP; [`MemoryRepository`] keeps
//! everything in memory for tests and offline runs.

mod client;
mod memory;
mod types;

pub use client::XrpcClient;
pub use memory::MemoryRepository;
pub use types::{ListRecordsPage, RepoDescription, XrpcErrorBody};

use crate::error::Result;
use crate::model::RawRecord;
use async_trait::async_trait;

/// Operations the core needs from a remote repository
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// Resolve a handle to its stable DID
    async fn resolve_handle(&self, handle: &str) -> Result<String>;

    /// List one page of a collection
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ListRecordsPage>;

    /// Fetch one record by collection and key
    async fn get_record(&self, repo: &str, collection: &str, rkey: &str) -> Result<RawRecord>;

    /// Describe a repository: handle and authoritative collection list
    async fn describe_repo(&self, repo: &str) -> Result<RepoDescription>;

    /// Whether `describe_repo` is available on this backend
    fn supports_describe(&self) -> bool {
        true
    }
}
