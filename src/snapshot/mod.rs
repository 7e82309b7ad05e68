//! Build-time snapshot artifact
//!
//! A directory of JSON documents written by an external build step. It is
//! read once at startup and served before any live fetch completes.

mod store;

pub use store::{SnapshotMetadata, SnapshotStore};
