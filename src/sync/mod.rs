//! Repository synchronization
//!
//! The [`Synchronizer`] fetches records cache-first with stale fallback,
//! paginates collections under a size cap, merges recent activity across
//! priority collections and computes repository statistics.
//! [`OverviewLoader`] picks between a build-time snapshot and the live
//! synchronizer behind the [`RecordSource`] seam. [`LiveFeed`] keeps a
//! repository's recent activity current from the live stream.

mod feed;
mod overview;
mod source;
mod stats;
mod synchronizer;
mod timestamp;

pub use feed::LiveFeed;
pub use overview::{DataOrigin, Overview, OverviewLoader};
pub use source::{RecordSource, SnapshotSource};
pub use stats::RepositoryStats;
pub use synchronizer::{select_recent, Synchronizer};
pub use timestamp::TimestampGuard;
