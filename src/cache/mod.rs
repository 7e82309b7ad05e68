//! TTL key/value cache with explicit stale access
//!
//! `get` only ever returns entries younger than the TTL. Expired entries are
//! kept until overwritten so a caller whose refresh failed can fetch the last
//! known value through `entry` and decide to serve it stale.

mod store;

pub use store::{Cache, CacheEntry, DEFAULT_TTL};
