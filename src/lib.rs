//! atsync - Repository synchronization engine for federated record stores
//!
//! atsync turns a user's schema-less record repository on a decentralized
//! social protocol into typed, cached and live-updating content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Consumers                                │
//! └───────┬──────────────────────┬───────────────────────┬───────────┘
//!         │                      │                       │
//! ┌───────▼────────┐   ┌─────────▼─────────┐   ┌─────────▼─────────┐
//! │ OverviewLoader │   │   TypeRegistry    │   │   SharedStream    │
//! │ snapshot/live  │   │ shape -> renderer │   │ refcounted socket │
//! └───────┬────────┘   └─────────▲─────────┘   └─────────┬─────────┘
//!         │                      │ seeds                 │
//! ┌───────▼────────┐   ┌─────────┴─────────┐   ┌─────────▼─────────┐
//! │  Synchronizer  ├──►│  DiscoveryEngine  │   │   StreamClient    │
//! │ TTL caches,    │   │ probe / reported  │   │ Jetstream decode  │
//! │ stale fallback │   └─────────┬─────────┘   └─────────┬─────────┘
//! └───────┬────────┘             │                       │
//!         └──────────┬───────────┘             ┌─────────▼─────────┐
//!          ┌─────────▼─────────┐               │  SubscriptionBus  │
//!          │  RepositoryApi    │               │ filtered fan-out  │
//!          │  (XRPC over HTTP) │               └───────────────────┘
//!          └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`]: Record envelopes, shape descriptors and stream events
//! - [`cache`]: TTL cache with explicit stale access
//! - [`xrpc`]: Upstream repository protocol client
//! - [`discovery`]: Collection and record-shape discovery
//! - [`registry`]: Shape capabilities with a generic fallback
//! - [`sync`]: Cache-first synchronizer, statistics, overviews and the live feed
//! - [`snapshot`]: Build-time snapshot reader
//! - [`stream`]: Live event stream and subscription bus
//! - [`views`]: Derived views such as galleries
//! - [`config`]: Configuration management

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod registry;
pub mod snapshot;
pub mod stream;
pub mod sync;
pub mod views;
pub mod xrpc;

pub use config::AtSyncConfig;
pub use error::{Error, Result};
