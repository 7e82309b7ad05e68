//! Collection and record-shape discovery
//!
//! Learns which collections a repository holds and which record shapes
//! live in each, either by asking the repository (`describeRepo`) or by
//! probing a prioritised catalog of candidate collection names.

mod catalog;
mod engine;
mod service;
mod sketch;

pub use catalog::CollectionCatalog;
pub use engine::{DiscoveryEngine, RepositoryAnalysis};
pub use service::infer_service;
pub use sketch::{extract_properties, sketch_value};
