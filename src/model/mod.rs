//! Shared vocabulary: record envelopes, collection and shape descriptors,
//! and live stream events.
//!
//! These are plain data types. Behaviour lives in the discovery, registry,
//! sync and stream modules.

pub mod event;
pub mod record;
pub mod shape;
pub mod uri;

pub use event::{Operation, StreamEvent};
pub use record::{RawRecord, RecordEnvelope, UNKNOWN_SHAPE};
pub use shape::{CollectionDescriptor, PropertySketch, ShapeDescriptor};
pub use uri::AtUri;
