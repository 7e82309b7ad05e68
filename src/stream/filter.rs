//! Subscription filter keys

use crate::model::{Operation, StreamEvent};

/// Parsed form of a filter key.
///
/// `$type:<shape>`, `collection:<name>` and `operation:<op>` are recognised;
/// any other key is compared against the event's shape id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    ShapeId(String),
    Collection(String),
    Operation(Operation),
    /// `operation:` with an unknown operation name; matches nothing
    Never,
}

impl EventFilter {
    pub fn parse(key: &str) -> Self {
        if let Some(shape) = key.strip_prefix("$type:") {
            Self::ShapeId(shape.to_string())
        } else if let Some(collection) = key.strip_prefix("collection:") {
            Self::Collection(collection.to_string())
        } else if let Some(op) = key.strip_prefix("operation:") {
            match op.parse() {
                Ok(op) => Self::Operation(op),
                Err(e) => {
                    tracing::warn!("Filter {} will never match: {}", key, e);
                    Self::Never
                }
            }
        } else {
            Self::ShapeId(key.to_string())
        }
    }

    /// Deletes carry no shape, so only collection and operation filters
    /// can match them
    pub fn matches(&self, event: &StreamEvent) -> bool {
        match self {
            Self::ShapeId(shape) => event.shape_id.as_deref() == Some(shape.as_str()),
            Self::Collection(collection) => event.collection == *collection,
            Self::Operation(op) => event.operation == *op,
            Self::Never => false,
        }
    }
}
