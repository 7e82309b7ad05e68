//! Collection and record-shape descriptors produced by discovery

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Structural sketch of one property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum PropertySketch {
    Null,
    Undefined,
    String,
    Number,
    Boolean,
    /// Array whose first element has the given sketch
    Array(Box<PropertySketch>),
    /// Array with no element to sample
    EmptyArray,
    /// Nested object, walked up to the depth cap
    Object(BTreeMap<String, PropertySketch>),
    /// Value beyond the depth cap or otherwise unsketchable
    Opaque,
}

impl PropertySketch {
    /// Short type label, e.g. `string`, `number[]`, `object`
    pub fn type_label(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Undefined => "undefined".to_string(),
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Array(inner) => format!("{}[]", inner.type_label()),
            Self::EmptyArray => "unknown[]".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Opaque => "unknown".to_string(),
        }
    }
}

/// One distinct record shape found within a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeDescriptor {
    pub shape_id: String,
    pub collection: String,
    pub service: String,
    pub properties: BTreeMap<String, PropertySketch>,
    /// Records of this shape seen in the sample
    pub sample_count: usize,
    pub sample_value: Value,
    pub description: String,
}

impl ShapeDescriptor {
    /// PascalCase type name derived from the shape id.
    ///
    /// `app.bsky.feed.post` becomes `AppBskyFeedPost`; for a fragment id
    /// such as `app.bsky.actor.profile#grainImageGallery` the fragment wins.
    pub fn type_name(&self) -> String {
        if let Some((_, fragment)) = self.shape_id.split_once('#') {
            if !fragment.is_empty() {
                return capitalize(fragment);
            }
        }
        self.shape_id
            .split(['.', '-', '_'])
            .filter(|p| !p.is_empty())
            .map(capitalize)
            .collect()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Snapshot of one collection, re-derived on every discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    pub name: String,
    pub service: String,
    /// Records observed, capped by the probe size
    pub record_count: usize,
    pub sample_shapes: BTreeSet<String>,
    pub shapes: Vec<ShapeDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(id: &str) -> ShapeDescriptor {
        ShapeDescriptor {
            shape_id: id.to_string(),
            collection: "c".to_string(),
            service: "unknown".to_string(),
            properties: BTreeMap::new(),
            sample_count: 1,
            sample_value: Value::Null,
            description: String::new(),
        }
    }

    #[test]
    fn test_type_name() {
        assert_eq!(shape("app.bsky.feed.post").type_name(), "AppBskyFeedPost");
        assert_eq!(
            shape("app.bsky.actor.profile#grainImageGallery").type_name(),
            "GrainImageGallery"
        );
        assert_eq!(
            shape("social.grain.photo-exif").type_name(),
            "SocialGrainPhotoExif"
        );
    }

    #[test]
    fn test_type_labels() {
        assert_eq!(
            PropertySketch::Array(Box::new(PropertySketch::String)).type_label(),
            "string[]"
        );
        assert_eq!(PropertySketch::EmptyArray.type_label(), "unknown[]");
        assert_eq!(PropertySketch::Object(BTreeMap::new()).type_label(), "object");
    }

    #[test]
    fn test_sketch_serialization() {
        let sketch = PropertySketch::Array(Box::new(PropertySketch::Number));
        let json = serde_json::to_string(&sketch).unwrap();
        assert_eq!(json, r#"{"kind":"array","of":{"kind":"number"}}"#);
    }
}
