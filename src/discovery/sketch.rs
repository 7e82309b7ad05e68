//! Property-type sketches of sample record values

use crate::model::PropertySketch;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sketch the top-level properties of a record value, skipping `$type`.
///
/// Nested objects are walked until `max_depth` object levels have been
/// opened; anything deeper is `Opaque`. A non-object value has no
/// properties.
pub fn extract_properties(value: &Value, max_depth: usize) -> BTreeMap<String, PropertySketch> {
    match value {
        Value::Object(map) if max_depth > 0 => sketch_object(map, 0, max_depth),
        _ => BTreeMap::new(),
    }
}

/// Sketch a single value as seen at the top level of a record
pub fn sketch_value(value: &Value, max_depth: usize) -> PropertySketch {
    sketch(value, 0, max_depth)
}

fn sketch_object(
    map: &Map<String, Value>,
    depth: usize,
    max_depth: usize,
) -> BTreeMap<String, PropertySketch> {
    map.iter()
        .filter(|(key, _)| key.as_str() != "$type")
        .map(|(key, value)| (key.clone(), sketch(value, depth, max_depth)))
        .collect()
}

fn sketch(value: &Value, depth: usize, max_depth: usize) -> PropertySketch {
    match value {
        Value::Null => PropertySketch::Null,
        Value::String(_) => PropertySketch::String,
        Value::Number(_) => PropertySketch::Number,
        Value::Bool(_) => PropertySketch::Boolean,
        Value::Array(items) => match items.first() {
            None => PropertySketch::EmptyArray,
            Some(_) if depth + 1 >= max_depth => PropertySketch::Array(Box::new(PropertySketch::Opaque)),
            Some(first) => PropertySketch::Array(Box::new(sketch(first, depth + 1, max_depth))),
        },
        Value::Object(map) => {
            if depth + 1 >= max_depth {
                PropertySketch::Opaque
            } else {
                PropertySketch::Object(sketch_object(map, depth + 1, max_depth))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_properties() {
        let props = extract_properties(
            &json!({
                "$type": "app.bsky.feed.post",
                "text": "hello",
                "count": 3,
                "pinned": false,
                "reply": null
            }),
            3,
        );
        assert!(!props.contains_key("$type"));
        assert_eq!(props["text"], PropertySketch::String);
        assert_eq!(props["count"], PropertySketch::Number);
        assert_eq!(props["pinned"], PropertySketch::Boolean);
        assert_eq!(props["reply"], PropertySketch::Null);
    }

    #[test]
    fn test_arrays() {
        let props = extract_properties(&json!({"langs": ["en"], "tags": []}), 3);
        assert_eq!(
            props["langs"],
            PropertySketch::Array(Box::new(PropertySketch::String))
        );
        assert_eq!(props["tags"], PropertySketch::EmptyArray);
    }

    #[test]
    fn test_depth_cap() {
        let value = json!({"a": {"b": {"c": {"d": 1}}}});
        let props = extract_properties(&value, 3);
        let PropertySketch::Object(a) = &props["a"] else {
            panic!("expected object");
        };
        let PropertySketch::Object(b) = &a["b"] else {
            panic!("expected object");
        };
        assert_eq!(b["c"], PropertySketch::Opaque);

        let shallow = extract_properties(&value, 1);
        assert_eq!(shallow["a"], PropertySketch::Opaque);
        assert!(extract_properties(&value, 0).is_empty());
    }

    #[test]
    fn test_non_object_has_no_properties() {
        assert!(extract_properties(&json!("text"), 3).is_empty());
        assert_eq!(sketch_value(&json!([1, 2]), 3).type_label(), "number[]");
    }
}
