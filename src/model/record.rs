//! Record envelopes

use super::uri::AtUri;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape id assigned to records whose value carries no `$type`
pub const UNKNOWN_SHAPE: &str = "unknown";

/// A record exactly as the repository lists it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub indexed_at: Option<String>,
}

/// A typed, immutable view of one repository record.
///
/// `uri` encodes `(repository, collection, record key)`; `cid` changes
/// exactly when `value` does. `value` is opaque outside the registry layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    pub uri: String,
    pub cid: String,
    pub shape_id: String,
    pub collection: String,
    pub value: Value,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl RecordEnvelope {
    /// Build an envelope from a listed record.
    ///
    /// The timestamp is taken from `value.createdAt`, then `value.indexedAt`,
    /// then the listing's own `indexedAt`.
    pub fn from_raw(raw: RawRecord, collection: &str) -> Self {
        let shape_id = raw
            .value
            .get("$type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SHAPE)
            .to_string();

        let indexed_at = ["createdAt", "indexedAt"]
            .iter()
            .filter_map(|key| raw.value.get(*key).and_then(Value::as_str))
            .chain(raw.indexed_at.as_deref())
            .find_map(parse_timestamp);

        let collection = if collection.is_empty() {
            AtUri::parse(&raw.uri)
                .map(|u| u.collection)
                .unwrap_or_default()
        } else {
            collection.to_string()
        };

        Self {
            uri: raw.uri,
            cid: raw.cid,
            shape_id,
            collection,
            value: raw.value,
            indexed_at,
        }
    }

    /// Parsed form of `uri`, if well formed
    pub fn at_uri(&self) -> Option<AtUri> {
        AtUri::parse(&self.uri).ok()
    }

    /// Repository DID (or handle) owning this record
    pub fn repository_id(&self) -> Option<String> {
        self.at_uri().map(|u| u.authority)
    }

    /// Record key within the collection
    pub fn record_key(&self) -> Option<String> {
        self.at_uri().map(|u| u.rkey)
    }

    /// String field of the value, ignoring empty strings
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Parse an RFC 3339 timestamp, tolerating the missing-offset form some
/// clients emit.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
