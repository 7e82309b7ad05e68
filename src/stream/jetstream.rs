//! Jetstream wire format

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::model::{Operation, StreamEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to ask the stream for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub wanted_collections: Vec<String>,
    /// Allow-list of repositories; empty means every repository
    pub wanted_dids: Vec<String>,
    /// Resume point in microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,
}

impl SubscribeRequest {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            wanted_collections: config.wanted_collections.clone(),
            wanted_dids: config.wanted_dids.clone(),
            cursor: config.cursor,
        }
    }

    /// The `options_update` message sent once a connection is open
    pub fn options_update(&self) -> Result<String> {
        let message = OptionsUpdate {
            kind: "options_update",
            payload: OptionsPayload {
                wanted_collections: &self.wanted_collections,
                wanted_dids: &self.wanted_dids,
                max_message_size_bytes: 0,
            },
        };
        Ok(serde_json::to_string(&message)?)
    }
}

#[derive(Serialize)]
struct OptionsUpdate<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: OptionsPayload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptionsPayload<'a> {
    wanted_collections: &'a [String],
    wanted_dids: &'a [String],
    max_message_size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct Frame {
    did: String,
    time_us: i64,
    kind: String,
    #[serde(default)]
    commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
struct Commit {
    operation: String,
    collection: String,
    rkey: String,
    #[serde(default)]
    record: Option<Value>,
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for identity and account frames, which carry no
/// record change.
pub fn decode_frame(text: &str) -> Result<Option<StreamEvent>> {
    let frame: Frame = serde_json::from_str(text)?;
    if frame.kind != "commit" {
        return Ok(None);
    }

    let commit = frame
        .commit
        .ok_or_else(|| Error::Stream(format!("commit frame from {} has no commit", frame.did)))?;
    let operation: Operation = commit.operation.parse().map_err(Error::Stream)?;

    let record_value = match operation {
        Operation::Delete => None,
        _ => commit.record,
    };
    let shape_id = record_value.as_ref().map(|record| {
        record
            .get("$type")
            .and_then(Value::as_str)
            .unwrap_or(&commit.collection)
            .to_string()
    });

    Ok(Some(StreamEvent {
        uri: format!("at://{}/{}/{}", frame.did, commit.collection, commit.rkey),
        repository_id: frame.did,
        collection: commit.collection,
        shape_id,
        operation,
        record_value,
        received_at_micros: frame.time_us,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_create() {
        let text = r#"{
            "did": "did:plc:alice",
            "time_us": 1725911162329308,
            "kind": "commit",
            "commit": {
                "rev": "3l3qo2vutsw2b",
                "operation": "create",
                "collection": "app.bsky.feed.post",
                "rkey": "3l3qo2vuowo2b",
                "record": {"$type": "app.bsky.feed.post", "text": "hello"},
                "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
            }
        }"#;
        let event = decode_frame(text).unwrap().unwrap();
        assert_eq!(event.repository_id, "did:plc:alice");
        assert_eq!(event.operation, Operation::Create);
        assert_eq!(event.shape_id.as_deref(), Some("app.bsky.feed.post"));
        assert_eq!(event.uri, "at://did:plc:alice/app.bsky.feed.post/3l3qo2vuowo2b");
        assert_eq!(event.received_at_micros, 1725911162329308);
        assert_eq!(event.record_value.unwrap()["text"], "hello");
    }

    #[test]
    fn test_decode_delete_has_no_record() {
        let text = r#"{"did": "did:plc:alice", "time_us": 1, "kind": "commit",
            "commit": {"operation": "delete", "collection": "app.bsky.feed.like", "rkey": "x"}}"#;
        let event = decode_frame(text).unwrap().unwrap();
        assert!(event.is_delete());
        assert!(event.record_value.is_none());
        assert!(event.shape_id.is_none());
    }

    #[test]
    fn test_non_commit_frames_ignored() {
        let text = r#"{"did": "did:plc:alice", "time_us": 2, "kind": "identity",
            "identity": {"did": "did:plc:alice", "handle": "alice.test", "seq": 1}}"#;
        assert!(decode_frame(text).unwrap().is_none());
    }

    #[test]
    fn test_malformed_frames_error() {
        assert!(decode_frame("not json").is_err());
        let bad_op = r#"{"did": "d", "time_us": 1, "kind": "commit",
            "commit": {"operation": "upsert", "collection": "c", "rkey": "r"}}"#;
        assert!(matches!(decode_frame(bad_op), Err(Error::Stream(_))));
    }

    #[test]
    fn test_options_update_message() {
        let request = SubscribeRequest {
            wanted_collections: vec!["app.bsky.feed.post".to_string()],
            wanted_dids: vec!["did:plc:alice".to_string()],
            cursor: None,
        };
        let message: Value = serde_json::from_str(&request.options_update().unwrap()).unwrap();
        assert_eq!(message["type"], "options_update");
        assert_eq!(message["payload"]["wantedCollections"][0], "app.bsky.feed.post");
        assert_eq!(message["payload"]["wantedDids"][0], "did:plc:alice");
    }
}
