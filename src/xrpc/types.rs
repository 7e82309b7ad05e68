//! XRPC wire types

use crate::model::RawRecord;
use serde::{Deserialize, Serialize};

/// One page of `com.atproto.repo.listRecords`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsPage {
    #[serde(default)]
    pub records: Vec<RawRecord>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Response of `com.atproto.repo.describeRepo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDescription {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub handle_is_correct: bool,
}

/// Error body returned by XRPC endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Response of `com.atproto.identity.resolveHandle`
#[derive(Debug, Deserialize)]
pub(crate) struct ResolveHandleResponse {
    pub did: String,
}

/// Request body for `com.atproto.server.createSession`
#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Response of `com.atproto.server.createSession`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionTokens {
    pub access_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_records_page_deserialization() {
        let json = r#"{
            "records": [
                {"uri": "at://did:plc:a/app.bsky.feed.post/1", "cid": "bafy1", "value": {"$type": "app.bsky.feed.post", "text": "hello"}}
            ],
            "cursor": "1"
        }"#;
        let page: ListRecordsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.cursor.as_deref(), Some("1"));
        assert_eq!(page.records[0].value["text"], "hello");
    }

    #[test]
    fn test_describe_repo_deserialization() {
        let json = r#"{
            "handle": "alice.test",
            "did": "did:plc:a",
            "didDoc": {},
            "collections": ["app.bsky.feed.post", "app.bsky.feed.like"],
            "handleIsCorrect": true
        }"#;
        let desc: RepoDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.collections.len(), 2);
        assert!(desc.handle_is_correct);
    }

    #[test]
    fn test_session_tokens_deserialization() {
        let json = r#"{"accessJwt": "a.b.c", "refreshJwt": "d.e.f", "did": "did:plc:a", "handle": "alice.test"}"#;
        let tokens: SessionTokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.access_jwt, "a.b.c");
        assert_eq!(tokens.did, "did:plc:a");
    }
}
