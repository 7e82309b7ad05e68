//! Blob references and download URLs

use serde_json::Value;

/// Service used for blob URLs when none is configured
pub const DEFAULT_BLOB_SERVICE: &str = "https://bsky.social";

/// `com.atproto.sync.getBlob` URL for a blob in a repository
pub fn blob_url(service: &str, did: &str, cid: &str) -> String {
    let base = format!(
        "{}/xrpc/com.atproto.sync.getBlob",
        service.trim_end_matches('/')
    );
    match reqwest::Url::parse_with_params(&base, &[("did", did), ("cid", cid)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?did={}&cid={}", base, did, cid),
    }
}

/// CID of a blob reference.
///
/// Accepts a bare CID string, a `{ "$link": cid }` link, or a blob object
/// whose `ref` is either of those.
pub fn extract_blob_cid(reference: &Value) -> Option<String> {
    match reference {
        Value::String(cid) if !cid.is_empty() => Some(cid.clone()),
        Value::Object(map) => {
            if let Some(link) = map.get("$link").and_then(Value::as_str) {
                return Some(link.to_string()).filter(|l| !l.is_empty());
            }
            map.get("ref").and_then(extract_blob_cid)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_url() {
        assert_eq!(
            blob_url(DEFAULT_BLOB_SERVICE, "did:plc:abc", "bafkrei"),
            "https://bsky.social/xrpc/com.atproto.sync.getBlob?did=did%3Aplc%3Aabc&cid=bafkrei"
        );
        assert!(blob_url("https://pds.example/", "d", "c").starts_with("https://pds.example/xrpc/"));
    }

    #[test]
    fn test_extract_blob_cid() {
        assert_eq!(extract_blob_cid(&json!("bafy1")).as_deref(), Some("bafy1"));
        assert_eq!(
            extract_blob_cid(&json!({"$link": "bafy2"})).as_deref(),
            Some("bafy2")
        );
        assert_eq!(
            extract_blob_cid(&json!({
                "$type": "blob",
                "ref": {"$link": "bafy3"},
                "mimeType": "image/jpeg",
                "size": 1234
            }))
            .as_deref(),
            Some("bafy3")
        );
        assert!(extract_blob_cid(&json!("")).is_none());
        assert!(extract_blob_cid(&json!(42)).is_none());
        assert!(extract_blob_cid(&json!({"size": 1})).is_none());
    }
}
