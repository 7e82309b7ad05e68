//! `at://` resource identifiers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const SCHEME: &str = "at://";

/// A parsed `at://<authority>/<collection>/<rkey>` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtUri {
    /// Repository DID or handle
    pub authority: String,
    /// Collection NSID
    pub collection: String,
    /// Record key
    pub rkey: String,
}

impl AtUri {
    pub fn new(
        authority: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    /// Parse a full record URI. Authority-only or collection-only URIs are
    /// rejected because a record envelope always addresses one record.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Internal(format!("Not an at:// URI: {}", uri)))?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);

        let mut parts = rest.splitn(3, '/');
        let authority = parts.next().unwrap_or_default();
        let collection = parts.next().unwrap_or_default();
        let rkey = parts.next().unwrap_or_default();

        if authority.is_empty() || collection.is_empty() || rkey.is_empty() || rkey.contains('/')
        {
            return Err(Error::Internal(format!("Malformed record URI: {}", uri)));
        }

        Ok(Self::new(authority, collection, rkey))
    }
}

impl std::fmt::Display for AtUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}/{}/{}",
            SCHEME, self.authority, self.collection, self.rkey
        )
    }
}

impl std::str::FromStr for AtUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_uri() {
        let uri = AtUri::parse("at://did:plc:abc123/app.bsky.feed.post/3kxyz").unwrap();
        assert_eq!(uri.authority, "did:plc:abc123");
        assert_eq!(uri.collection, "app.bsky.feed.post");
        assert_eq!(uri.rkey, "3kxyz");
        assert_eq!(uri.to_string(), "at://did:plc:abc123/app.bsky.feed.post/3kxyz");
    }

    #[test]
    fn test_parse_strips_query_and_fragment() {
        let uri = AtUri::parse("at://alice.test/com.whtwnd.blog.entry/abc?x=1").unwrap();
        assert_eq!(uri.rkey, "abc");
    }

    #[test]
    fn test_parse_rejects_partial_uris() {
        assert!(AtUri::parse("https://bsky.app/profile/alice").is_err());
        assert!(AtUri::parse("at://did:plc:abc123").is_err());
        assert!(AtUri::parse("at://did:plc:abc123/app.bsky.feed.post").is_err());
        assert!(AtUri::parse("at://did:plc:abc123/app.bsky.feed.post/a/b").is_err());
    }
}
