//! Service inference from shape ids and collection names

/// Guess which application a shape or collection belongs to.
///
/// The shape id is consulted first, then the collection name.
pub fn infer_service(shape_id: &str, collection: &str) -> String {
    from_name(shape_id)
        .or_else(|| from_name(collection))
        .unwrap_or("unknown")
        .to_string()
}

fn from_name(name: &str) -> Option<&'static str> {
    if name.contains("grain") {
        Some("grain.social")
    } else if name.contains("tangled") {
        Some("sh.tangled")
    } else if name.contains("whtwnd") {
        Some("whtwnd.com")
    } else if name.contains("bsky") {
        Some("bsky.app")
    } else if name.contains("atproto") {
        Some("atproto")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_wins_over_collection() {
        assert_eq!(
            infer_service("social.grain.gallery", "app.bsky.feed.post"),
            "grain.social"
        );
    }

    #[test]
    fn test_collection_fallback() {
        assert_eq!(infer_service("unknown", "sh.tangled.feed.star"), "sh.tangled");
        assert_eq!(infer_service("", "app.bsky.feed.like"), "bsky.app");
        assert_eq!(infer_service("com.whtwnd.blog.entry", ""), "whtwnd.com");
        assert_eq!(infer_service("com.atproto.lexicon.schema", ""), "atproto");
    }

    #[test]
    fn test_unknown() {
        assert_eq!(infer_service("a.status.update", "a.status.update"), "unknown");
    }
}
