//! Text helpers shared by capabilities

/// Truncate to at most `max_chars` characters, appending `...` when cut
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

/// Abbreviate a DID for display: `did:plc:abcdefghijk` becomes `abcdefgh...`.
/// Anything that is not a DID is returned unchanged.
pub fn short_did(did: &str) -> String {
    if !did.starts_with("did:") {
        return did.to_string();
    }
    match did.split(':').nth(2) {
        Some(id) if !id.is_empty() => format!("{}...", id.chars().take(8).collect::<String>()),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_text("héllo wörld", 7), "héllo w...");
        assert_eq!(truncate_text("🦀🦀🦀", 2), "🦀🦀...");
    }

    #[test]
    fn test_short_did() {
        assert_eq!(short_did("did:plc:abcdefghijklmnop"), "abcdefgh...");
        assert_eq!(short_did("did:web"), "unknown");
        assert_eq!(short_did("alice.test"), "alice.test");
    }
}
