//! Built-in capabilities and the generic fallback

use super::capability::{profile_link, PresentationMode, ShapeCapability, NO_CONTENT};
use super::text::{short_did, truncate_text};
use crate::model::{AtUri, RecordEnvelope, ShapeDescriptor};
use serde_json::{json, Map, Value};

const ALL_MODES: &[PresentationMode] = &[
    PresentationMode::Compact,
    PresentationMode::Expanded,
    PresentationMode::Full,
];
const CARD_MODES: &[PresentationMode] = &[PresentationMode::Compact, PresentationMode::Expanded];

/// Longest raw JSON excerpt shown for an unsupported record
const RAW_SUMMARY_CHARS: usize = 200;

fn rkey(record: &RecordEnvelope) -> String {
    record.record_key().unwrap_or_default()
}

fn handle(record: &RecordEnvelope) -> String {
    record.repository_id().unwrap_or_default()
}

fn metadata(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// `subject.uri` of a like or repost, if it is a well-formed record URI
fn subject_uri(record: &RecordEnvelope) -> Option<AtUri> {
    record
        .value
        .get("subject")
        .and_then(|s| s.get("uri"))
        .and_then(Value::as_str)
        .and_then(|uri| AtUri::parse(uri).ok())
}

fn subject_post_link(record: &RecordEnvelope) -> String {
    match subject_uri(record) {
        Some(uri) => format!(
            "https://bsky.app/profile/{}/post/{}",
            uri.authority, uri.rkey
        ),
        None => profile_link(record),
    }
}

fn subject_link_text(record: &RecordEnvelope) -> String {
    if subject_uri(record).is_some() {
        "View Original Post on Bluesky →".to_string()
    } else {
        "View Profile on Bluesky →".to_string()
    }
}

// ============================================================================
// Bluesky
// ============================================================================

/// `app.bsky.feed.post`
pub struct PostCapability;

impl ShapeCapability for PostCapability {
    fn shape_id(&self) -> &str {
        "app.bsky.feed.post"
    }

    fn display_name(&self) -> &str {
        "Post"
    }

    fn icon(&self) -> &str {
        "📝"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        ALL_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Post".to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        record.str_field("text").unwrap_or(NO_CONTENT).to_string()
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        format!(
            "https://bsky.app/profile/{}/post/{}",
            handle(record),
            rkey(record)
        )
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "View Post on Bluesky →".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        let count = |key: &str| record.value.get(key).and_then(Value::as_u64).unwrap_or(0);
        metadata(vec![
            ("replyCount", json!(count("replyCount"))),
            ("repostCount", json!(count("repostCount"))),
            ("likeCount", json!(count("likeCount"))),
            (
                "langs",
                record.value.get("langs").cloned().unwrap_or(json!([])),
            ),
        ])
    }
}

/// `app.bsky.feed.like`
pub struct LikeCapability;

impl ShapeCapability for LikeCapability {
    fn shape_id(&self) -> &str {
        "app.bsky.feed.like"
    }

    fn display_name(&self) -> &str {
        "Like"
    }

    fn icon(&self) -> &str {
        "❤️"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Like".to_string()
    }

    fn extract_content(&self, _record: &RecordEnvelope) -> String {
        "Liked a post".to_string()
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        subject_post_link(record)
    }

    fn extract_link_text(&self, record: &RecordEnvelope) -> String {
        subject_link_text(record)
    }

    fn extract_description(&self, _record: &RecordEnvelope) -> String {
        "❤️ Liked a post".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![(
            "subjectUri",
            subject_uri(record).map_or(Value::Null, |u| json!(u.to_string())),
        )])
    }
}

/// `app.bsky.feed.repost`
pub struct RepostCapability;

impl ShapeCapability for RepostCapability {
    fn shape_id(&self) -> &str {
        "app.bsky.feed.repost"
    }

    fn display_name(&self) -> &str {
        "Repost"
    }

    fn icon(&self) -> &str {
        "🔄"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Repost".to_string()
    }

    fn extract_content(&self, _record: &RecordEnvelope) -> String {
        "Reposted a post".to_string()
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        subject_post_link(record)
    }

    fn extract_link_text(&self, record: &RecordEnvelope) -> String {
        subject_link_text(record)
    }

    fn extract_description(&self, _record: &RecordEnvelope) -> String {
        "🔄 Reposted a post".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![(
            "subjectUri",
            subject_uri(record).map_or(Value::Null, |u| json!(u.to_string())),
        )])
    }
}

/// `app.bsky.graph.follow`
pub struct FollowCapability;

impl ShapeCapability for FollowCapability {
    fn shape_id(&self) -> &str {
        "app.bsky.graph.follow"
    }

    fn display_name(&self) -> &str {
        "Follow"
    }

    fn icon(&self) -> &str {
        "👥"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Follow".to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        match record.str_field("subject") {
            Some(did) => format!("Followed user ({})", short_did(did)),
            None => "Followed someone".to_string(),
        }
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "View Profile on Bluesky →".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![(
            "followedDid",
            record.str_field("subject").map_or(Value::Null, |s| json!(s)),
        )])
    }
}

/// `app.bsky.actor.profile`. Profile timestamps are unreliable, so
/// profiles stay out of activity feeds.
pub struct ProfileCapability;

impl ShapeCapability for ProfileCapability {
    fn shape_id(&self) -> &str {
        "app.bsky.actor.profile"
    }

    fn display_name(&self) -> &str {
        "Profile Update"
    }

    fn icon(&self) -> &str {
        "👤"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn show_in_activity_feed(&self) -> bool {
        false
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Profile Update".to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        match record.str_field("displayName") {
            Some(name) => format!("Updated profile: {}", name),
            None => "Updated profile".to_string(),
        }
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "View Profile on Bluesky →".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![
            (
                "displayName",
                record.str_field("displayName").map_or(Value::Null, |s| json!(s)),
            ),
            (
                "description",
                record.str_field("description").map_or(Value::Null, |s| json!(s)),
            ),
        ])
    }
}

// ============================================================================
// Other services
// ============================================================================

/// `com.whtwnd.blog.entry`
pub struct BlogEntryCapability;

impl ShapeCapability for BlogEntryCapability {
    fn shape_id(&self) -> &str {
        "com.whtwnd.blog.entry"
    }

    fn display_name(&self) -> &str {
        "Blog Post"
    }

    fn icon(&self) -> &str {
        "📰"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        ALL_MODES
    }

    fn show_in_content_feed(&self) -> bool {
        true
    }

    fn extract_title(&self, record: &RecordEnvelope) -> String {
        record.str_field("title").unwrap_or("Untitled Post").to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        record
            .str_field("content")
            .or_else(|| record.str_field("text"))
            .unwrap_or(NO_CONTENT)
            .to_string()
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        format!("https://whtwnd.com/{}/{}", handle(record), rkey(record))
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "Read on WhiteWind →".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        let words = record
            .str_field("content")
            .map_or(0, |c| c.split_whitespace().count());
        metadata(vec![
            (
                "visibility",
                json!(record.str_field("visibility").unwrap_or("public")),
            ),
            ("wordCount", json!(words)),
        ])
    }
}

/// `social.grain.gallery`
pub struct GalleryCapability;

impl ShapeCapability for GalleryCapability {
    fn shape_id(&self) -> &str {
        "social.grain.gallery"
    }

    fn display_name(&self) -> &str {
        "Gallery"
    }

    fn icon(&self) -> &str {
        "🖼️"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        ALL_MODES
    }

    fn show_in_content_feed(&self) -> bool {
        true
    }

    fn extract_title(&self, record: &RecordEnvelope) -> String {
        record.str_field("title").unwrap_or("Untitled Gallery").to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        record
            .str_field("description")
            .unwrap_or(NO_CONTENT)
            .to_string()
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        format!(
            "https://grain.social/profile/{}/gallery/{}",
            handle(record),
            rkey(record)
        )
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "View Gallery on Grain →".to_string()
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![(
            "updatedAt",
            record.str_field("updatedAt").map_or(Value::Null, |s| json!(s)),
        )])
    }
}

/// `a.status.update`
pub struct StatusCapability;

impl ShapeCapability for StatusCapability {
    fn shape_id(&self) -> &str {
        "a.status.update"
    }

    fn display_name(&self) -> &str {
        "Status"
    }

    fn icon(&self) -> &str {
        "💬"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Status".to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        record
            .str_field("status")
            .or_else(|| record.str_field("text"))
            .unwrap_or(NO_CONTENT)
            .to_string()
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Capability for any shape nothing else claims. Records are surfaced as
/// "Unsupported Type" with a raw JSON excerpt, never dropped.
pub struct GenericCapability;

pub(crate) const GENERIC_SHAPE: &str = "*";

impl ShapeCapability for GenericCapability {
    fn shape_id(&self) -> &str {
        GENERIC_SHAPE
    }

    fn display_name(&self) -> &str {
        "Unsupported Type"
    }

    fn icon(&self) -> &str {
        "❓"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_title(&self, _record: &RecordEnvelope) -> String {
        "Unsupported Type".to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        match &record.value {
            Value::Null => NO_CONTENT.to_string(),
            Value::Object(map) if map.is_empty() => NO_CONTENT.to_string(),
            value => truncate_text(&value.to_string(), RAW_SUMMARY_CHARS),
        }
    }

    fn extract_description(&self, record: &RecordEnvelope) -> String {
        format!("No capability is registered for {}", record.shape_id)
    }

    fn extract_metadata(&self, record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![
            ("shapeId", json!(record.shape_id)),
            ("collection", json!(record.collection)),
        ])
    }
}

/// Capability seeded from a discovered shape that has no hand-written entry
pub struct DiscoveredCapability {
    shape_id: String,
    display_name: String,
    collection: String,
    service: String,
}

impl DiscoveredCapability {
    pub fn from_descriptor(shape: &ShapeDescriptor) -> Self {
        Self {
            shape_id: shape.shape_id.clone(),
            display_name: shape.type_name(),
            collection: shape.collection.clone(),
            service: shape.service.clone(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl ShapeCapability for DiscoveredCapability {
    fn shape_id(&self) -> &str {
        &self.shape_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn icon(&self) -> &str {
        "🔗"
    }

    fn presentation_modes(&self) -> &[PresentationMode] {
        CARD_MODES
    }

    fn extract_metadata(&self, _record: &RecordEnvelope) -> Map<String, Value> {
        metadata(vec![
            ("collection", json!(self.collection)),
            ("service", json!(self.service)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRecord;

    fn record(collection: &str, rkey: &str, value: Value) -> RecordEnvelope {
        RecordEnvelope::from_raw(
            RawRecord {
                uri: format!("at://did:plc:alice/{}/{}", collection, rkey),
                cid: "bafy".to_string(),
                value,
                indexed_at: None,
            },
            collection,
        )
    }

    #[test]
    fn test_post() {
        let r = record(
            "app.bsky.feed.post",
            "3k1",
            json!({"$type": "app.bsky.feed.post", "text": "hello", "likeCount": 4}),
        );
        let cap = PostCapability;
        assert_eq!(cap.extract_title(&r), "Post");
        assert_eq!(cap.extract_content(&r), "hello");
        assert_eq!(
            cap.extract_link(&r),
            "https://bsky.app/profile/did:plc:alice/post/3k1"
        );
        assert_eq!(cap.extract_metadata(&r)["likeCount"], 4);
        assert_eq!(cap.internal_link(&r).as_deref(), Some("/record/3k1"));
    }

    #[test]
    fn test_like_links_to_subject() {
        let r = record(
            "app.bsky.feed.like",
            "l1",
            json!({"subject": {"uri": "at://did:plc:bob/app.bsky.feed.post/xyz", "cid": "c"}}),
        );
        let cap = LikeCapability;
        assert_eq!(cap.extract_content(&r), "Liked a post");
        assert_eq!(
            cap.extract_link(&r),
            "https://bsky.app/profile/did:plc:bob/post/xyz"
        );
        assert_eq!(cap.extract_link_text(&r), "View Original Post on Bluesky →");
        assert!(cap.internal_link(&r).is_none());

        let bare = record("app.bsky.feed.like", "l2", json!({}));
        assert_eq!(cap.extract_link(&bare), "https://bsky.app/profile/did:plc:alice");
    }

    #[test]
    fn test_follow_content() {
        let cap = FollowCapability;
        let r = record(
            "app.bsky.graph.follow",
            "f1",
            json!({"subject": "did:plc:abcdefghijklmnop"}),
        );
        assert_eq!(cap.extract_content(&r), "Followed user (abcdefgh...)");
        let r = record("app.bsky.graph.follow", "f2", json!({"subject": 42}));
        assert_eq!(cap.extract_content(&r), "Followed someone");
    }

    #[test]
    fn test_blog_entry() {
        let cap = BlogEntryCapability;
        let r = record("com.whtwnd.blog.entry", "b1", json!({"content": "one two three"}));
        assert_eq!(cap.extract_title(&r), "Untitled Post");
        assert_eq!(cap.extract_link(&r), "https://whtwnd.com/did:plc:alice/b1");
        assert_eq!(cap.extract_metadata(&r)["wordCount"], 3);
        assert_eq!(cap.extract_metadata(&r)["visibility"], "public");
        assert!(cap.show_in_content_feed());
    }

    #[test]
    fn test_profile_hidden_from_activity() {
        let cap = ProfileCapability;
        assert!(!cap.show_in_activity_feed());
        let r = record("app.bsky.actor.profile", "self", json!({"displayName": "Alice"}));
        assert_eq!(cap.extract_content(&r), "Updated profile: Alice");
    }

    #[test]
    fn test_generic_fallback_is_total() {
        let cap = GenericCapability;
        let empty = record("x.y.z", "1", json!({}));
        assert_eq!(cap.extract_title(&empty), "Unsupported Type");
        assert_eq!(cap.extract_content(&empty), NO_CONTENT);

        let null = record("x.y.z", "2", Value::Null);
        assert_eq!(cap.extract_content(&null), NO_CONTENT);
        assert!(cap.extract_tags(&null).is_empty());

        let long = record("x.y.z", "3", json!({"blob": "a".repeat(500)}));
        let content = cap.extract_content(&long);
        assert!(content.starts_with("{\"blob\""));
        assert!(content.ends_with("..."));
    }

    #[test]
    fn test_extractors_tolerate_wrong_types() {
        let weird = json!({"text": 5, "title": [], "tags": "nope", "subject": {"uri": 3}});
        let caps: Vec<Box<dyn ShapeCapability>> = vec![
            Box::new(PostCapability),
            Box::new(LikeCapability),
            Box::new(RepostCapability),
            Box::new(FollowCapability),
            Box::new(ProfileCapability),
            Box::new(BlogEntryCapability),
            Box::new(GalleryCapability),
            Box::new(StatusCapability),
            Box::new(GenericCapability),
        ];
        let r = record("x.y.z", "1", weird);
        for cap in caps {
            let summary = cap.summarize(&r);
            assert!(!summary.title.is_empty());
            assert!(!summary.content.is_empty());
            assert!(summary.tags.is_empty());
        }
    }

    #[test]
    fn test_discovered_capability() {
        let shape = ShapeDescriptor {
            shape_id: "app.popsky.review".to_string(),
            collection: "app.popsky.review".to_string(),
            service: "unknown".to_string(),
            properties: Default::default(),
            sample_count: 1,
            sample_value: Value::Null,
            description: String::new(),
        };
        let cap = DiscoveredCapability::from_descriptor(&shape);
        assert_eq!(cap.display_name(), "AppPopskyReview");
        let r = record(
            "app.popsky.review",
            "r1",
            json!({"title": "Dune", "text": "Great", "tags": ["scifi"]}),
        );
        assert_eq!(cap.extract_title(&r), "Dune");
        assert_eq!(cap.extract_content(&r), "Great");
        assert_eq!(cap.extract_tags(&r), vec!["scifi".to_string()]);
    }
}
