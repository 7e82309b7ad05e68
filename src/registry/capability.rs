//! Shape capability trait

use super::text::truncate_text;
use crate::model::RecordEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fallback content when a record carries no usable text
pub const NO_CONTENT: &str = "No content available";

/// How much of a record a consumer intends to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationMode {
    /// List item: icon, type, timestamp, short content
    Compact,
    /// Card with full content, author, tags and link
    Expanded,
    /// Standalone page with metadata
    Full,
}

/// Record author as far as it can be told from the record itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub name: String,
    pub handle: String,
    pub avatar: Option<String>,
}

/// Every extractor's output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSummary {
    pub shape_id: String,
    pub display_name: String,
    pub icon: String,
    pub title: String,
    pub content: String,
    pub description: String,
    pub author: AuthorInfo,
    pub tags: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub link: String,
    pub link_text: String,
    pub internal_link: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Extraction and presentation rules for one record shape.
///
/// Every extractor is total: malformed or empty values yield a safe default
/// rather than an error. Extractors never perform I/O.
pub trait ShapeCapability: Send + Sync {
    /// Shape id this capability claims
    fn shape_id(&self) -> &str;

    /// User-facing name, e.g. "Post"
    fn display_name(&self) -> &str;

    fn icon(&self) -> &str {
        "📋"
    }

    /// Modes this shape can be presented in
    fn presentation_modes(&self) -> &[PresentationMode];

    fn show_in_activity_feed(&self) -> bool {
        true
    }

    fn show_in_content_feed(&self) -> bool {
        false
    }

    fn extract_title(&self, record: &RecordEnvelope) -> String {
        record
            .str_field("title")
            .or_else(|| record.str_field("name"))
            .unwrap_or_else(|| self.display_name())
            .to_string()
    }

    fn extract_content(&self, record: &RecordEnvelope) -> String {
        ["content", "text", "description"]
            .iter()
            .find_map(|key| record.str_field(key))
            .unwrap_or(NO_CONTENT)
            .to_string()
    }

    fn extract_author(&self, record: &RecordEnvelope) -> AuthorInfo {
        let handle = record.repository_id().unwrap_or_default();
        AuthorInfo {
            name: handle.clone(),
            handle,
            avatar: None,
        }
    }

    fn extract_tags(&self, record: &RecordEnvelope) -> Vec<String> {
        ["tags", "categories"]
            .iter()
            .find_map(|key| record.value.get(*key).and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn extract_timestamp(&self, record: &RecordEnvelope) -> Option<DateTime<Utc>> {
        record.indexed_at
    }

    fn extract_link(&self, record: &RecordEnvelope) -> String {
        profile_link(record)
    }

    fn extract_link_text(&self, _record: &RecordEnvelope) -> String {
        "View Profile →".to_string()
    }

    /// Byline shown under the title; empty when there is none
    fn extract_description(&self, _record: &RecordEnvelope) -> String {
        String::new()
    }

    fn extract_metadata(&self, _record: &RecordEnvelope) -> Map<String, Value> {
        Map::new()
    }

    fn supports(&self, mode: PresentationMode) -> bool {
        self.presentation_modes().contains(&mode)
    }

    /// Path of the in-app page for this record; only shapes with a
    /// full presentation have one.
    fn internal_link(&self, record: &RecordEnvelope) -> Option<String> {
        if !self.supports(PresentationMode::Full) {
            return None;
        }
        record.record_key().map(|rkey| format!("/record/{}", rkey))
    }

    /// Content cut to `max_chars`
    fn extract_content_truncated(&self, record: &RecordEnvelope, max_chars: usize) -> String {
        truncate_text(&self.extract_content(record), max_chars)
    }

    /// Run every extractor
    fn summarize(&self, record: &RecordEnvelope) -> RenderedSummary {
        RenderedSummary {
            shape_id: self.shape_id().to_string(),
            display_name: self.display_name().to_string(),
            icon: self.icon().to_string(),
            title: self.extract_title(record),
            content: self.extract_content(record),
            description: self.extract_description(record),
            author: self.extract_author(record),
            tags: self.extract_tags(record),
            timestamp: self.extract_timestamp(record),
            link: self.extract_link(record),
            link_text: self.extract_link_text(record),
            internal_link: self.internal_link(record),
            metadata: self.extract_metadata(record),
        }
    }
}

/// Bluesky profile URL of the record's repository
pub(crate) fn profile_link(record: &RecordEnvelope) -> String {
    format!(
        "https://bsky.app/profile/{}",
        record.repository_id().unwrap_or_default()
    )
}
