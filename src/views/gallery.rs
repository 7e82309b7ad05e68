//! Gallery grouping of gallery-item records

use super::blob::{blob_url, extract_blob_cid};
use crate::error::{Error, Result};
use crate::model::{AtUri, RecordEnvelope};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Value fields that may hold an item's image
const IMAGE_FIELDS: &[&str] = &["image", "photo", "media"];

/// One displayable image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub url: String,
    pub alt: Option<String>,
    pub caption: Option<String>,
}

/// Gallery items grouped under one gallery id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedGallery {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Earliest timestamp among the items
    pub created_at: Option<DateTime<Utc>>,
    pub images: Vec<GalleryImage>,
    pub item_count: usize,
    pub collections: Vec<String>,
}

/// Groups gallery-item records into [`ProcessedGallery`] views
pub struct GalleryGrouper {
    uri_pattern: Regex,
    title_pattern: Regex,
    blob_service: String,
}

impl GalleryGrouper {
    /// Create a grouper resolving blob images against `blob_service`
    pub fn new(blob_service: &str) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Internal(format!("Invalid gallery pattern: {}", e)))
        };
        Ok(Self {
            uri_pattern: compile(r"gallery/([^/]+)")?,
            title_pattern: compile(r"(?i)gallery[:\-\s]+(\S+)")?,
            blob_service: blob_service.to_string(),
        })
    }

    /// Gallery id of an item.
    ///
    /// Tried in order: `galleryId`, `gallery_id`, `id`, a `gallery`
    /// reference (its record key when it is a record URI), a `gallery/<id>`
    /// URI segment, a `gallery: <id>` title, then `<collection>-<rkey>`.
    pub fn gallery_id(&self, item: &RecordEnvelope) -> String {
        for key in ["galleryId", "gallery_id", "id"] {
            if let Some(id) = item.str_field(key) {
                return id.to_string();
            }
        }

        if let Some(gallery) = item.str_field("gallery") {
            return match AtUri::parse(gallery) {
                Ok(uri) => uri.rkey,
                Err(_) => gallery.to_string(),
            };
        }

        if let Some(captures) = self.uri_pattern.captures(&item.uri) {
            return captures[1].to_string();
        }

        if let Some(captures) = item
            .str_field("title")
            .and_then(|title| self.title_pattern.captures(title))
        {
            return captures[1].to_string();
        }

        let rkey = item
            .record_key()
            .or_else(|| item.uri.rsplit('/').next().map(str::to_string))
            .unwrap_or_default();
        format!("{}-{}", item.collection, rkey)
    }

    /// Image carried by an item, if any
    pub fn image(&self, item: &RecordEnvelope) -> Option<GalleryImage> {
        let item_caption = item.str_field("caption").map(str::to_string);

        IMAGE_FIELDS.iter().find_map(|field| {
            let data = item.value.get(*field)?;
            let text = |key: &str| {
                data.get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let url = text("url").or_else(|| text("src")).or_else(|| {
                let did = item.repository_id()?;
                extract_blob_cid(data).map(|cid| blob_url(&self.blob_service, &did, &cid))
            })?;

            let caption = text("caption").or_else(|| item_caption.clone());
            Some(GalleryImage {
                url,
                alt: text("alt").or_else(|| caption.clone()),
                caption,
            })
        })
    }

    /// Group items into galleries, newest first
    pub fn group(&self, items: &[RecordEnvelope]) -> Vec<ProcessedGallery> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&RecordEnvelope>> = HashMap::new();
        for item in items {
            let id = self.gallery_id(item);
            if !groups.contains_key(&id) {
                order.push(id.clone());
            }
            groups.entry(id).or_default().push(item);
        }

        let mut galleries: Vec<ProcessedGallery> = order
            .into_iter()
            .filter_map(|id| {
                let members = groups.remove(&id)?;
                Some(self.process(id, &members))
            })
            .collect();

        galleries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        galleries
    }

    fn process(&self, id: String, members: &[&RecordEnvelope]) -> ProcessedGallery {
        let first = members.first();
        let title = first
            .and_then(|m| m.str_field("title"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Gallery {}", id));
        let description = first.and_then(|m| {
            m.str_field("description")
                .or_else(|| m.str_field("caption"))
                .map(str::to_string)
        });
        let collections: BTreeSet<String> =
            members.iter().map(|m| m.collection.clone()).collect();

        ProcessedGallery {
            title,
            description,
            created_at: members.iter().filter_map(|m| m.indexed_at).min(),
            images: members.iter().filter_map(|m| self.image(m)).collect(),
            item_count: members.len(),
            collections: collections.into_iter().collect(),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRecord;
    use crate::views::DEFAULT_BLOB_SERVICE;
    use serde_json::json;

    fn item(collection: &str, rkey: &str, value: Value) -> RecordEnvelope {
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

    fn grouper() -> GalleryGrouper {
        GalleryGrouper::new(DEFAULT_BLOB_SERVICE).unwrap()
    }

    #[test]
    fn test_gallery_id_precedence() {
        let g = grouper();
        assert_eq!(
            g.gallery_id(&item("c", "1", json!({"galleryId": "g1", "id": "x"}))),
            "g1"
        );
        assert_eq!(g.gallery_id(&item("c", "2", json!({"gallery_id": "g2"}))), "g2");
        assert_eq!(
            g.gallery_id(&item(
                "social.grain.gallery.item",
                "3",
                json!({"gallery": "at://did:plc:alice/social.grain.gallery/3kgal"})
            )),
            "3kgal"
        );
        assert_eq!(
            g.gallery_id(&item("c", "4", json!({"title": "Gallery: summer-2024 shots"}))),
            "summer-2024"
        );
        assert_eq!(g.gallery_id(&item("c", "5", json!({}))), "c-5");
    }

    #[test]
    fn test_gallery_id_from_uri_segment() {
        let g = grouper();
        // A gallery record's own key is its gallery id
        let record = item("social.grain.gallery", "3kgal", json!({"title": "Trip"}));
        assert_eq!(g.gallery_id(&record), "3kgal");
    }

    #[test]
    fn test_image_extraction() {
        let g = grouper();
        let with_url = item(
            "c",
            "1",
            json!({"photo": {"src": "https://img/1.jpg", "alt": "sunset"}, "caption": "cap"}),
        );
        let image = g.image(&with_url).unwrap();
        assert_eq!(image.url, "https://img/1.jpg");
        assert_eq!(image.alt.as_deref(), Some("sunset"));
        assert_eq!(image.caption.as_deref(), Some("cap"));

        let with_blob = item(
            "c",
            "2",
            json!({"image": {"$type": "blob", "ref": {"$link": "bafkimg"}}}),
        );
        let image = g.image(&with_blob).unwrap();
        assert!(image.url.contains("com.atproto.sync.getBlob"));
        assert!(image.url.ends_with("cid=bafkimg"));

        assert!(g.image(&item("c", "3", json!({"text": "no image"}))).is_none());
    }

    #[test]
    fn test_grouping() {
        let g = grouper();
        let items = vec![
            item(
                "social.grain.gallery.item",
                "a",
                json!({"galleryId": "trip", "title": "Trip", "createdAt": "2024-03-02T00:00:00Z",
                       "image": {"url": "https://img/a.jpg"}}),
            ),
            item(
                "social.grain.photo",
                "b",
                json!({"galleryId": "trip", "createdAt": "2024-03-01T00:00:00Z",
                       "image": {"url": "https://img/b.jpg"}}),
            ),
            item(
                "social.grain.gallery.item",
                "c",
                json!({"galleryId": "home", "createdAt": "2024-05-01T00:00:00Z"}),
            ),
        ];

        let galleries = g.group(&items);
        assert_eq!(galleries.len(), 2);

        // Newest first
        assert_eq!(galleries[0].id, "home");
        assert_eq!(galleries[0].title, "Gallery home");
        assert!(galleries[0].images.is_empty());

        let trip = &galleries[1];
        assert_eq!(trip.title, "Trip");
        assert_eq!(trip.item_count, 2);
        assert_eq!(trip.images.len(), 2);
        assert_eq!(
            trip.created_at.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
        assert_eq!(
            trip.collections,
            vec!["social.grain.gallery.item", "social.grain.photo"]
        );
    }
}
