//! Prioritised catalog of candidate collections

use crate::config::CollectionCandidate;

/// Built-in candidates: (name, description, service, priority)
const KNOWN_COLLECTIONS: &[(&str, &str, &str, i32)] = &[
    ("app.bsky.feed.post", "Standard Bluesky posts", "bsky.app", 100),
    ("social.grain.gallery", "Grain.social image galleries", "grain.social", 95),
    ("app.bsky.actor.profile", "Bluesky profile information", "bsky.app", 90),
    ("com.whtwnd.blog.entry", "WhiteWind blog entries", "whtwnd.com", 88),
    ("social.grain.gallery.item", "Grain.social gallery items", "grain.social", 86),
    ("grain.social.feed.gallery", "Grain.social image galleries (legacy)", "grain.social", 85),
    ("grain.social.feed.post", "Grain.social posts", "grain.social", 85),
    ("social.grain.photo", "Grain.social photos", "grain.social", 84),
    ("app.bsky.feed.generator", "Bluesky custom feeds", "bsky.app", 80),
    ("grain.social.actor.profile", "Grain.social profile information", "grain.social", 75),
    ("a.status.update", "Status updates", "unknown", 72),
    ("app.bsky.graph.follow", "Bluesky follow relationships", "bsky.app", 70),
    ("grain.social.feed.image", "Grain.social image posts", "grain.social", 65),
    ("app.bsky.graph.block", "Bluesky block relationships", "bsky.app", 60),
    ("grain.social.feed.media", "Grain.social media posts", "grain.social", 55),
    ("app.bsky.feed.like", "Bluesky like records", "bsky.app", 50),
    ("sh.tangled.feed.star", "Sh.tangled star records", "sh.tangled", 45),
    ("app.bsky.feed.repost", "Bluesky repost records", "bsky.app", 40),
    ("sh.tangled.feed.post", "Sh.tangled posts", "sh.tangled", 35),
    ("app.bsky.feed.custom", "Custom Bluesky feed content", "bsky.app", 30),
    ("sh.tangled.actor.profile", "Sh.tangled profile information", "sh.tangled", 25),
    ("app.bsky.actor.custom", "Custom Bluesky actor content", "bsky.app", 20),
    ("app.bsky.feed.media", "Bluesky media content", "bsky.app", 15),
    ("app.bsky.feed.image", "Bluesky image content", "bsky.app", 10),
    ("app.bsky.feed.gallery", "Bluesky gallery content", "bsky.app", 5),
];

/// Candidate collection names for probe-mode discovery
#[derive(Debug, Clone)]
pub struct CollectionCatalog {
    candidates: Vec<CollectionCandidate>,
}

impl Default for CollectionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CollectionCatalog {
    /// Catalog holding only the built-in candidates
    pub fn builtin() -> Self {
        Self::with_candidates(Vec::new())
    }

    /// Built-in candidates followed by `extra`
    pub fn with_candidates(extra: Vec<CollectionCandidate>) -> Self {
        let mut candidates: Vec<CollectionCandidate> = KNOWN_COLLECTIONS
            .iter()
            .map(|(name, description, service, priority)| CollectionCandidate {
                name: name.to_string(),
                description: description.to_string(),
                service: service.to_string(),
                priority: *priority,
                enabled: true,
            })
            .collect();
        candidates.extend(extra);
        Self { candidates }
    }

    /// Catalog with no candidates at all
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Enabled candidates, highest priority first
    pub fn enabled_by_priority(&self) -> Vec<&CollectionCandidate> {
        let mut enabled: Vec<_> = self.candidates.iter().filter(|c| c.enabled).collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
        enabled
    }

    /// Names of enabled candidates, highest priority first
    pub fn names(&self) -> Vec<String> {
        self.enabled_by_priority()
            .into_iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Enabled candidates owned by `service`
    pub fn by_service(&self, service: &str) -> Vec<&CollectionCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.enabled && c.service == service)
            .collect()
    }

    pub fn add(&mut self, candidate: CollectionCandidate) {
        self.candidates.push(candidate);
    }

    /// Enable or disable every candidate of a service
    pub fn set_service_enabled(&mut self, service: &str, enabled: bool) {
        for candidate in self.candidates.iter_mut().filter(|c| c.service == service) {
            candidate.enabled = enabled;
        }
    }

    pub fn get(&self, name: &str) -> Option<&CollectionCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    /// Distinct services in catalog order
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        for candidate in &self.candidates {
            if !services.contains(&candidate.service) {
                services.push(candidate.service.clone());
            }
        }
        services
    }

    /// Human description of a collection, catalogued or not
    pub fn description_for(&self, name: &str) -> String {
        self.get(name)
            .map(|c| c.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("{} records", name))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, service: &str, priority: i32) -> CollectionCandidate {
        CollectionCandidate {
            name: name.to_string(),
            description: String::new(),
            service: service.to_string(),
            priority,
            enabled: true,
        }
    }

    #[test]
    fn test_priority_order() {
        let catalog = CollectionCatalog::builtin();
        let names = catalog.names();
        assert_eq!(names[0], "app.bsky.feed.post");
        assert_eq!(names[1], "social.grain.gallery");
        assert_eq!(names.last().map(String::as_str), Some("app.bsky.feed.gallery"));
    }

    #[test]
    fn test_extra_candidates_are_appended() {
        let catalog = CollectionCatalog::with_candidates(vec![candidate("xyz.custom.thing", "xyz", 1000)]);
        assert_eq!(catalog.names()[0], "xyz.custom.thing");
        assert_eq!(catalog.len(), KNOWN_COLLECTIONS.len() + 1);
    }

    #[test]
    fn test_service_toggle() {
        let mut catalog = CollectionCatalog::builtin();
        assert!(!catalog.by_service("sh.tangled").is_empty());
        catalog.set_service_enabled("sh.tangled", false);
        assert!(catalog.by_service("sh.tangled").is_empty());
        assert!(!catalog.names().iter().any(|n| n.starts_with("sh.tangled")));
        // Disabled candidates are still known
        assert!(catalog.get("sh.tangled.feed.star").is_some());
    }

    #[test]
    fn test_services_are_distinct() {
        let catalog = CollectionCatalog::builtin();
        let services = catalog.services();
        assert_eq!(services[0], "bsky.app");
        assert!(services.contains(&"grain.social".to_string()));
        let unique: std::collections::BTreeSet<_> = services.iter().collect();
        assert_eq!(unique.len(), services.len());
    }

    #[test]
    fn test_description_fallback() {
        let mut catalog = CollectionCatalog::empty();
        assert!(catalog.is_empty());
        assert_eq!(catalog.description_for("x.y.z"), "x.y.z records");
        catalog.add(candidate("x.y.z", "x", 1));
        assert_eq!(catalog.description_for("x.y.z"), "x.y.z records");
    }
}
