//! Shape capability registry

use super::builtin::{
    BlogEntryCapability, DiscoveredCapability, FollowCapability, GalleryCapability,
    GenericCapability, LikeCapability, PostCapability, ProfileCapability, RepostCapability,
    StatusCapability,
};
use super::capability::{PresentationMode, ShapeCapability};
use crate::model::{CollectionDescriptor, RecordEnvelope};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Concurrency-safe map from shape id to capability.
///
/// Registration is last-write-wins per shape id. Resolution never fails:
/// unmatched shapes get the generic fallback.
pub struct TypeRegistry {
    capabilities: RwLock<HashMap<String, Arc<dyn ShapeCapability>>>,
    fallback: Arc<dyn ShapeCapability>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Empty registry with the generic fallback
    pub fn new() -> Self {
        Self {
            capabilities: RwLock::new(HashMap::new()),
            fallback: Arc::new(GenericCapability),
        }
    }

    /// Registry with every built-in capability registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(PostCapability));
        registry.register(Arc::new(LikeCapability));
        registry.register(Arc::new(RepostCapability));
        registry.register(Arc::new(FollowCapability));
        registry.register(Arc::new(ProfileCapability));
        registry.register(Arc::new(BlogEntryCapability));
        registry.register(Arc::new(GalleryCapability));
        registry.register(Arc::new(StatusCapability));
        registry
    }

    /// Register a capability under its own shape id, replacing any
    /// previous entry
    pub fn register(&self, capability: Arc<dyn ShapeCapability>) {
        let shape_id = capability.shape_id().to_string();
        self.register_as(shape_id, capability);
    }

    /// Register a capability under an explicit shape id, e.g. one
    /// capability serving several shapes. Replaces any previous entry.
    pub fn register_as(&self, shape_id: impl Into<String>, capability: Arc<dyn ShapeCapability>) {
        let shape_id = shape_id.into();
        let previous = self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(shape_id.clone(), capability);
        if previous.is_some() {
            tracing::debug!("Replaced capability for {}", shape_id);
        }
    }

    /// Capability for a record: exact shape match or the fallback
    pub fn resolve(&self, record: &RecordEnvelope) -> Arc<dyn ShapeCapability> {
        self.resolve_shape(&record.shape_id)
    }

    /// Capability for a shape id: exact match or the fallback
    pub fn resolve_shape(&self, shape_id: &str) -> Arc<dyn ShapeCapability> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn fallback(&self) -> Arc<dyn ShapeCapability> {
        self.fallback.clone()
    }

    pub fn is_registered(&self, shape_id: &str) -> bool {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(shape_id)
    }

    /// Registered shape ids, sorted
    pub fn registered_shapes(&self) -> Vec<String> {
        let mut shapes: Vec<String> = self
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        shapes.sort();
        shapes
    }

    pub fn list_by_presentation_mode(&self, mode: PresentationMode) -> Vec<Arc<dyn ShapeCapability>> {
        self.filtered(|c| c.supports(mode))
    }

    pub fn list_activity_capable(&self) -> Vec<Arc<dyn ShapeCapability>> {
        self.filtered(|c| c.show_in_activity_feed())
    }

    pub fn list_content_capable(&self) -> Vec<Arc<dyn ShapeCapability>> {
        self.filtered(|c| c.show_in_content_feed())
    }

    /// Register a [`DiscoveredCapability`] for every discovered shape that
    /// has no entry yet. Returns the number of shapes added.
    pub fn seed_discovered(&self, collections: &[CollectionDescriptor]) -> usize {
        let mut map = self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for shape in collections.iter().flat_map(|c| c.shapes.iter()) {
            if map.contains_key(&shape.shape_id) {
                continue;
            }
            map.insert(
                shape.shape_id.clone(),
                Arc::new(DiscoveredCapability::from_descriptor(shape)),
            );
            added += 1;
        }
        if added > 0 {
            tracing::info!("Seeded {} discovered shapes into the registry", added);
        }
        added
    }

    /// Matching capabilities, sorted by shape id
    fn filtered<F>(&self, predicate: F) -> Vec<Arc<dyn ShapeCapability>>
    where
        F: Fn(&dyn ShapeCapability) -> bool,
    {
        let mut matches: Vec<Arc<dyn ShapeCapability>> = self
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| predicate(Arc::as_ref(c)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.shape_id().cmp(b.shape_id()));
        matches
    }
}
