//! Discovery engine

use super::catalog::CollectionCatalog;
use super::service::infer_service;
use super::sketch::extract_properties;
use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::error::{Error, Result};
use crate::model::{CollectionDescriptor, RawRecord, ShapeDescriptor, UNKNOWN_SHAPE};
use crate::xrpc::RepositoryApi;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Summary of one full discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAnalysis {
    pub did: String,
    pub collections: Vec<CollectionDescriptor>,
    /// Records observed across all samples
    pub total_records: usize,
    /// Records per shape id across all samples
    pub shape_counts: BTreeMap<String, usize>,
}

impl RepositoryAnalysis {
    /// Every discovered shape, in collection order
    pub fn shapes(&self) -> impl Iterator<Item = &ShapeDescriptor> {
        self.collections.iter().flat_map(|c| c.shapes.iter())
    }
}

/// Discovers the collections and record shapes of a repository
pub struct DiscoveryEngine {
    api: Arc<dyn RepositoryApi>,
    catalog: CollectionCatalog,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    /// Create an engine over the built-in catalog plus configured candidates
    pub fn new(api: Arc<dyn RepositoryApi>, config: DiscoveryConfig) -> Self {
        let catalog = CollectionCatalog::with_candidates(config.candidates.clone());
        Self::with_catalog(api, config, catalog)
    }

    pub fn with_catalog(
        api: Arc<dyn RepositoryApi>,
        config: DiscoveryConfig,
        catalog: CollectionCatalog,
    ) -> Self {
        Self {
            api,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CollectionCatalog {
        &mut self.catalog
    }

    /// The mode actually used, given what the backend supports
    pub fn effective_mode(&self) -> DiscoveryMode {
        match self.config.mode {
            DiscoveryMode::Auto if self.api.supports_describe() => DiscoveryMode::Reported,
            DiscoveryMode::Auto => DiscoveryMode::Probe,
            mode => mode,
        }
    }

    /// Discover every non-empty collection and the shapes within it.
    ///
    /// A failing probe is recorded as a missing collection and discovery
    /// continues. Session errors abort the run, and so does a run in which
    /// every collection lookup failed.
    pub async fn discover_collections(&self, repo: &str) -> Result<Vec<CollectionDescriptor>> {
        let (names, mode) = self.candidate_names(repo).await?;
        tracing::info!(
            "Discovering {} candidate collections for {} ({:?} mode)",
            names.len(),
            repo,
            mode
        );

        let samples = self.probe_batched(repo, &names).await?;
        let descriptors: Vec<CollectionDescriptor> = samples
            .into_iter()
            .map(|(name, records)| self.describe(&name, &records))
            .collect();

        tracing::info!(
            "Discovered {} collections in {}",
            descriptors.len(),
            repo
        );
        Ok(descriptors)
    }

    /// Names of the non-empty collections, without sketching shapes
    pub async fn list_collection_names(&self, repo: &str) -> Result<Vec<String>> {
        let (names, mode) = self.candidate_names(repo).await?;
        if mode == DiscoveryMode::Reported {
            return Ok(names);
        }
        Ok(self
            .probe_batched(repo, &names)
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Resolve the identity, discover, and tally shapes
    pub async fn analyze_repository(&self, identifier: &str) -> Result<RepositoryAnalysis> {
        let did = if identifier.starts_with("did:") {
            identifier.to_string()
        } else {
            self.api.resolve_handle(identifier).await.map_err(|e| match e {
                Error::Session(_) => e,
                other => Error::Discovery(format!(
                    "Failed to resolve handle {}: {}",
                    identifier, other
                )),
            })?
        };

        let collections = self.discover_collections(&did).await?;
        let total_records = collections.iter().map(|c| c.record_count).sum();
        let mut shape_counts = BTreeMap::new();
        for shape in collections.iter().flat_map(|c| c.shapes.iter()) {
            *shape_counts.entry(shape.shape_id.clone()).or_insert(0) += shape.sample_count;
        }

        Ok(RepositoryAnalysis {
            did,
            collections,
            total_records,
            shape_counts,
        })
    }

    /// Candidate names to probe, and the mode they came from
    async fn candidate_names(&self, repo: &str) -> Result<(Vec<String>, DiscoveryMode)> {
        match self.effective_mode() {
            DiscoveryMode::Probe => Ok((self.catalog.names(), DiscoveryMode::Probe)),
            _ => match self.api.describe_repo(repo).await {
                Ok(description) => Ok((description.collections, DiscoveryMode::Reported)),
                Err(e) if e.is_session() => Err(e),
                Err(e) if self.config.mode == DiscoveryMode::Reported => Err(Error::Discovery(
                    format!("describeRepo failed for {}: {}", repo, e),
                )),
                Err(e) => {
                    tracing::warn!(
                        "describeRepo failed for {}, falling back to probing: {}",
                        repo,
                        e
                    );
                    Ok((self.catalog.names(), DiscoveryMode::Probe))
                }
            },
        }
    }

    /// Probe names in fixed-size concurrent batches with a pause between
    /// batches; returns the non-empty collections in input order.
    ///
    /// Fails with [`Error::Discovery`] when there were names to probe and
    /// none of them got an answer.
    async fn probe_batched(
        &self,
        repo: &str,
        names: &[String],
    ) -> Result<Vec<(String, Vec<RawRecord>)>> {
        let batch_size = self.config.batch_size.max(1);
        let mut found = Vec::new();
        let mut answered = 0;
        let mut last_error = None;

        for (index, batch) in names.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let results =
                futures::future::join_all(batch.iter().map(|name| self.probe(repo, name))).await;

            for (name, result) in batch.iter().zip(results) {
                match result {
                    Ok(records) if records.is_empty() => {
                        answered += 1;
                        tracing::debug!("Collection {} is empty", name);
                    }
                    Ok(records) => {
                        answered += 1;
                        found.push((name.clone(), records));
                    }
                    Err(e) if e.is_session() => return Err(e),
                    Err(e) => {
                        tracing::debug!("Collection {} not found: {}", name, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if answered == 0 => Err(Error::Discovery(format!(
                "All {} collection lookups failed for {}, last error: {}",
                names.len(),
                repo,
                e
            ))),
            _ => Ok(found),
        }
    }

    async fn probe(&self, repo: &str, collection: &str) -> Result<Vec<RawRecord>> {
        let limit = self.config.probe_limit.max(self.config.sample_size).max(1);
        let page = self
            .api
            .list_records(repo, collection, limit, None)
            .await?;
        Ok(page.records)
    }

    /// Build a descriptor from one collection's sample
    fn describe(&self, name: &str, records: &[RawRecord]) -> CollectionDescriptor {
        let sample_size = (self.config.sample_size as usize).max(1);
        let mut by_shape: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
        for record in records.iter().take(sample_size) {
            let shape_id = record
                .value
                .get("$type")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN_SHAPE);
            by_shape
                .entry(shape_id.to_string())
                .or_default()
                .push(&record.value);
        }
        by_shape.remove(UNKNOWN_SHAPE);

        let shapes: Vec<ShapeDescriptor> = by_shape
            .into_iter()
            .map(|(shape_id, values)| self.sketch_shape(name, shape_id, &values))
            .collect();
        let sample_shapes: BTreeSet<String> = shapes.iter().map(|s| s.shape_id.clone()).collect();

        let service = self
            .catalog
            .get(name)
            .map(|c| c.service.clone())
            .filter(|s| !s.is_empty() && s != "unknown")
            .unwrap_or_else(|| infer_service("", name));

        CollectionDescriptor {
            name: name.to_string(),
            service,
            record_count: records.len(),
            sample_shapes,
            shapes,
        }
    }

    /// Sketch one shape from its sample values; keys seen only in later
    /// samples are merged in after the first sample's.
    fn sketch_shape(&self, collection: &str, shape_id: String, values: &[&Value]) -> ShapeDescriptor {
        let mut properties = BTreeMap::new();
        for value in values {
            for (key, sketch) in extract_properties(value, self.config.max_depth) {
                properties.entry(key).or_insert(sketch);
            }
        }

        ShapeDescriptor {
            service: infer_service(&shape_id, collection),
            collection: collection.to_string(),
            properties,
            sample_count: values.len(),
            sample_value: values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
            description: format!("Discovered in collection {}", collection),
            shape_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertySketch;
    use crate::xrpc::MemoryRepository;
    use serde_json::json;

    const DID: &str = "did:plc:alice";

    fn fast_config(mode: DiscoveryMode) -> DiscoveryConfig {
        DiscoveryConfig {
            mode,
            batch_delay_ms: 1,
            ..Default::default()
        }
    }

    async fn seeded() -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new();
        repo.add_handle("alice.test", DID).await;
        for i in 0..3 {
            repo.insert(
                DID,
                "app.bsky.feed.post",
                &format!("p{}", i),
                json!({"$type": "app.bsky.feed.post", "text": "hi", "langs": ["en"]}),
            )
            .await;
        }
        repo.insert(
            DID,
            "app.bsky.feed.like",
            "l1",
            json!({"$type": "app.bsky.feed.like", "subject": {"uri": "at://x", "cid": "y"}}),
        )
        .await;
        repo.insert(
            DID,
            "xyz.custom.note",
            "n1",
            json!({"$type": "xyz.custom.note", "body": "note", "extra": 1}),
        )
        .await;
        repo.insert(DID, "xyz.custom.note", "n2", json!({"body": "untyped"})).await;
        Arc::new(repo)
    }

    #[tokio::test]
    async fn test_reported_mode_finds_uncatalogued_collections() {
        let repo = seeded().await;
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Auto));
        assert_eq!(engine.effective_mode(), DiscoveryMode::Reported);

        let descriptors = engine.discover_collections(DID).await.unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"xyz.custom.note"));
        assert_eq!(descriptors.len(), 3);

        let note = descriptors.iter().find(|d| d.name == "xyz.custom.note").unwrap();
        assert_eq!(note.record_count, 2);
        // The untyped record is counted but contributes no shape
        assert_eq!(note.sample_shapes.len(), 1);
        assert_eq!(note.shapes[0].properties["body"], PropertySketch::String);
    }

    #[tokio::test]
    async fn test_probe_mode_only_sees_catalogued_collections() {
        let repo = seeded().await;
        repo.set_describe_supported(false);
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Auto));
        assert_eq!(engine.effective_mode(), DiscoveryMode::Probe);

        let names = engine.list_collection_names(DID).await.unwrap();
        assert_eq!(names, vec!["app.bsky.feed.post", "app.bsky.feed.like"]);
    }

    #[tokio::test]
    async fn test_failing_probe_is_not_fatal() {
        let repo = seeded().await;
        repo.set_failing("app.bsky.feed.like", true).await;
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Probe));

        let descriptors = engine.discover_collections(DID).await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "app.bsky.feed.post");
    }

    #[tokio::test]
    async fn test_all_collections_failing_is_an_error() {
        let repo = seeded().await;
        let engine = DiscoveryEngine::new(repo.clone(), fast_config(DiscoveryMode::Probe));
        for name in engine.catalog().names() {
            repo.set_failing(&name, true).await;
        }

        let err = engine.discover_collections(DID).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
        assert!(!err.is_session());
        let err = engine.list_collection_names(DID).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[tokio::test]
    async fn test_describe_fallback_with_failing_collections_is_an_error() {
        let repo = seeded().await;
        repo.set_describe_supported(false);
        let engine = DiscoveryEngine::new(repo.clone(), fast_config(DiscoveryMode::Auto));
        for name in engine.catalog().names() {
            repo.set_failing(&name, true).await;
        }

        let err = engine.discover_collections(DID).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[tokio::test]
    async fn test_session_error_aborts() {
        let repo = seeded().await;
        repo.set_session_expired(true).await;
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Probe));
        let err = engine.discover_collections(DID).await.unwrap_err();
        assert!(err.is_session());
    }

    #[tokio::test]
    async fn test_reported_mode_without_describe_fails() {
        let repo = seeded().await;
        repo.set_describe_supported(false);
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Reported));
        let err = engine.discover_collections(DID).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let repo = seeded().await;
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Auto));
        let first: BTreeSet<_> = engine
            .discover_collections(DID)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        let second: BTreeSet<_> = engine
            .discover_collections(DID)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_analyze_repository() {
        let repo = seeded().await;
        let engine = DiscoveryEngine::new(repo, fast_config(DiscoveryMode::Auto));
        let analysis = engine.analyze_repository("alice.test").await.unwrap();
        assert_eq!(analysis.did, DID);
        assert_eq!(analysis.total_records, 6);
        assert_eq!(analysis.shape_counts["app.bsky.feed.post"], 3);
        assert_eq!(analysis.shapes().count(), 3);

        let like = analysis
            .shapes()
            .find(|s| s.shape_id == "app.bsky.feed.like")
            .unwrap();
        assert_eq!(like.service, "bsky.app");
        assert_eq!(like.properties["subject"].type_label(), "object");

        let err = engine.analyze_repository("nobody.test").await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[tokio::test]
    async fn test_batches_cover_all_candidates() {
        let repo = seeded().await;
        let config = DiscoveryConfig {
            mode: DiscoveryMode::Probe,
            batch_size: 3,
            batch_delay_ms: 1,
            ..Default::default()
        };
        let engine = DiscoveryEngine::new(repo.clone(), config);
        let catalogued = engine.catalog().names().len();
        engine.discover_collections(DID).await.unwrap();
        assert_eq!(repo.list_calls(), catalogued);
    }
}
