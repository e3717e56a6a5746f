//! Ingestion orchestrator: load → embed → store.

use std::sync::Arc;

use repovec_embed::EmbeddingGenerator;
use repovec_store::{CollectionPoint, FilePayload, VectorStoreManager};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::loader::RepoLoader;
use crate::locator::RepoLocator;
use crate::naming::resolve_collection_name;

/// What to do with an existing collection when its repository is ingested again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReingestPolicy {
    /// Delete the collection first so no point from an earlier run survives.
    #[default]
    Recreate,
    /// Write over ids `0..N`; points with higher ids from a larger earlier run remain.
    Overwrite,
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub points_written: usize,
    pub dimension: u64,
    /// Embedding model that produced the vectors.
    pub model: String,
    pub duration_ms: u64,
}

/// Turns repositories into collections, one collection per repository.
#[derive(Debug, Clone)]
pub struct RepoIndexer {
    loader: RepoLoader,
    embedder: Arc<EmbeddingGenerator>,
    store: VectorStoreManager,
    policy: ReingestPolicy,
}

impl RepoIndexer {
    #[must_use]
    pub fn new(
        loader: RepoLoader,
        embedder: Arc<EmbeddingGenerator>,
        store: VectorStoreManager,
    ) -> Self {
        Self {
            loader,
            embedder,
            store,
            policy: ReingestPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReingestPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Collection that `locator` is (or would be) stored in.
    #[must_use]
    pub fn collection_name(&self, locator: &RepoLocator, explicit: Option<&str>) -> String {
        resolve_collection_name(locator, explicit)
    }

    /// Load, embed and store every qualifying file of `locator`.
    ///
    /// Point ids are assigned `0..N` in load order. A remote clone is removed
    /// once its files are read, whether loading succeeded or not, unless clones
    /// are kept.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Ingestion`] if the repository cannot be loaded, has no
    /// qualifying files, the vector count does not match the file count, or a
    /// store write fails. Embedding failures propagate as [`IndexError::Embed`].
    pub async fn ingest(
        &self,
        locator: &RepoLocator,
        explicit: Option<&str>,
    ) -> Result<IngestReport> {
        let start = std::time::Instant::now();
        let collection = self.collection_name(locator, explicit);
        tracing::info!(%locator, collection = %collection, "ingestion started");

        let loaded = self.loader.load(locator, &collection).await?;

        let texts: Vec<&str> = loaded.files.iter().map(|f| f.content.as_str()).collect();
        let vectors = self.embedder.embed(&texts[..]).await?;
        if vectors.len() != loaded.files.len() {
            return Err(IndexError::Ingestion(format!(
                "embedding count {} does not match file count {}",
                vectors.len(),
                loaded.files.len()
            )));
        }
        let dimension = vectors
            .first()
            .map(|v| u64::try_from(v.len()).unwrap_or(u64::MAX))
            .ok_or_else(|| IndexError::Ingestion("no embeddings produced".to_owned()))?;

        self.prepare_collection(&collection, dimension).await?;

        let files_indexed = loaded.files.len();
        let points = loaded
            .files
            .into_iter()
            .zip(vectors)
            .zip(0u64..)
            .map(|((file, vector), id)| {
                CollectionPoint::new(id, vector, FilePayload::new(file.path, file.content))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| IndexError::Ingestion(e.to_string()))?;

        let points_written = self
            .store
            .upsert(&collection, points)
            .await
            .map_err(|e| IndexError::Ingestion(format!("writing {collection}: {e}")))?;

        let report = IngestReport {
            collection,
            files_indexed,
            files_skipped: loaded.skipped,
            points_written,
            dimension,
            model: self.embedder.model_name().unwrap_or_default().to_owned(),
            duration_ms: start.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
        };
        tracing::info!(
            collection = %report.collection,
            files = report.files_indexed,
            skipped = report.files_skipped,
            points = report.points_written,
            model = %report.model,
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn prepare_collection(&self, collection: &str, dimension: u64) -> Result<()> {
        match self.policy {
            ReingestPolicy::Recreate => {
                self.store
                    .delete(collection)
                    .await
                    .map_err(|e| IndexError::Ingestion(format!("clearing {collection}: {e}")))?;
            }
            ReingestPolicy::Overwrite => {
                if self.store.exists(collection).await {
                    tracing::warn!(
                        collection,
                        "overwriting existing collection; points from a larger earlier ingestion may remain"
                    );
                }
            }
        }
        self.store
            .ensure_collection(collection, dimension)
            .await
            .map_err(|e| IndexError::Ingestion(format!("preparing {collection}: {e}")))
    }

    /// Remove the collection of `locator`. Returns the collection name; a missing
    /// collection is not an error.
    ///
    /// # Errors
    ///
    /// Returns the store error if the deletion fails.
    pub async fn delete(&self, locator: &RepoLocator, explicit: Option<&str>) -> Result<String> {
        let collection = self.collection_name(locator, explicit);
        self.store.delete(&collection).await?;
        Ok(collection)
    }

    /// Whether a collection exists for `locator`. Store failures read as `false`.
    pub async fn is_indexed(&self, locator: &RepoLocator, explicit: Option<&str>) -> bool {
        self.store
            .exists(&self.collection_name(locator, explicit))
            .await
    }
}
