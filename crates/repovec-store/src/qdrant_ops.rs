//! `Qdrant` backend for [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct, RetrievedPoint,
    ScoredPoint as QdrantScoredPoint, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder, vectors_config,
};

use crate::types::{
    CONTENT_FIELD, CONTENT_LENGTH_FIELD, CollectionPoint, FilePayload, PATH_FIELD, ScoredPoint,
    ScrollPage, StoredPoint,
};
use crate::vector_store::{BoxFuture, VectorStore, VectorStoreError};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Thin wrapper over the [`Qdrant`] gRPC client.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL, optionally authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, api_key: Option<&str>) -> QdrantResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_owned());
        }
        let client = builder.build().map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Create a cosine-distance collection unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached or collection creation fails.
    pub async fn ensure_collection(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        if self.collection_exists(collection).await? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached.
    pub async fn collection_exists(&self, collection: &str) -> QdrantResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(Box::new)
    }

    /// Read the single-vector dimension from the collection config.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection info request fails.
    pub async fn collection_dimension(&self, collection: &str) -> QdrantResult<Option<u64>> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(Box::new)?;
        Ok(info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.size),
                vectors_config::Config::ParamsMap(_) => None,
            }))
    }

    /// # Errors
    ///
    /// Returns an error if the collection cannot be deleted.
    pub async fn delete_collection(&self, collection: &str) -> QdrantResult<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Upsert points and wait for the write to be applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> QdrantResult<Vec<QdrantScoredPoint>> {
        let builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// Fetch one page of points (payload only) starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scroll request fails.
    pub async fn scroll_page(
        &self,
        collection: &str,
        offset: Option<u64>,
        limit: u32,
    ) -> QdrantResult<(Vec<RetrievedPoint>, Option<PointId>)> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .with_payload(true)
            .with_vectors(false)
            .limit(limit);
        if let Some(off) = offset {
            builder = builder.offset(PointId::from(off));
        }
        let response = self.client.scroll(builder).await.map_err(Box::new)?;
        Ok((response.result, response.next_page_offset))
    }

    /// Convert a JSON value to a Qdrant payload map.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if deserialization fails.
    pub fn json_to_payload(
        value: serde_json::Value,
    ) -> Result<HashMap<String, Value>, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.ensure_collection(&collection, vector_size)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn collection_dimension(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.collection_dimension(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<CollectionPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_points = points
                .into_iter()
                .map(point_to_qdrant)
                .collect::<Result<Vec<_>, _>>()?;
            self.upsert(&collection, qdrant_points)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let results = self
                .search(&collection, vector, limit)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().filter_map(scored_from_qdrant).collect())
        })
    }

    fn scroll(
        &self,
        collection: &str,
        offset: Option<u64>,
        limit: u32,
    ) -> BoxFuture<'_, Result<ScrollPage, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let (points, next) = self
                .scroll_page(&collection, offset, limit)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
            Ok(ScrollPage {
                points: points.into_iter().filter_map(stored_from_qdrant).collect(),
                next_offset: next.and_then(numeric_id),
            })
        })
    }
}

fn point_to_qdrant(point: CollectionPoint) -> Result<PointStruct, VectorStoreError> {
    let (id, vector, payload) = point.into_parts();
    let json =
        serde_json::to_value(&payload).map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    let payload = QdrantOps::json_to_payload(json)
        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
    Ok(PointStruct::new(id, vector, payload))
}

fn numeric_id(id: PointId) -> Option<u64> {
    match id.point_id_options? {
        PointIdOptions::Num(n) => Some(n),
        PointIdOptions::Uuid(_) => None,
    }
}

fn payload_from_qdrant(payload: &HashMap<String, Value>) -> Option<FilePayload> {
    let path = payload.get(PATH_FIELD).and_then(Value::as_str)?.clone();
    let content = payload.get(CONTENT_FIELD).and_then(Value::as_str)?.clone();
    let content_length = payload
        .get(CONTENT_LENGTH_FIELD)
        .and_then(Value::as_integer)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or_else(|| content.chars().count());
    Some(FilePayload {
        path,
        content,
        content_length,
    })
}

fn scored_from_qdrant(point: QdrantScoredPoint) -> Option<ScoredPoint> {
    let payload = payload_from_qdrant(&point.payload);
    if payload.is_none() {
        tracing::warn!("skipping search hit without path/content payload");
    }
    Some(ScoredPoint {
        id: numeric_id(point.id?)?,
        score: point.score,
        payload: payload?,
    })
}

fn stored_from_qdrant(point: RetrievedPoint) -> Option<StoredPoint> {
    Some(StoredPoint {
        payload: payload_from_qdrant(&point.payload)?,
        id: numeric_id(point.id?)?,
    })
}
