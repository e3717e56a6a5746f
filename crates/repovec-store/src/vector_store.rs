use std::future::Future;
use std::pin::Pin;

use crate::types::{CollectionPoint, ScoredPoint, ScrollPage};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("scroll error: {0}")]
    Scroll(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid point: {0}")]
    InvalidPoint(String),
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Backend operations over named vector collections.
///
/// Collections use cosine distance. Implementations report missing collections
/// through errors; the policy layer on top lives in
/// [`VectorStoreManager`](crate::manager::VectorStoreManager).
pub trait VectorStore: Send + Sync {
    /// Create the collection with `vector_size` dimensions if it is absent.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Vector dimension fixed at creation, or `None` if it cannot be determined.
    fn collection_dimension(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Write points and return once the backend has acknowledged them.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<CollectionPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, VectorStoreError>>;

    /// Fetch up to `limit` points in id order, starting at `offset` (inclusive).
    fn scroll(
        &self,
        collection: &str,
        offset: Option<u64>,
        limit: u32,
    ) -> BoxFuture<'_, Result<ScrollPage, VectorStoreError>>;
}
