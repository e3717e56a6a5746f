use std::sync::Arc;

use crate::types::{CollectionPoint, ScoredPoint, StoredPoint};
use crate::vector_store::{VectorStore, VectorStoreError};

pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;
pub const DEFAULT_SCROLL_PAGE_SIZE: u32 = 100;

/// Collection lifecycle and batched writes on top of a [`VectorStore`] backend.
///
/// Keeps the rules the backends do not enforce themselves: creation is
/// idempotent but refuses a dimension change, deletion of a missing collection
/// succeeds, and large upserts are split into sequential batches.
#[derive(Clone)]
pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
    upsert_batch_size: usize,
    scroll_page_size: u32,
}

impl std::fmt::Debug for VectorStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreManager")
            .field("upsert_batch_size", &self.upsert_batch_size)
            .field("scroll_page_size", &self.scroll_page_size)
            .finish_non_exhaustive()
    }
}

impl VectorStoreManager {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            scroll_page_size: DEFAULT_SCROLL_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_scroll_page_size(mut self, size: u32) -> Self {
        self.scroll_page_size = size.max(1);
        self
    }

    /// Create `collection` with cosine distance unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Collection`] if the collection exists with a
    /// different dimension, or if the backend fails.
    pub async fn ensure_collection(
        &self,
        collection: &str,
        dimension: u64,
    ) -> Result<(), VectorStoreError> {
        if self.store.collection_exists(collection).await? {
            if let Some(existing) = self.store.collection_dimension(collection).await?
                && existing != dimension
            {
                return Err(VectorStoreError::Collection(format!(
                    "collection {collection} has dimension {existing}, refusing to store \
                     {dimension}-dimensional vectors"
                )));
            }
            tracing::debug!(collection, "collection already exists");
            return Ok(());
        }
        self.store.ensure_collection(collection, dimension).await?;
        tracing::info!(collection, dimension, "created collection");
        Ok(())
    }

    /// Write `points` in sequential batches and return how many were written.
    ///
    /// Batches committed before a failure stay in the collection.
    ///
    /// # Errors
    ///
    /// Returns the first backend error; later batches are not attempted.
    pub async fn upsert(
        &self,
        collection: &str,
        points: Vec<CollectionPoint>,
    ) -> Result<usize, VectorStoreError> {
        let total = points.len();
        let mut written = 0;
        let mut remaining = points.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<CollectionPoint> =
                remaining.by_ref().take(self.upsert_batch_size).collect();
            let batch_len = batch.len();
            if let Err(e) = self.store.upsert(collection, batch).await {
                tracing::error!(collection, written, total, "upsert batch failed: {e}");
                return Err(e);
            }
            written += batch_len;
            tracing::info!(collection, written, total, "upserted batch");
        }

        Ok(written)
    }

    /// Whether `collection` exists. Backend failures are logged and reported as `false`.
    pub async fn exists(&self, collection: &str) -> bool {
        match self.store.collection_exists(collection).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(collection, "collection existence check failed: {e}");
                false
            }
        }
    }

    /// Like [`exists`](Self::exists) but propagates backend failures.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn try_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        self.store.collection_exists(collection).await
    }

    /// Remove `collection`. Succeeds if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the check or the deletion fails.
    pub async fn delete(&self, collection: &str) -> Result<(), VectorStoreError> {
        if !self.store.collection_exists(collection).await? {
            tracing::debug!(collection, "delete skipped, collection does not exist");
            return Ok(());
        }
        self.store.delete_collection(collection).await?;
        tracing::info!(collection, "deleted collection");
        Ok(())
    }

    /// Nearest neighbours of `vector`, best first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        self.store.search(collection, vector, limit).await
    }

    /// Visit every stored point page by page until `visit` returns `false`.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the failing page.
    pub async fn scroll_while<F>(
        &self,
        collection: &str,
        mut visit: F,
    ) -> Result<(), VectorStoreError>
    where
        F: FnMut(StoredPoint) -> bool,
    {
        let mut offset = None;
        loop {
            let page = self
                .store
                .scroll(collection, offset, self.scroll_page_size)
                .await?;
            for point in page.points {
                if !visit(point) {
                    return Ok(());
                }
            }
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Every stored point of `collection`, in id order.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the failing page.
    pub async fn scroll_all(&self, collection: &str) -> Result<Vec<StoredPoint>, VectorStoreError> {
        let mut points = Vec::new();
        self.scroll_while(collection, |point| {
            points.push(point);
            true
        })
        .await?;
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::in_memory_store::InMemoryVectorStore;
    use crate::types::{FilePayload, ScrollPage};
    use crate::vector_store::BoxFuture;

    /// Records upsert batch sizes and fails the batch at `fail_at` (0-based), if set.
    struct RecordingStore {
        inner: InMemoryVectorStore,
        batches: Mutex<Vec<usize>>,
        fail_at: Option<usize>,
        scroll_calls: AtomicUsize,
    }

    impl RecordingStore {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                inner: InMemoryVectorStore::new(),
                batches: Mutex::new(Vec::new()),
                fail_at,
                scroll_calls: AtomicUsize::new(0),
            }
        }
    }

    impl VectorStore for RecordingStore {
        fn ensure_collection(
            &self,
            collection: &str,
            vector_size: u64,
        ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            self.inner.ensure_collection(collection, vector_size)
        }

        fn collection_exists(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
            self.inner.collection_exists(collection)
        }

        fn collection_dimension(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
            self.inner.collection_dimension(collection)
        }

        fn delete_collection(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            self.inner.delete_collection(collection)
        }

        fn upsert(
            &self,
            collection: &str,
            points: Vec<CollectionPoint>,
        ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            let index = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(points.len());
                batches.len() - 1
            };
            if self.fail_at == Some(index) {
                return Box::pin(async { Err(VectorStoreError::Upsert("injected".into())) });
            }
            self.inner.upsert(collection, points)
        }

        fn search(
            &self,
            collection: &str,
            vector: Vec<f32>,
            limit: u64,
        ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, VectorStoreError>> {
            self.inner.search(collection, vector, limit)
        }

        fn scroll(
            &self,
            collection: &str,
            offset: Option<u64>,
            limit: u32,
        ) -> BoxFuture<'_, Result<ScrollPage, VectorStoreError>> {
            self.scroll_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.scroll(collection, offset, limit)
        }
    }

    /// Every call fails as if the backend were unreachable.
    struct UnreachableStore;

    impl VectorStore for UnreachableStore {
        fn ensure_collection(
            &self,
            _: &str,
            _: u64,
        ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn collection_exists(&self, _: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn collection_dimension(
            &self,
            _: &str,
        ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn delete_collection(&self, _: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn upsert(
            &self,
            _: &str,
            _: Vec<CollectionPoint>,
        ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn search(
            &self,
            _: &str,
            _: Vec<f32>,
            _: u64,
        ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }

        fn scroll(
            &self,
            _: &str,
            _: Option<u64>,
            _: u32,
        ) -> BoxFuture<'_, Result<ScrollPage, VectorStoreError>> {
            Box::pin(async { Err(VectorStoreError::Connection("unreachable".into())) })
        }
    }

    fn points(n: u64) -> Vec<CollectionPoint> {
        (0..n)
            .map(|i| {
                CollectionPoint::new(
                    i,
                    vec![1.0, 0.0],
                    FilePayload::new(format!("file{i}.js"), "x"),
                )
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let manager = VectorStoreManager::new(Arc::new(InMemoryVectorStore::new()));
        manager.ensure_collection("repo_a_b", 2).await.unwrap();
        manager.ensure_collection("repo_a_b", 2).await.unwrap();
        assert!(manager.exists("repo_a_b").await);
    }

    #[tokio::test]
    async fn ensure_collection_rejects_dimension_change() {
        let manager = VectorStoreManager::new(Arc::new(InMemoryVectorStore::new()));
        manager.ensure_collection("repo_a_b", 2).await.unwrap();
        let err = manager.ensure_collection("repo_a_b", 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Collection(_)));
    }

    #[tokio::test]
    async fn upsert_splits_into_batches() {
        let store = Arc::new(RecordingStore::new(None));
        let manager = VectorStoreManager::new(store.clone()).with_upsert_batch_size(100);
        manager.ensure_collection("c", 2).await.unwrap();

        let written = manager.upsert("c", points(250)).await.unwrap();

        assert_eq!(written, 250);
        assert_eq!(*store.batches.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(store.inner.point_count("c"), Some(250));
    }

    #[tokio::test]
    async fn upsert_keeps_committed_batches_on_failure() {
        let store = Arc::new(RecordingStore::new(Some(1)));
        let manager = VectorStoreManager::new(store.clone()).with_upsert_batch_size(10);
        manager.ensure_collection("c", 2).await.unwrap();

        let err = manager.upsert("c", points(25)).await.unwrap_err();

        assert!(matches!(err, VectorStoreError::Upsert(_)));
        assert_eq!(store.batches.lock().unwrap().len(), 2);
        assert_eq!(store.inner.point_count("c"), Some(10));
    }

    #[tokio::test]
    async fn upsert_empty_writes_nothing() {
        let store = Arc::new(RecordingStore::new(None));
        let manager = VectorStoreManager::new(store.clone());
        assert_eq!(manager.upsert("c", Vec::new()).await.unwrap(), 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exists_is_false_when_backend_unreachable() {
        let manager = VectorStoreManager::new(Arc::new(UnreachableStore));
        assert!(!manager.exists("anything").await);
        assert!(manager.try_exists("anything").await.is_err());
    }

    #[tokio::test]
    async fn delete_missing_collection_succeeds() {
        let manager = VectorStoreManager::new(Arc::new(InMemoryVectorStore::new()));
        manager.delete("never_created").await.unwrap();
        manager.ensure_collection("c", 2).await.unwrap();
        manager.delete("c").await.unwrap();
        assert!(!manager.exists("c").await);
    }

    #[tokio::test]
    async fn delete_propagates_backend_failure() {
        let manager = VectorStoreManager::new(Arc::new(UnreachableStore));
        assert!(manager.delete("c").await.is_err());
    }

    #[tokio::test]
    async fn scroll_all_walks_every_page() {
        let store = Arc::new(RecordingStore::new(None));
        let manager = VectorStoreManager::new(store.clone()).with_scroll_page_size(4);
        manager.ensure_collection("c", 2).await.unwrap();
        manager.upsert("c", points(10)).await.unwrap();

        let all = manager.scroll_all("c").await.unwrap();

        assert_eq!(all.len(), 10);
        assert_eq!(store.scroll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn scroll_while_stops_early() {
        let store = Arc::new(RecordingStore::new(None));
        let manager = VectorStoreManager::new(store.clone()).with_scroll_page_size(4);
        manager.ensure_collection("c", 2).await.unwrap();
        manager.upsert("c", points(10)).await.unwrap();

        let mut seen = 0;
        manager
            .scroll_while("c", |point| {
                seen += 1;
                point.payload.path != "file1.js"
            })
            .await
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(store.scroll_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_sizes_never_zero() {
        let manager = VectorStoreManager::new(Arc::new(InMemoryVectorStore::new()))
            .with_upsert_batch_size(0)
            .with_scroll_page_size(0);
        assert_eq!(manager.upsert_batch_size, 1);
        assert_eq!(manager.scroll_page_size, 1);
    }
}
