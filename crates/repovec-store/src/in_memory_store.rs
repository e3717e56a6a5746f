use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::types::{CollectionPoint, FilePayload, ScoredPoint, ScrollPage, StoredPoint};
use crate::vector_store::{BoxFuture, VectorStore, VectorStoreError};

struct StoredVector {
    vector: Vec<f32>,
    payload: FilePayload,
}

struct InMemoryCollection {
    dims: u64,
    points: BTreeMap<u64, StoredVector>,
}

/// Process-local [`VectorStore`] with brute-force cosine search.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points currently held by `collection`, if it exists.
    #[must_use]
    pub fn point_count(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .ok()?
            .get(collection)
            .map(|c| c.points.len())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn not_found(collection: &str) -> String {
    format!("collection {collection} not found")
}

fn dims_of(vector: &[f32]) -> u64 {
    u64::try_from(vector.len()).unwrap_or(u64::MAX)
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection)
                .or_insert_with(|| InMemoryCollection {
                    dims: vector_size,
                    points: BTreeMap::new(),
                });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn collection_dimension(
        &self,
        collection: &str,
    ) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| VectorStoreError::Collection(not_found(&collection)))?;
            Ok(Some(col.dims))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            cols.remove(&collection)
                .map(|_| ())
                .ok_or_else(|| VectorStoreError::Delete(not_found(&collection)))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<CollectionPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| VectorStoreError::Upsert(not_found(&collection)))?;
            if let Some(bad) = points.iter().find(|p| dims_of(p.vector()) != col.dims) {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has dimension {}, collection expects {}",
                    bad.id(),
                    bad.vector().len(),
                    col.dims
                )));
            }
            for point in points {
                let (id, vector, payload) = point.into_parts();
                col.points.insert(id, StoredVector { vector, payload });
            }
            Ok(())
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
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| VectorStoreError::Search(not_found(&collection)))?;
            if dims_of(&vector) != col.dims {
                return Err(VectorStoreError::Search(format!(
                    "query has dimension {}, collection expects {}",
                    vector.len(),
                    col.dims
                )));
            }

            let mut scored: Vec<ScoredPoint> = col
                .points
                .iter()
                .map(|(id, sv)| ScoredPoint {
                    id: *id,
                    score: cosine_similarity(&vector, &sv.vector),
                    payload: sv.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            });
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
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
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| VectorStoreError::Scroll(not_found(&collection)))?;

            let limit = usize::try_from(limit).unwrap_or(usize::MAX).max(1);
            let mut remaining = col.points.range(offset.unwrap_or(0)..);
            let points: Vec<StoredPoint> = remaining
                .by_ref()
                .take(limit)
                .map(|(id, sv)| StoredPoint {
                    id: *id,
                    payload: sv.payload.clone(),
                })
                .collect();
            let next_offset = remaining.next().map(|(id, _)| *id);

            Ok(ScrollPage {
                points,
                next_offset,
            })
        })
    }
}
