//! Vector, keyword, hybrid and multi-repository search over ingested collections.
//!
//! Keyword search scans the whole collection in pages and scores every file in
//! memory. That is fine for repositories of a few thousand files; there is no
//! inverted index behind it.

use std::collections::HashMap;
use std::sync::Arc;

use repovec_embed::EmbeddingGenerator;
use repovec_store::{ScoredPoint, VectorStoreManager};
use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::loader::FileRecord;

pub const DEFAULT_MAX_TOP_K: usize = 50;
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.7;

const PATH_MATCH_SCORE: u32 = 10;
const STEM_MATCH_SCORE: u32 = 5;
const MAX_CONTENT_SCORE: u32 = 5;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub content: String,
    pub score: f32,
    /// Source collection, set by multi-repository search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl SearchHit {
    fn from_scored(point: ScoredPoint) -> Self {
        Self {
            path: point.payload.path,
            content: point.payload.content,
            score: point.score,
            collection: None,
        }
    }
}

/// A path after score fusion, with both normalized inputs kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub path: String,
    pub content: String,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
}

impl From<FusedHit> for SearchHit {
    fn from(hit: FusedHit) -> Self {
        Self {
            path: hit.path,
            content: hit.content,
            score: hit.combined_score,
            collection: None,
        }
    }
}

/// Search limits.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Largest accepted `top_k`.
    pub max_top_k: usize,
    /// Weight of the vector signal in hybrid search when the caller gives none.
    pub vector_weight: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_top_k: DEFAULT_MAX_TOP_K,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
        }
    }
}

/// Read-only queries against collections written by [`RepoIndexer`](crate::RepoIndexer).
#[derive(Debug, Clone)]
pub struct SearchEngine {
    store: VectorStoreManager,
    embedder: Arc<EmbeddingGenerator>,
    config: SearchConfig,
}

impl SearchEngine {
    #[must_use]
    pub fn new(
        store: VectorStoreManager,
        embedder: Arc<EmbeddingGenerator>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Files most similar to `query` by embedding, best first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionNotFound`] if `collection` does not exist,
    /// [`IndexError::InvalidArgument`] for an out-of-range `top_k`, or the
    /// embedding/store error.
    pub async fn vector_search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_top_k(top_k)?;
        self.require_collection(collection).await?;
        let vector = self.embedder.embed_one(query).await?;
        self.nearest(collection, vector, top_k).await
    }

    /// Files whose path or content mention `keyword`, best first. Zero-score
    /// files are never returned.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionNotFound`] if `collection` does not exist,
    /// [`IndexError::InvalidArgument`] for a blank keyword or out-of-range
    /// `top_k`, or the store error.
    pub async fn keyword_search(
        &self,
        collection: &str,
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_top_k(top_k)?;
        check_keyword(keyword)?;
        self.require_collection(collection).await?;
        self.keyword_ranked(collection, keyword, top_k).await
    }

    /// Weighted fusion of vector and keyword search.
    ///
    /// Each side fetches `2 * top_k` hits and is normalized by its own maximum
    /// before `vector_weight * vector + (1 - vector_weight) * keyword` is ranked.
    /// Without a keyword only the vector side contributes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] for an out-of-range `top_k` or
    /// weight or a blank keyword, [`IndexError::CollectionNotFound`] if the
    /// collection does not exist, or the embedding/store error.
    pub async fn combined_search(
        &self,
        collection: &str,
        query: &str,
        keyword: Option<&str>,
        top_k: usize,
        vector_weight: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        self.check_top_k(top_k)?;
        let weight = vector_weight.unwrap_or(self.config.vector_weight);
        check_weight(weight)?;
        if let Some(keyword) = keyword {
            check_keyword(keyword)?;
        }
        self.require_collection(collection).await?;

        let fetch = top_k.saturating_mul(2);
        let vector = self.embedder.embed_one(query).await?;
        let vector_hits = self.nearest(collection, vector, fetch).await?;
        let keyword_hits = match keyword {
            Some(keyword) => self.keyword_ranked(collection, keyword, fetch).await?,
            None => Vec::new(),
        };

        let mut fused = fuse(&vector_hits, &keyword_hits, weight);
        fused.truncate(top_k);
        tracing::debug!(collection, results = fused.len(), weight, "hybrid search");
        Ok(fused.into_iter().map(SearchHit::from).collect())
    }

    /// Vector search across several collections, ranked together by raw score.
    ///
    /// Collections that are missing or fail are logged and skipped. Each hit
    /// carries the name of its source collection.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] for an out-of-range `top_k`, or the
    /// embedding error.
    pub async fn multi_search<S: AsRef<str>>(
        &self,
        collections: &[S],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_top_k(top_k)?;
        if collections.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_one(query).await?;
        let fetch = as_limit(top_k.saturating_mul(2));
        let mut hits = Vec::new();

        for collection in collections {
            let collection = collection.as_ref();
            match self.store.try_exists(collection).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(collection, "skipping missing collection");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(collection, "skipping collection, existence check failed: {e}");
                    continue;
                }
            }
            match self.store.search(collection, vector.clone(), fetch).await {
                Ok(points) => hits.extend(points.into_iter().map(|p| SearchHit {
                    collection: Some(collection.to_owned()),
                    ..SearchHit::from_scored(p)
                })),
                Err(e) => tracing::warn!(collection, "skipping collection, search failed: {e}"),
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// The stored file at exactly `path`, if any. Stops scrolling at the first match.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CollectionNotFound`] if `collection` does not exist,
    /// or the store error.
    pub async fn get_by_path(&self, collection: &str, path: &str) -> Result<Option<FileRecord>> {
        self.require_collection(collection).await?;
        let mut found = None;
        self.store
            .scroll_while(collection, |point| {
                if point.payload.path == path {
                    found = Some(FileRecord {
                        path: point.payload.path,
                        content: point.payload.content,
                    });
                    false
                } else {
                    true
                }
            })
            .await?;
        Ok(found)
    }

    async fn nearest(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let points = self.store.search(collection, vector, as_limit(limit)).await?;
        Ok(points.into_iter().map(SearchHit::from_scored).collect())
    }

    async fn keyword_ranked(
        &self,
        collection: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let keyword = keyword.trim().to_lowercase();
        let points = self.store.scroll_all(collection).await?;
        let scanned = points.len();

        let mut hits: Vec<SearchHit> = points
            .into_iter()
            .filter_map(|point| {
                let score = keyword_score(&point.payload.path, &point.payload.content, &keyword);
                if score == 0 {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                let score = score as f32;
                Some(SearchHit {
                    path: point.payload.path,
                    content: point.payload.content,
                    score,
                    collection: None,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(limit);
        tracing::debug!(collection, scanned, matched = hits.len(), "keyword search");
        Ok(hits)
    }

    async fn require_collection(&self, collection: &str) -> Result<()> {
        if self.store.try_exists(collection).await? {
            Ok(())
        } else {
            Err(IndexError::CollectionNotFound(collection.to_owned()))
        }
    }

    fn check_top_k(&self, top_k: usize) -> Result<()> {
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(IndexError::InvalidArgument(format!(
                "top_k must be between 1 and {}, got {top_k}",
                self.config.max_top_k
            )));
        }
        Ok(())
    }
}

/// Heuristic relevance of one file for a lowercase `keyword`.
///
/// `+10` when the path contains the keyword, `+5` more when the path (or the
/// path without its extension) ends with it, plus one per occurrence in the
/// content up to 5. All matching is case-insensitive.
#[must_use]
pub fn keyword_score(path: &str, content: &str, keyword: &str) -> u32 {
    if keyword.is_empty() {
        return 0;
    }
    let path = path.to_lowercase();
    let mut score = 0;

    if path.contains(keyword) {
        score += PATH_MATCH_SCORE;
        let stem = path.rsplit_once('.').map_or(path.as_str(), |(stem, _)| stem);
        if path.ends_with(keyword) || stem.ends_with(keyword) {
            score += STEM_MATCH_SCORE;
        }
    }

    let occurrences = content
        .to_lowercase()
        .matches(keyword)
        .take(MAX_CONTENT_SCORE as usize)
        .count();
    score + u32::try_from(occurrences).unwrap_or(MAX_CONTENT_SCORE)
}

/// Merge vector and keyword hits by path and rank by weighted normalized score.
///
/// Each side is divided by its own maximum; a side that is empty or has no
/// positive score contributes 0. Ties are broken by path.
#[must_use]
pub fn fuse(
    vector_hits: &[SearchHit],
    keyword_hits: &[SearchHit],
    vector_weight: f32,
) -> Vec<FusedHit> {
    let weight = vector_weight.clamp(0.0, 1.0);
    let mut merged: HashMap<&str, FusedHit> = HashMap::new();

    for (hit, normalized) in vector_hits.iter().zip(normalize(vector_hits)) {
        let entry = merged.entry(hit.path.as_str()).or_insert_with(|| empty_fused(hit));
        entry.vector_score = entry.vector_score.max(normalized);
    }
    for (hit, normalized) in keyword_hits.iter().zip(normalize(keyword_hits)) {
        let entry = merged.entry(hit.path.as_str()).or_insert_with(|| empty_fused(hit));
        entry.keyword_score = entry.keyword_score.max(normalized);
    }

    let mut fused: Vec<FusedHit> = merged
        .into_values()
        .map(|mut hit| {
            hit.combined_score = (weight * hit.vector_score + (1.0 - weight) * hit.keyword_score)
                .clamp(0.0, 1.0);
            hit
        })
        .collect();
    fused.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.path.cmp(&b.path))
    });
    fused
}

fn empty_fused(hit: &SearchHit) -> FusedHit {
    FusedHit {
        path: hit.path.clone(),
        content: hit.content.clone(),
        vector_score: 0.0,
        keyword_score: 0.0,
        combined_score: 0.0,
    }
}

fn normalize(hits: &[SearchHit]) -> Vec<f32> {
    let max = hits
        .iter()
        .map(|h| h.score)
        .filter(|s| s.is_finite())
        .fold(0.0f32, f32::max);
    if max <= 0.0 {
        return vec![0.0; hits.len()];
    }
    hits.iter()
        .map(|h| (h.score / max).clamp(0.0, 1.0))
        .map(|s| if s.is_nan() { 0.0 } else { s })
        .collect()
}

fn check_keyword(keyword: &str) -> Result<()> {
    if keyword.trim().is_empty() {
        return Err(IndexError::InvalidArgument(
            "keyword must not be blank".to_owned(),
        ));
    }
    Ok(())
}

fn check_weight(weight: f32) -> Result<()> {
    if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
        return Err(IndexError::InvalidArgument(format!(
            "vector weight must be within [0, 1], got {weight}"
        )));
    }
    Ok(())
}

fn as_limit(top_k: usize) -> u64 {
    u64::try_from(top_k).unwrap_or(u64::MAX)
}
