use std::path::PathBuf;

use repovec_index::ReingestPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchSettings,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: u32,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("qdrant_url", &self.qdrant_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("upsert_batch_size", &self.upsert_batch_size)
            .field("scroll_page_size", &self.scroll_page_size)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            api_key: None,
            upsert_batch_size: default_upsert_batch_size(),
            scroll_page_size: default_scroll_page_size(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_upsert_batch_size() -> usize {
    repovec_store::DEFAULT_UPSERT_BATCH_SIZE
}

fn default_scroll_page_size() -> u32 {
    repovec_store::DEFAULT_SCROLL_PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// HuggingFace repository id, used when `model_path` is unset.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Local directory with `config.json`, `tokenizer.json` and `model.safetensors`.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            model_path: None,
            batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".into()
}

fn default_embedding_batch_size() -> usize {
    repovec_embed::DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Parent directory for shallow clones; `<tmp>/repovec` when unset.
    #[serde(default)]
    pub clone_root: Option<PathBuf>,
    #[serde(default)]
    pub keep_clones: bool,
    #[serde(default)]
    pub reingest: ReingestPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_top_k: default_max_top_k(),
            vector_weight: default_vector_weight(),
        }
    }
}

fn default_max_top_k() -> usize {
    repovec_index::search::DEFAULT_MAX_TOP_K
}

fn default_vector_weight() -> f32 {
    repovec_index::search::DEFAULT_VECTOR_WEIGHT
}
