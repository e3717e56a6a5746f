//! Sentence embeddings for repository files and search queries.
//!
//! A BERT encoder (Candle) is loaded once per [`EmbeddingGenerator`] and shared
//! by every caller holding that generator. Vectors are mean-pooled over tokens
//! and left unnormalized; the vector store applies cosine distance.

pub mod embedder;
pub mod error;
pub mod generator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;

pub use candle_core::Device;
pub use embedder::TextEmbedder;
pub use error::{EmbedError, Result};
pub use generator::{DEFAULT_BATCH_SIZE, EmbeddingGenerator};
pub use model::{BertEmbedder, ModelSource, preferred_device};
