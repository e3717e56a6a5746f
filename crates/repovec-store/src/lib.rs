//! Named vector collections of repository files.
//!
//! [`VectorStore`] is the backend seam, implemented by [`QdrantOps`] for a
//! running Qdrant server and [`InMemoryVectorStore`] for tests and local use.
//! [`VectorStoreManager`] layers collection lifecycle rules and batching on top.

pub mod in_memory_store;
pub mod manager;
pub mod qdrant_ops;
pub mod types;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use manager::{DEFAULT_SCROLL_PAGE_SIZE, DEFAULT_UPSERT_BATCH_SIZE, VectorStoreManager};
pub use qdrant_ops::QdrantOps;
pub use types::{CollectionPoint, FilePayload, ScoredPoint, ScrollPage, StoredPoint};
pub use vector_store::{VectorStore, VectorStoreError};
