//! Error types for repovec-index.

/// Errors raised by ingestion and search.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The requested collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Ingestion cannot complete: bad source, no qualifying files, count
    /// mismatch, or a failed store write.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// A caller-supplied argument is outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding error: {0}")]
    Embed(#[from] repovec_embed::EmbedError),

    #[error("vector store error: {0}")]
    Store(#[from] repovec_store::VectorStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
