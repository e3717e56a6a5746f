use crate::error::EmbedError;

/// A loaded sentence-embedding model.
///
/// Implementations are blocking: the generator calls them from
/// `spawn_blocking` so inference never stalls the async runtime.
pub trait TextEmbedder: Send + Sync + 'static {
    /// Embed one text into a fixed-length vector.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the forward pass fails.
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn name(&self) -> &str;
}
