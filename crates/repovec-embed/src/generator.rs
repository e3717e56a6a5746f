//! Lazily-loaded, batched embedding generation.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::embedder::TextEmbedder;
use crate::error::EmbedError;
use crate::model::{BertEmbedder, ModelSource};

pub const DEFAULT_BATCH_SIZE: usize = 32;

type LoadFn = dyn Fn() -> Result<Arc<dyn TextEmbedder>, EmbedError> + Send + Sync;

/// Owns one shared embedding model, loaded on first use.
///
/// Initialization is single-flight: concurrent first callers wait on the same
/// load instead of each loading their own copy. A failed load leaves the cell
/// empty so the next call retries.
pub struct EmbeddingGenerator {
    loader: Arc<LoadFn>,
    model: OnceCell<Arc<dyn TextEmbedder>>,
    batch_size: usize,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("loaded", &self.model.initialized())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl EmbeddingGenerator {
    /// Create a generator that calls `loader` (on a blocking thread) the first time a
    /// vector is requested.
    #[must_use]
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextEmbedder>, EmbedError> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            model: OnceCell::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Generator backed by a BERT sentence encoder.
    #[must_use]
    pub fn bert(source: ModelSource, device: candle_core::Device) -> Self {
        Self::new(move || {
            let model = BertEmbedder::load(&source, &device)?;
            Ok(Arc::new(model) as Arc<dyn TextEmbedder>)
        })
    }

    /// Generator around an already-loaded embedder.
    #[must_use]
    pub fn from_embedder(embedder: Arc<dyn TextEmbedder>) -> Self {
        let ready = Arc::clone(&embedder);
        Self {
            loader: Arc::new(move || Ok(Arc::clone(&embedder))),
            model: OnceCell::new_with(Some(ready)),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Name of the loaded model, `None` until the first embedding call.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model.get().map(|model| model.name())
    }

    async fn model(&self) -> Result<Arc<dyn TextEmbedder>, EmbedError> {
        self.model
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                tracing::info!("loading embedding model");
                let model = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| EmbedError::Task(format!("model load task failed: {e}")))??;
                tracing::info!(model = model.name(), "embedding model loaded");
                Ok::<_, EmbedError>(model)
            })
            .await
            .cloned()
    }

    /// Embed many texts, preserving input order.
    ///
    /// Batches run strictly one after another; texts inside a batch are embedded
    /// concurrently on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails to load or any single embedding fails.
    /// No partial result is returned.
    pub async fn embed<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let total_batches = texts.len().div_ceil(self.batch_size);
        let mut vectors = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            let tasks = batch.iter().map(|text| {
                let model = Arc::clone(&model);
                let text = text.as_ref().to_owned();
                tokio::task::spawn_blocking(move || model.embed_sync(&text))
            });

            for joined in futures::future::join_all(tasks).await {
                let vector =
                    joined.map_err(|e| EmbedError::Task(format!("embedding task failed: {e}")))??;
                vectors.push(vector);
            }

            tracing::debug!(
                batch = index + 1,
                total_batches,
                embedded = vectors.len(),
                "embedding batch complete"
            );
        }

        check_dimensions(&vectors)?;
        Ok(vectors)
    }

    /// Embed a single text, typically a search query.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails to load or inference fails.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let model = self.model().await?;
        let text = text.to_owned();
        let vector = tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| EmbedError::Task(format!("embedding task failed: {e}")))??;
        check_dimensions(std::slice::from_ref(&vector))?;
        Ok(vector)
    }
}

fn check_dimensions(vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(EmbedError::Inference("model produced an empty vector".into()));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
        return Err(EmbedError::Inference(format!(
            "inconsistent vector dimensions: {} vs {}",
            first.len(),
            bad.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct LengthEmbedder;

    impl TextEmbedder for LengthEmbedder {
        #[allow(clippy::cast_precision_loss)]
        fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text == "boom" {
                return Err(EmbedError::Inference("boom".into()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn name(&self) -> &str {
            "length"
        }
    }

    #[tokio::test]
    async fn embed_preserves_order_across_batches() {
        let generator =
            EmbeddingGenerator::from_embedder(Arc::new(LengthEmbedder)).with_batch_size(2);
        let texts = ["a", "bbb", "cc", "dddd", "eeeee"];
        let vectors = generator.embed(&texts[..]).await.unwrap();
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 3.0, 2.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn embed_empty_input_does_not_load_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let generator = EmbeddingGenerator::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LengthEmbedder) as Arc<dyn TextEmbedder>)
        });
        let vectors = generator.embed::<String>(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!generator.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let generator = Arc::new(EmbeddingGenerator::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(Arc::new(LengthEmbedder) as Arc<dyn TextEmbedder>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let generator = Arc::clone(&generator);
                tokio::spawn(async move { generator.embed_one(&format!("query {i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(generator.is_loaded());
    }

    #[tokio::test]
    async fn model_name_known_after_load() {
        let generator =
            EmbeddingGenerator::new(|| Ok(Arc::new(LengthEmbedder) as Arc<dyn TextEmbedder>));
        assert_eq!(generator.model_name(), None);
        generator.embed_one("q").await.unwrap();
        assert_eq!(generator.model_name(), Some("length"));
    }

    #[tokio::test]
    async fn failed_load_propagates_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let generator = EmbeddingGenerator::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EmbedError::ModelLoad("no weights".into()))
        });

        let err = generator.embed_one("q").await.unwrap_err();
        assert!(matches!(err, EmbedError::ModelLoad(_)));
        assert!(!generator.is_loaded());

        let _ = generator.embed(&["a"][..]).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn inference_failure_fails_whole_call() {
        let generator = EmbeddingGenerator::from_embedder(Arc::new(LengthEmbedder));
        let err = generator.embed(&["ok", "boom", "fine"][..]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Inference(_)));
    }

    #[test]
    fn batch_size_never_zero() {
        let generator =
            EmbeddingGenerator::from_embedder(Arc::new(LengthEmbedder)).with_batch_size(0);
        assert_eq!(generator.batch_size(), 1);
    }

    #[test]
    fn check_dimensions_rejects_mismatch() {
        let err = check_dimensions(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("inconsistent"));
        assert!(check_dimensions(&[vec![]]).is_err());
        assert!(check_dimensions(&[]).is_ok());
    }
}
