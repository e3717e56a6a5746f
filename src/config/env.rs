use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REPOVEC_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REPOVEC_QDRANT_API_KEY")
            .or_else(|_| std::env::var("QDRANT_API_KEY"))
            && !v.is_empty()
        {
            self.store.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("REPOVEC_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("REPOVEC_EMBEDDING_BATCH_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.embedding.batch_size = size;
            } else {
                tracing::warn!("ignoring invalid REPOVEC_EMBEDDING_BATCH_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOVEC_KEEP_CLONES") {
            if let Ok(keep) = v.parse::<bool>() {
                self.ingest.keep_clones = keep;
            } else {
                tracing::warn!("ignoring invalid REPOVEC_KEEP_CLONES value: {v}");
            }
        }
    }
}
