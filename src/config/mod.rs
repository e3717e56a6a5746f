mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use repovec_embed::ModelSource;
use repovec_index::{LoaderConfig, SearchConfig};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.qdrant_url.trim().is_empty() {
            bail!("store.qdrant_url must not be empty");
        }
        if self.store.upsert_batch_size == 0 {
            bail!("store.upsert_batch_size must be at least 1");
        }
        if self.store.scroll_page_size == 0 {
            bail!("store.scroll_page_size must be at least 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be at least 1");
        }
        if self.search.max_top_k == 0 {
            bail!("search.max_top_k must be at least 1");
        }
        let weight = self.search.vector_weight;
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            bail!("search.vector_weight must be within [0, 1], got {weight}");
        }
        Ok(())
    }

    /// A local model directory wins over the hub repository id.
    #[must_use]
    pub fn model_source(&self) -> ModelSource {
        match &self.embedding.model_path {
            Some(path) => ModelSource::Local { path: path.clone() },
            None => ModelSource::HuggingFace {
                repo_id: self.embedding.model.clone(),
            },
        }
    }

    #[must_use]
    pub fn loader_config(&self) -> LoaderConfig {
        let mut loader = LoaderConfig {
            keep_clones: self.ingest.keep_clones,
            ..LoaderConfig::default()
        };
        if let Some(root) = &self.ingest.clone_root {
            loader.clone_root.clone_from(root);
        }
        loader
    }

    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            max_top_k: self.search.max_top_k,
            vector_weight: self.search.vector_weight,
        }
    }
}

/// `--config`, then `REPOVEC_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REPOVEC_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
