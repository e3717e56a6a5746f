use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};

use crate::embedder::TextEmbedder;
use crate::error::EmbedError;

/// Sequence cap used when `config.json` does not declare one.
const DEFAULT_MAX_POSITIONS: usize = 512;

/// Where the BERT weights, tokenizer and config come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Directory containing `config.json`, `tokenizer.json` and `model.safetensors`.
    Local { path: PathBuf },
    HuggingFace { repo_id: String },
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "local:{}", path.display()),
            Self::HuggingFace { repo_id } => f.write_str(repo_id),
        }
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelSource {
    fn resolve(&self) -> Result<ModelFiles, EmbedError> {
        match self {
            Self::Local { path } => {
                let files = ModelFiles {
                    config: path.join("config.json"),
                    tokenizer: path.join("tokenizer.json"),
                    weights: path.join("model.safetensors"),
                };
                for required in [&files.config, &files.tokenizer, &files.weights] {
                    if !required.is_file() {
                        return Err(EmbedError::ModelLoad(format!(
                            "missing {} in local model directory",
                            required.display()
                        )));
                    }
                }
                Ok(files)
            }
            Self::HuggingFace { repo_id } => {
                let api = hf_hub::api::sync::Api::new().map_err(|e| {
                    EmbedError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
                })?;
                let repo = api.model(repo_id.clone());
                let fetch = |name: &str| {
                    repo.get(name).map_err(|e| {
                        EmbedError::ModelLoad(format!(
                            "failed to download {name} from {repo_id}: {e}"
                        ))
                    })
                };
                Ok(ModelFiles {
                    config: fetch("config.json")?,
                    tokenizer: fetch("tokenizer.json")?,
                    weights: fetch("model.safetensors")?,
                })
            }
        }
    }
}

/// Pick the best available device for the enabled backend features.
#[must_use]
pub fn preferred_device() -> Device {
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        return device;
    }
    Device::Cpu
}

/// BERT-family sentence encoder producing mean-pooled, unnormalized vectors.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    source: String,
}

impl std::fmt::Debug for BertEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedder")
            .field("source", &self.source)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl BertEmbedder {
    /// Load a BERT embedding model from a local directory or the `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns an error if any model file is missing, cannot be downloaded, or fails to parse.
    pub fn load(source: &ModelSource, device: &Device) -> Result<Self, EmbedError> {
        let files = source.resolve()?;

        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        let max_length = max_positions(&config_str)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| EmbedError::ModelLoad(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| EmbedError::ModelLoad(format!("failed to configure truncation: {e}")))?;

        // SAFETY: the safetensors file is owned by the model cache (or the caller's model
        // directory) and is not modified while the VarBuilder maps it.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, device)?
        };
        let model = BertModel::load(vb, &config)?;

        tracing::info!(source = %source, max_length, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            source: source.to_string(),
        })
    }
}

impl TextEmbedder for BertEmbedder {
    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;
        let pooled = mean_pool(&hidden)?.squeeze(0)?;

        pooled.to_vec1::<f32>().map_err(EmbedError::Candle)
    }

    fn name(&self) -> &str {
        &self.source
    }
}

/// Average token embeddings over the sequence axis of a `[batch, seq, hidden]` tensor.
///
/// No L2 normalization is applied; cosine distance in the store normalizes at query time.
pub(crate) fn mean_pool(hidden: &Tensor) -> Result<Tensor, EmbedError> {
    let seq_len = hidden.dim(1)?;
    let seq_len = u32::try_from(seq_len)
        .map_err(|e| EmbedError::Inference(format!("sequence length overflow: {e}")))?;
    if seq_len == 0 {
        return Err(EmbedError::Inference("empty token sequence".into()));
    }
    Ok((hidden.sum(1)? / f64::from(seq_len))?)
}

fn max_positions(config_json: &str) -> Result<usize, EmbedError> {
    let value: serde_json::Value = serde_json::from_str(config_json)?;
    Ok(value
        .get("max_position_embeddings")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(DEFAULT_MAX_POSITIONS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_averages_without_normalizing() {
        let hidden = Tensor::new(&[[[1.0f32, 2.0], [3.0, 6.0]]], &Device::Cpu).unwrap();
        let pooled = mean_pool(&hidden).unwrap().squeeze(0).unwrap();
        let values = pooled.to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![2.0, 4.0]);
    }

    #[test]
    fn mean_pool_single_token_is_identity() {
        let hidden = Tensor::new(&[[[0.5f32, -1.5, 3.0]]], &Device::Cpu).unwrap();
        let pooled = mean_pool(&hidden).unwrap().squeeze(0).unwrap();
        assert_eq!(pooled.to_vec1::<f32>().unwrap(), vec![0.5, -1.5, 3.0]);
    }

    #[test]
    fn max_positions_reads_config() {
        let json = r#"{"hidden_size": 384, "max_position_embeddings": 256}"#;
        assert_eq!(max_positions(json).unwrap(), 256);
    }

    #[test]
    fn max_positions_defaults_when_absent() {
        assert_eq!(max_positions("{}").unwrap(), DEFAULT_MAX_POSITIONS);
    }

    #[test]
    fn local_source_requires_model_files() {
        let dir = std::env::temp_dir().join("repovec-missing-model-dir");
        let source = ModelSource::Local { path: dir };
        let err = BertEmbedder::load(&source, &Device::Cpu).unwrap_err();
        assert!(matches!(err, EmbedError::ModelLoad(_)));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn model_source_display() {
        let hf = ModelSource::HuggingFace {
            repo_id: "sentence-transformers/all-MiniLM-L6-v2".into(),
        };
        assert_eq!(hf.to_string(), "sentence-transformers/all-MiniLM-L6-v2");

        let local = ModelSource::Local {
            path: PathBuf::from("/models/minilm"),
        };
        assert_eq!(local.to_string(), "local:/models/minilm");
    }
}
