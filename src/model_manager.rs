use std::{
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::{
    encoder::{Encoder, validate_text},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str =
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const MODEL_ENV_VAR: &str = "LEXBERT_MODEL";

/// Longest token sequence fed to the model; longer text is truncated.
const MAX_SEQUENCE_TOKENS: usize = 128;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Pick the model to load, in order of priority:
/// 1. An explicit id (from --model)
/// 2. The `LEXBERT_MODEL` environment variable
/// 3. The stored `model` setting
/// 4. [`DEFAULT_MODEL_ID`]
pub fn resolve_model_id(
    explicit: Option<&str>,
    setting: Option<String>,
) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(MODEL_ENV_VAR).ok())
        .filter(|id| !id.trim().is_empty())
        .or(setting)
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedModel {
    fn load(model_id: &str) -> Result<Self> {
        let files = ModelFiles::locate(model_id)?;
        let device = default_device();

        let config = std::fs::read_to_string(&files.config)?;
        let config: Config = serde_json::from_str(&config)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| encoder_error("failed to load tokenizer", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| encoder_error("failed to configure tokenizer", e))?;
        tokenizer.with_padding(None);

        let vb = match &files.weights {
            Weights::Safetensors(path) => {
                let bytes = std::fs::read(path)?;
                VarBuilder::from_buffered_safetensors(bytes, DTYPE, &device)?
            }
            Weights::Pytorch(path) => {
                VarBuilder::from_pth(path, DTYPE, &device)?
            }
        };
        let model = BertModel::load(vb, &config)?;

        info!(model = model_id, hidden = config.hidden_size, "loaded encoder");
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Forward pass, attention-mask mean pooling, L2 normalisation.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| encoder_error("tokenization failed", e))?;

        let ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let type_ids =
            Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(encoding.get_attention_mask(), &self.device)?
            .unsqueeze(0)?;

        // [1, tokens, hidden]
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norm)?;

        debug!(tokens = encoding.get_ids().len(), "encoded text");
        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }
}

enum Weights {
    Safetensors(PathBuf),
    Pytorch(PathBuf),
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Weights,
}

impl ModelFiles {
    /// Find the model files in a local directory, or fetch them from the
    /// HuggingFace Hub cache.
    fn locate(model_id: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            let safetensors = local.join("model.safetensors");
            let weights = if safetensors.exists() {
                Weights::Safetensors(safetensors)
            } else {
                Weights::Pytorch(local.join("pytorch_model.bin"))
            };
            return Ok(Self {
                config: local.join("config.json"),
                tokenizer: local.join("tokenizer.json"),
                weights,
            });
        }

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| encoder_error("failed to reach the model hub", e))?;
        let repo = api.model(model_id.to_string());
        let fetch = |name: &str| {
            repo.get(name)
                .map_err(|e| {
                    encoder_error(&format!("failed to fetch {name}"), e)
                })
        };

        let weights = match fetch("model.safetensors") {
            Ok(path) => Weights::Safetensors(path),
            Err(_) => Weights::Pytorch(fetch("pytorch_model.bin")?),
        };
        Ok(Self {
            config: fetch("config.json")?,
            tokenizer: fetch("tokenizer.json")?,
            weights,
        })
    }
}

fn encoder_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::EncoderUnavailable(format!("{context}: {err}"))
}

/// Sentence-embedding model lifecycle, loading lazily on first use.
///
/// Once loaded the model is only read, so one manager serves any number of
/// concurrent `encode` calls.
pub struct ModelManager {
    model: OnceLock<LoadedModel>,
    loading: Mutex<()>,
    model_id: String,
}

impl ModelManager {
    /// Creates a `ModelManager` for `model_id`: a HuggingFace repository id
    /// or a local directory holding `config.json`, `tokenizer.json` and the
    /// weights.
    ///
    /// Nothing is loaded until the first call to `encode`.
    pub fn new(model_id: String) -> Self {
        Self {
            model: OnceLock::new(),
            loading: Mutex::new(()),
            model_id,
        }
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn ensure_loaded(&self) -> Result<&LoadedModel> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let _guard = self.loading.lock().map_err(|_| {
            Error::EncoderUnavailable("a previous model load panicked".into())
        })?;
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let loaded = LoadedModel::load(&self.model_id)
            .map_err(Error::into_encoder_failure)?;
        Ok(self.model.get_or_init(|| loaded))
    }
}

impl Encoder for ModelManager {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        validate_text(text)?;
        self.ensure_loaded()?
            .embed(text)
            .map_err(Error::into_encoder_failure)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn prepare(&self) -> Result<()> {
        self.ensure_loaded().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_model_id() {
        let manager = ModelManager::new("custom/model".to_string());
        assert_eq!(manager.model_id(), "custom/model");
        assert!(!manager.is_loaded());
    }

    #[test]
    fn empty_text_fails_before_loading() {
        let manager = ModelManager::new("does/not-exist".to_string());
        let err = manager.encode("   ").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!manager.is_loaded());
    }

    #[test]
    fn missing_local_model_is_encoder_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let manager =
            ModelManager::new(tmp.path().to_string_lossy().into_owned());
        let err = manager.encode("artículo 52").unwrap_err();
        assert!(matches!(err, Error::EncoderUnavailable(_)), "{err:?}");
        assert!(!manager.is_loaded());
    }

    #[test]
    fn failed_prepare_leaves_model_unloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let manager =
            ModelManager::new(tmp.path().to_string_lossy().into_owned());
        let err = manager.prepare().unwrap_err();
        assert!(matches!(err, Error::EncoderUnavailable(_)), "{err:?}");
        assert!(!manager.is_loaded());
    }

    #[test]
    fn explicit_model_id_wins() {
        let id = resolve_model_id(Some("local/model"), Some("stored".into()));
        assert_eq!(id, "local/model");
    }
}
