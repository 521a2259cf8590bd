//! Local Marian (opus-mt) Spanish-to-English translator
//!
//! The checkpoint is loaded on first use, not at startup. Concurrent first
//! calls share one load, and a failed load is remembered so later calls fail
//! fast instead of retrying the download.

use super::sentencepiece::MarianVocab;
use super::Translator;
use crate::config::LocalTranslatorConfig;
use crate::model_loader::{create_device, load_weights, read_json, DeviceType, ModelFiles};
use async_trait::async_trait;
use candle_core::{Device, Tensor, D};
use candle_transformers::models::marian::{Config as MarianConfig, MTModel};
use parking_lot::Mutex;
use sepsight_core::{Error, Result, TranslationErrorKind};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{info, warn};

fn model_error(msg: impl std::fmt::Display) -> Error {
    Error::translation(TranslationErrorKind::Model, msg.to_string())
}

/// Text to and from model ids
enum MarianText {
    /// Converted `tokenizer.json` files named in the config
    Converted { source: Tokenizer, target: Tokenizer },
    /// The checkpoint's own `source.spm` and `vocab.json`
    SentencePiece(MarianVocab),
}

impl MarianText {
    fn load(config: &LocalTranslatorConfig, files: &ModelFiles) -> Result<Self> {
        match (&config.source_tokenizer, &config.target_tokenizer) {
            (Some(source), Some(target)) => {
                let source = Tokenizer::from_file(files.get(source)?).map_err(|e| {
                    Error::model_load(format!("Failed to load source tokenizer: {}", e))
                })?;
                let target = Tokenizer::from_file(files.get(target)?).map_err(|e| {
                    Error::model_load(format!("Failed to load target tokenizer: {}", e))
                })?;
                Ok(Self::Converted { source, target })
            }
            (None, None) => Ok(Self::SentencePiece(MarianVocab::load(
                &files.get("source.spm")?,
                &files.get("vocab.json")?,
            )?)),
            _ => Err(Error::config(
                "translator.source_tokenizer and translator.target_tokenizer must be set together",
            )),
        }
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        match self {
            Self::Converted { source, .. } => Ok(source
                .encode(text, true)
                .map_err(model_error)?
                .get_ids()
                .to_vec()),
            Self::SentencePiece(vocab) => vocab.encode(text),
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        match self {
            Self::Converted { target, .. } => target.decode(ids, true).map_err(model_error),
            Self::SentencePiece(vocab) => Ok(vocab.decode(ids)),
        }
    }
}

/// Loaded Marian model with its tokenizers
pub struct MarianTranslator {
    model: Mutex<MTModel>,
    config: MarianConfig,
    text: MarianText,
    device: Device,
    max_length: usize,
}

impl MarianTranslator {
    /// Load the checkpoint; blocking
    pub fn load(config: &LocalTranslatorConfig, device_type: DeviceType) -> Result<Self> {
        let source = config.source.to_model_source();
        info!("Loading local translator from {}", source);

        let files = ModelFiles::open(source)?;
        let device = create_device(device_type)?;

        let marian_config: MarianConfig = read_json(&files.get("config.json")?)?;
        let text = MarianText::load(config, &files)?;

        let weights = files.first_of(&["model.safetensors", "pytorch_model.bin"])?;
        let vb = load_weights(&weights, &device)?;
        let model = MTModel::new(&marian_config, vb)
            .map_err(|e| Error::model_load(format!("Failed to build Marian model: {}", e)))?;

        info!("Local translator loaded on {}", device_type);

        Ok(Self {
            model: Mutex::new(model),
            config: marian_config,
            text,
            device,
            max_length: config.max_length,
        })
    }

    /// Greedy-decode a translation; blocking
    pub fn translate_blocking(&self, text: &str) -> Result<String> {
        let mut source_ids = self.text.encode(text).map_err(model_error)?;
        source_ids.push(self.config.eos_token_id);

        let mut model = self.model.lock();

        let generated = self.generate(&mut model, &source_ids).map_err(model_error)?;

        self.text.decode(&generated)
    }

    fn generate(&self, model: &mut MTModel, source_ids: &[u32]) -> candle_core::Result<Vec<u32>> {
        model.reset_kv_cache();

        let input = Tensor::new(source_ids, &self.device)?.unsqueeze(0)?;
        let encoder_xs = model.encoder().forward(&input, 0)?;

        let mut token_ids = vec![self.config.decoder_start_token_id];
        for index in 0..self.max_length {
            // After the first step the KV cache holds the prefix
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;

            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        Ok(token_ids.split_off(1))
    }
}

/// Marian translator that loads its checkpoint on first use
pub struct LazyMarianTranslator {
    config: LocalTranslatorConfig,
    device: DeviceType,
    model: OnceCell<std::result::Result<Arc<MarianTranslator>, String>>,
}

impl LazyMarianTranslator {
    pub fn new(config: LocalTranslatorConfig, device: DeviceType) -> Self {
        Self {
            config,
            device,
            model: OnceCell::new(),
        }
    }

    /// Whether a load has been attempted
    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<MarianTranslator>> {
        let loaded = self
            .model
            .get_or_init(|| async {
                let config = self.config.clone();
                let device = self.device;
                let result = tokio::task::spawn_blocking(move || MarianTranslator::load(&config, device))
                    .await
                    .map_err(|e| format!("translator load task failed: {}", e))
                    .and_then(|r| r.map(Arc::new).map_err(|e| e.to_string()));
                if let Err(e) = &result {
                    warn!("Local translator unavailable: {}", e);
                }
                result
            })
            .await;

        loaded.clone().map_err(model_error)
    }
}

#[async_trait]
impl Translator for LazyMarianTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let model = self.model().await?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.translate_blocking(&text))
            .await
            .map_err(|e| model_error(format!("translation task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "marian"
    }
}
