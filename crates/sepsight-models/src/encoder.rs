//! Clinical note encoder
//!
//! [`embed_note`] is the only entry point the pipeline uses. It never fails:
//! empty notes and encoder failures both become zero vectors, tagged with
//! the reason so the two cases stay distinguishable downstream.

use async_trait::async_trait;
use sepsight_core::{Embedding, EmbeddingStatus, Result};
use tracing::{debug, warn};

/// Turns a note into a fixed-length vector
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Encode non-empty text
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector length
    fn dimension(&self) -> usize;

    /// Encoder name for logs
    fn name(&self) -> &str;
}

/// Encode a note, substituting a zero vector for empty text or failures
pub async fn embed_note(encoder: &dyn TextEncoder, text: &str) -> Embedding {
    let dim = encoder.dimension();

    if text.trim().is_empty() {
        debug!("Empty note, using zero embedding");
        return Embedding::zeros(dim, EmbeddingStatus::EmptyText);
    }

    match encoder.encode(text).await {
        Ok(values) if values.len() == dim => Embedding::encoded(values),
        Ok(values) => {
            warn!(
                encoder = encoder.name(),
                "Encoder returned {} values, expected {}; using zero embedding",
                values.len(),
                dim
            );
            Embedding::zeros(dim, EmbeddingStatus::Failed)
        }
        Err(e) => {
            warn!(encoder = encoder.name(), "Encoding failed, using zero embedding: {}", e);
            Embedding::zeros(dim, EmbeddingStatus::Failed)
        }
    }
}

#[cfg(feature = "ml-models")]
pub use bert::BertEncoder;

#[cfg(feature = "ml-models")]
mod bert {
    use super::TextEncoder;
    use crate::config::EncoderConfig;
    use crate::model_loader::{create_device, load_weights, read_json, DeviceType, ModelFiles};
    use async_trait::async_trait;
    use candle_core::{Device, Tensor};
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use sepsight_core::{Error, Result};
    use std::path::Path;
    use std::sync::Arc;
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;
    use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
    use tracing::info;

    struct Inner {
        tokenizer: Tokenizer,
        model: BertModel,
        device: Device,
    }

    /// BERT encoder returning the final-layer [CLS] vector
    #[derive(Clone)]
    pub struct BertEncoder {
        name: String,
        dimension: usize,
        inner: Arc<Inner>,
    }

    impl BertEncoder {
        /// Load the checkpoint; blocking
        pub fn load(config: &EncoderConfig, device_type: DeviceType) -> Result<Self> {
            let source = config.source.to_model_source();
            info!("Loading note encoder from {}", source);

            let files = ModelFiles::open(source.clone())?;
            let device = create_device(device_type)?;

            let bert_config: BertConfig = read_json(&files.get("config.json")?)?;
            let dimension = bert_config.hidden_size;

            let mut tokenizer = match &config.tokenizer {
                Some(path) => load_tokenizer_json(path)?,
                None => match files.try_get("tokenizer.json") {
                    Some(path) => load_tokenizer_json(&path)?,
                    None => wordpiece_tokenizer(&files.get("vocab.txt")?)?,
                },
            };
            fixed_length(&mut tokenizer, config.max_length)?;

            let weights = files.first_of(&["model.safetensors", "pytorch_model.bin"])?;
            let vb = load_weights(&weights, &device)?;
            let model = BertModel::load(vb, &bert_config)
                .map_err(|e| Error::model_load(format!("Failed to load BERT model: {}", e)))?;

            info!("Note encoder loaded on {} ({} dims)", device_type, dimension);

            Ok(Self {
                name: source.to_string(),
                dimension,
                inner: Arc::new(Inner {
                    tokenizer,
                    model,
                    device,
                }),
            })
        }
    }

    impl Inner {
        fn encode_blocking(&self, text: &str) -> Result<Vec<f32>> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| Error::encoding(format!("Tokenization failed: {}", e)))?;

            self.cls_vector(
                encoding.get_ids(),
                encoding.get_type_ids(),
                encoding.get_attention_mask(),
            )
            .map_err(|e| Error::encoding(format!("Model forward pass failed: {}", e)))
        }

        fn cls_vector(
            &self,
            ids: &[u32],
            type_ids: &[u32],
            mask: &[u32],
        ) -> candle_core::Result<Vec<f32>> {
            let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
            let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;
            let attention_mask = Tensor::new(mask, &self.device)?.unsqueeze(0)?;

            let output = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            // [batch, seq, hidden] -> first sequence, [CLS] position
            output.get(0)?.get(0)?.to_vec1::<f32>()
        }
    }

    #[async_trait]
    impl TextEncoder for BertEncoder {
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            let inner = Arc::clone(&self.inner);
            let text = text.to_string();
            tokio::task::spawn_blocking(move || inner.encode_blocking(&text))
                .await
                .map_err(|e| Error::encoding(format!("Encoding task failed: {}", e)))?
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn load_tokenizer_json(path: &Path) -> Result<Tokenizer> {
        Tokenizer::from_file(path)
            .map_err(|e| Error::model_load(format!("Failed to load tokenizer: {}", e)))
    }

    /// Build a lowercasing BERT tokenizer from a bare WordPiece vocabulary
    fn wordpiece_tokenizer(vocab: &Path) -> Result<Tokenizer> {
        let wordpiece = WordPiece::from_file(vocab.to_string_lossy().as_ref())
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| Error::model_load(format!("Failed to load vocabulary: {}", e)))?;

        let mut tokenizer = Tokenizer::new(wordpiece);
        let special = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| Error::model_load(format!("vocabulary has no {token} token")))
        };
        let cls = special("[CLS]")?;
        let sep = special("[SEP]")?;

        tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, true)));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
        tokenizer.with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), sep),
            ("[CLS]".to_string(), cls),
        )));

        Ok(tokenizer)
    }

    /// Truncate and pad every encoding to exactly `max_length` tokens
    fn fixed_length(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| Error::model_load(format!("Failed to configure truncation: {}", e)))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_length),
            pad_id,
            pad_token: "[PAD]".to_string(),
            ..Default::default()
        }));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepsight_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubEncoder {
        output: Option<Vec<f32>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextEncoder for StubEncoder {
        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.output
                .clone()
                .ok_or_else(|| Error::encoding("stub failure"))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn stub(output: Option<Vec<f32>>) -> StubEncoder {
        StubEncoder {
            output,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_encoder() {
        let encoder = stub(Some(vec![1.0; 4]));

        let embedding = embed_note(&encoder, "  \t").await;

        assert_eq!(embedding.status(), EmbeddingStatus::EmptyText);
        assert_eq!(embedding.len(), 4);
        assert!(embedding.is_zero());
        assert_eq!(encoder.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_encoded_values_pass_through() {
        let encoder = stub(Some(vec![0.1, -0.2, 0.3, 0.4]));

        let embedding = embed_note(&encoder, "patient stable").await;

        assert_eq!(embedding.status(), EmbeddingStatus::Encoded);
        assert_eq!(embedding.values(), &[0.1, -0.2, 0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_failure_becomes_zero_vector() {
        let embedding = embed_note(&stub(None), "patient stable").await;

        assert_eq!(embedding.status(), EmbeddingStatus::Failed);
        assert_eq!(embedding.len(), 4);
        assert!(embedding.is_zero());
    }

    #[tokio::test]
    async fn test_wrong_length_is_a_failure() {
        let embedding = embed_note(&stub(Some(vec![1.0; 3])), "patient stable").await;

        assert_eq!(embedding.status(), EmbeddingStatus::Failed);
        assert_eq!(embedding.len(), 4);
    }
}
