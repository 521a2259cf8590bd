//! SepSight Models
//!
//! The model-backed stages of the sepsis risk pipeline:
//! - Language detection and Spanish-to-English translation (DeepL, then a
//!   local Marian model, then passthrough)
//! - ClinicalBERT note encoding to a 768-dimensional [CLS] vector
//! - Feature schema parsing and feature row assembly
//! - Scoring with the exported tabular ensemble
//!
//! Every stage sits behind a trait so the pipeline can run against stubs.
//! The `ml-models` feature (on by default) provides the Candle, tokenizers
//! and ONNX Runtime implementations.

pub mod config;
pub mod encoder;
pub mod feature_row;
pub mod language;
pub mod model_loader;
pub mod pipeline;
pub mod predictor;
pub mod registry;
pub mod schema;
pub mod translation;

pub use config::{
    DeviceSpec, EncoderConfig, LocalTranslatorConfig, ModelSourceSpec, ModelsConfig,
    PredictorConfig, SchemaConfig, TranslationConfig,
};
pub use encoder::{embed_note, TextEncoder};
pub use feature_row::{FeatureRow, FeatureValue};
pub use language::{LanguageDetector, LexiconDetector, TrigramDetector};
pub use model_loader::{DeviceType, ModelFiles, ModelSource};
pub use pipeline::{Assessment, RiskPipeline, StageTiming};
pub use predictor::{ClassProbabilities, EnsembleMetadata, Predictor};
pub use registry::{LoadedModels, ModelInfo, ModelStore};
pub use schema::{embedding_sort_key, ColumnKind, FeatureColumn, FeatureSchema};
pub use translation::{
    CredentialSource, DeepLTranslator, TranslationChain, TranslationOutcome, TranslationSource,
    Translator,
};

#[cfg(feature = "ml-models")]
pub use encoder::BertEncoder;
#[cfg(feature = "ml-models")]
pub use predictor::OnnxEnsemble;
#[cfg(feature = "ml-models")]
pub use registry::load_models;
#[cfg(feature = "ml-models")]
pub use translation::{LazyMarianTranslator, MarianTranslator};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::encoder::TextEncoder;
    pub use crate::language::LanguageDetector;
    pub use crate::pipeline::{Assessment, RiskPipeline};
    pub use crate::predictor::Predictor;
    pub use crate::registry::ModelStore;
    pub use crate::translation::{TranslationChain, Translator};
}
