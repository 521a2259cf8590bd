//! Configuration for model loading and the translation chain

use crate::model_loader::{DeviceType, ModelSource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for every model artifact the pipeline uses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Device to run the encoder and the local translator on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Clinical note encoder
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Local fallback translator
    #[serde(default)]
    pub translator: LocalTranslatorConfig,

    /// Remote primary translator and credential lookup
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Exported tabular ensemble
    #[serde(default)]
    pub predictor: PredictorConfig,

    /// Feature schema parsing
    #[serde(default)]
    pub schema: SchemaConfig,
}

impl ModelsConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Model source specification (for config files)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSourceSpec {
    /// Local directory holding the checkpoint files
    Local { path: PathBuf },

    /// Hugging Face Hub
    HuggingFace {
        repo_id: String,
        revision: Option<String>,
    },
}

impl ModelSourceSpec {
    fn hub(repo_id: &str) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.to_string(),
            revision: None,
        }
    }

    /// Convert to the runtime model source
    pub fn to_model_source(&self) -> ModelSource {
        match self {
            Self::Local { path } => ModelSource::LocalDir(path.clone()),
            Self::HuggingFace { repo_id, revision } => ModelSource::HuggingFace {
                repo_id: repo_id.clone(),
                revision: revision.clone(),
            },
        }
    }
}

/// Device specification (for config files)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl DeviceSpec {
    /// Convert to DeviceType
    pub fn to_device_type(&self) -> DeviceType {
        match self {
            DeviceSpec::Cpu => DeviceType::Cpu,
            DeviceSpec::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            DeviceSpec::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

/// Encoder checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(flatten)]
    pub source: ModelSourceSpec,

    /// Tokenizer file overriding the checkpoint's own
    #[serde(default)]
    pub tokenizer: Option<PathBuf>,

    /// Truncation and padding length
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            source: ModelSourceSpec::hub("emilyalsentzer/Bio_ClinicalBERT"),
            tokenizer: None,
            max_length: default_max_length(),
        }
    }
}

/// Local Marian translator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalTranslatorConfig {
    /// Disable to skip straight to passthrough when the primary fails
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    pub source: ModelSourceSpec,

    /// Converted source-language `tokenizer.json`, resolved against the
    /// source. Unset means the checkpoint's own `source.spm` and
    /// `vocab.json` are used.
    #[serde(default)]
    pub source_tokenizer: Option<String>,

    /// Converted target-language `tokenizer.json`; needs `source_tokenizer`
    #[serde(default)]
    pub target_tokenizer: Option<String>,

    /// Maximum number of generated tokens
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for LocalTranslatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: ModelSourceSpec::hub("Helsinki-NLP/opus-mt-es-en"),
            source_tokenizer: None,
            target_tokenizer: None,
            max_length: default_max_length(),
        }
    }
}

/// Remote translation and credential configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// API base URL; derived from the key type when unset
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    /// Environment variable checked first for the API key
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// YAML secrets store checked second
    #[serde(default = "default_secrets_path")]
    pub secrets_path: PathBuf,
}

impl TranslationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            credential_env: default_credential_env(),
            secrets_path: default_secrets_path(),
        }
    }
}

/// Exported ensemble configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Directory holding `predictor.json` and the exported sub-models
    #[serde(default = "default_predictor_dir")]
    pub dir: PathBuf,

    /// Sub-model to score with; the ensemble's own best model when unset
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            dir: default_predictor_dir(),
            model: None,
        }
    }
}

/// Feature schema parsing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Reject malformed embedding columns at load time
    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(default = "default_embedding_prefix")]
    pub embedding_prefix: String,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            strict: true,
            embedding_prefix: default_embedding_prefix(),
            embedding_dim: default_embedding_dim(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_length() -> usize {
    512
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_source_lang() -> String {
    "ES".to_string()
}

fn default_target_lang() -> String {
    "EN-US".to_string()
}

fn default_credential_env() -> String {
    "DEEPL_API_KEY".to_string()
}

fn default_secrets_path() -> PathBuf {
    PathBuf::from(".sepsight/secrets.yaml")
}

fn default_predictor_dir() -> PathBuf {
    PathBuf::from("./models/ensemble")
}

fn default_embedding_prefix() -> String {
    "emb_".to_string()
}

fn default_embedding_dim() -> usize {
    sepsight_core::EMBEDDING_DIM
}
