//! Error types for SepSight

use std::fmt;

/// Result type alias using SepSight's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SepSight operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration and credential store errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Model artifact resolution or loading errors
    #[error("model loading error: {0}")]
    ModelLoad(String),

    /// The predictor's declared feature list is malformed
    #[error("feature schema error: {0}")]
    Schema(String),

    /// Language detection could not decide on a language
    #[error("language detection failed: {0}")]
    Detection(String),

    /// Translation errors, from either the remote service or the local model
    #[error("translation error ({kind}): {message}")]
    Translation {
        kind: TranslationErrorKind,
        message: String,
    },

    /// Text encoder errors
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Predictor invocation errors
    #[error("prediction error: {0}")]
    Prediction(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reason a translation attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationErrorKind {
    /// No API credential was found
    MissingCredential,
    /// The service rejected the credential
    Authentication,
    /// The account's character quota is exhausted
    QuotaExceeded,
    /// Too many requests
    RateLimited,
    /// Connection-level failure
    Network,
    /// The request exceeded its deadline
    Timeout,
    /// Any other non-success response
    Api,
    /// The local translation model failed to load or run
    Model,
}

impl fmt::Display for TranslationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingCredential => "missing credential",
            Self::Authentication => "authentication",
            Self::QuotaExceeded => "quota exceeded",
            Self::RateLimited => "rate limited",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Api => "api",
            Self::Model => "model",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new model loading error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a new detection error
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    /// Create a new translation error
    pub fn translation(kind: TranslationErrorKind, msg: impl Into<String>) -> Self {
        Self::Translation {
            kind,
            message: msg.into(),
        }
    }

    /// Create a new encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new prediction error
    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Translation failure kind, if this is a translation error
    pub fn translation_kind(&self) -> Option<TranslationErrorKind> {
        match self {
            Self::Translation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error ends the whole session rather than one request
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::ModelLoad(_) | Self::Schema(_))
    }
}
