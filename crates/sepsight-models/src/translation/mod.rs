//! Detect-then-translate chain for clinical notes
//!
//! Spanish notes go to the primary remote translator, then to the local
//! fallback model, then pass through untranslated. Every other language
//! passes through untouched. Nothing in this module returns an error to the
//! caller; failures are logged and counted as degrade events.

pub mod credentials;
pub mod deepl;
#[cfg(feature = "ml-models")]
pub mod marian;
#[cfg(feature = "ml-models")]
pub mod sentencepiece;

pub use credentials::CredentialSource;
pub use deepl::DeepLTranslator;
#[cfg(feature = "ml-models")]
pub use marian::{LazyMarianTranslator, MarianTranslator};

use crate::language::LanguageDetector;
use async_trait::async_trait;
use sepsight_core::{LanguageTag, Result, TranslationErrorKind};
use sepsight_telemetry::{DegradeEvent, MetricsCollector};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Spanish-to-English translator
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` to English
    async fn translate(&self, text: &str) -> Result<String>;

    /// Translator name for logs
    fn name(&self) -> &str;
}

/// Which step produced the text handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationSource {
    /// Not Spanish, or empty; returned as-is
    Passthrough,
    /// Translated by the remote service
    Primary,
    /// Translated by the local model
    Fallback,
    /// Spanish, but both translators failed
    Untranslated,
}

/// Result of running a note through the chain
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    pub text: String,
    pub language: LanguageTag,
    pub source: TranslationSource,
}

impl TranslationOutcome {
    fn passthrough(text: String, language: LanguageTag) -> Self {
        Self {
            text,
            language,
            source: TranslationSource::Passthrough,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(
            self.source,
            TranslationSource::Primary | TranslationSource::Fallback
        )
    }
}

/// Language detection followed by the translator fallback chain
#[derive(Clone)]
pub struct TranslationChain {
    detector: Arc<dyn LanguageDetector>,
    primary: Option<Arc<dyn Translator>>,
    fallback: Option<Arc<dyn Translator>>,
    metrics: MetricsCollector,
}

impl TranslationChain {
    /// Create a chain with no translators; Spanish text passes through
    pub fn new(detector: Arc<dyn LanguageDetector>) -> Self {
        Self {
            detector,
            primary: None,
            fallback: None,
            metrics: MetricsCollector::new(),
        }
    }

    /// Set the primary translator
    pub fn with_primary(mut self, translator: Arc<dyn Translator>) -> Self {
        self.primary = Some(translator);
        self
    }

    /// Set the fallback translator
    pub fn with_fallback(mut self, translator: Arc<dyn Translator>) -> Self {
        self.fallback = Some(translator);
        self
    }

    /// Report degrade events to a shared collector
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the possibly-translated text and the detected language
    pub async fn detect_and_maybe_translate(&self, text: &str) -> (String, LanguageTag) {
        let outcome = self.process(text).await;
        (outcome.text, outcome.language)
    }

    /// Run the full chain and report which step produced the text
    pub async fn process(&self, text: &str) -> TranslationOutcome {
        let cleaned = text.trim();
        if cleaned.is_empty() {
            return TranslationOutcome::passthrough(String::new(), LanguageTag::unknown());
        }

        let language = match self.detector.detect(cleaned) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(detector = self.detector.name(), "Language detection failed, treating note as unknown: {}", e);
                self.metrics.record_degrade(DegradeEvent::DetectionFailed);
                return TranslationOutcome::passthrough(cleaned.to_string(), LanguageTag::unknown());
            }
        };

        if !language.is_spanish() {
            debug!(language = %language, "Note is not Spanish, passing through");
            return TranslationOutcome::passthrough(cleaned.to_string(), language);
        }

        let (text, source) = self.translate_es_en(cleaned).await;
        if source != TranslationSource::Untranslated {
            self.metrics.record_translation();
        }

        TranslationOutcome {
            text,
            language: LanguageTag::spanish(),
            source,
        }
    }

    async fn translate_es_en(&self, text: &str) -> (String, TranslationSource) {
        if let Some(primary) = &self.primary {
            match primary.translate(text).await {
                Ok(translated) => {
                    info!(translator = primary.name(), "Translation succeeded");
                    return (translated, TranslationSource::Primary);
                }
                Err(e) if e.translation_kind() == Some(TranslationErrorKind::MissingCredential) => {
                    debug!(translator = primary.name(), "No credential configured, using fallback translator");
                }
                Err(e) => {
                    warn!(translator = primary.name(), "Primary translation failed, using fallback translator: {}", e);
                    self.metrics.record_degrade(DegradeEvent::PrimaryTranslationFailed);
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match fallback.translate(text).await {
                Ok(translated) => {
                    info!(translator = fallback.name(), "Fallback translation succeeded");
                    return (translated, TranslationSource::Fallback);
                }
                Err(e) => {
                    error!(translator = fallback.name(), "Fallback translation failed, using original text: {}", e);
                }
            }
        } else {
            error!("No fallback translator available, using original text");
        }

        self.metrics.record_degrade(DegradeEvent::FallbackTranslationFailed);
        (text.to_string(), TranslationSource::Untranslated)
    }
}
