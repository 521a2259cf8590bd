//! Risk assessment pipeline
//!
//! Runs the stages in a fixed order: range validation, language detection
//! and translation, note encoding, feature row assembly, and ensemble
//! scoring. Every stage before scoring degrades to a safe default; only the
//! predictor can fail an assessment.

use crate::config::SchemaConfig;
use crate::encoder::{embed_note, TextEncoder};
use crate::feature_row::FeatureRow;
use crate::predictor::Predictor;
use crate::schema::FeatureSchema;
use crate::translation::{TranslationChain, TranslationSource};
use chrono::{DateTime, Utc};
use sepsight_core::{
    EmbeddingStatus, Error, LanguageTag, RangeValidator, Result, RiskTier, TabularInput,
};
use sepsight_telemetry::{DegradeEvent, MetricsCollector, Stage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Latency of one pipeline stage
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub latency_us: u64,
}

/// Outcome of one assessment
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    /// Positive-class probability in [0, 1]
    pub probability: f64,
    pub risk_tier: RiskTier,
    pub language: LanguageTag,
    pub translation: TranslationSource,
    pub embedding_status: EmbeddingStatus,
    /// Advisory messages, e.g. out-of-range lab values
    pub warnings: Vec<String>,
    /// Sub-model that produced the probability
    pub model: String,
    pub stages: Vec<StageTiming>,
    pub latency_us: u64,
    pub timestamp: DateTime<Utc>,
}

impl Assessment {
    pub fn probability_percent(&self) -> f64 {
        self.probability * 100.0
    }

    pub fn is_translated(&self) -> bool {
        matches!(
            self.translation,
            TranslationSource::Primary | TranslationSource::Fallback
        )
    }
}

struct StageClock {
    metrics: MetricsCollector,
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn record(&mut self, stage: Stage, started: Instant) {
        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_stage_latency(stage, latency_us);
        self.timings.push(StageTiming {
            stage: stage.as_str(),
            latency_us,
        });
    }
}

/// The end-to-end assessment pipeline
#[derive(Clone)]
pub struct RiskPipeline {
    validator: RangeValidator,
    translation: TranslationChain,
    encoder: Arc<dyn TextEncoder>,
    predictor: Arc<dyn Predictor>,
    schema: Arc<FeatureSchema>,
    scoring_model: String,
    metrics: MetricsCollector,
}

impl RiskPipeline {
    /// Assemble a pipeline; the predictor's declared features are parsed here
    pub fn new(
        translation: TranslationChain,
        encoder: Arc<dyn TextEncoder>,
        predictor: Arc<dyn Predictor>,
        schema_config: &SchemaConfig,
    ) -> Result<Self> {
        let schema = FeatureSchema::parse(predictor.feature_names(), schema_config)?;
        let scoring_model = predictor.best_model().to_string();

        if encoder.dimension() != schema_config.embedding_dim {
            return Err(Error::model_load(format!(
                "encoder '{}' produces {} dims but the schema expects {}",
                encoder.name(),
                encoder.dimension(),
                schema_config.embedding_dim
            )));
        }

        Ok(Self {
            validator: RangeValidator::new(),
            translation,
            encoder,
            predictor,
            schema: Arc::new(schema),
            scoring_model,
            metrics: MetricsCollector::new(),
        })
    }

    /// Score with a named sub-model instead of the best one
    pub fn with_scoring_model(mut self, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if !self.predictor.model_names().contains(&model) {
            return Err(Error::model_load(format!(
                "model '{}' is not among the trained models",
                model
            )));
        }
        self.scoring_model = model;
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn scoring_model(&self) -> &str {
        &self.scoring_model
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run one assessment
    #[instrument(skip_all, fields(note_len = note.len()))]
    pub async fn assess(&self, input: &TabularInput, note: &str) -> Result<Assessment> {
        let started = Instant::now();
        self.metrics.record_request();
        let mut clock = StageClock {
            metrics: self.metrics.clone(),
            timings: Vec::with_capacity(4),
        };
        let mut warnings = Vec::new();

        let stage = Instant::now();
        let outcome = self.validator.validate(input);
        if let Some(warning) = outcome.warning() {
            warn!("{}", warning);
            self.metrics.record_range_warning();
            warnings.push(warning);
        }
        for field in input.missing_fields() {
            debug!("{} not provided, scoring as missing", field);
        }
        clock.record(Stage::Validate, stage);

        let stage = Instant::now();
        let translated = self.translation.process(note).await;
        clock.record(Stage::Translate, stage);
        debug!(
            language = %translated.language,
            source = ?translated.source,
            "Note language resolved"
        );

        let stage = Instant::now();
        let embedding = embed_note(self.encoder.as_ref(), &translated.text).await;
        if embedding.status() == EmbeddingStatus::Failed {
            self.metrics.record_degrade(DegradeEvent::EncodingFailed);
        }
        clock.record(Stage::Encode, stage);

        let row = FeatureRow::build(&self.schema, input, &embedding);
        debug!(
            columns = row.len(),
            missing = row.missing_count(),
            "Feature row assembled"
        );

        let stage = Instant::now();
        let probability = match self.score(&row).await {
            Ok(p) => p,
            Err(e) => {
                error!(model = %self.scoring_model, "Prediction failed: {}", e);
                self.metrics.record_prediction_failure();
                return Err(e);
            }
        };
        clock.record(Stage::Predict, stage);

        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_prediction(latency_us);

        let risk_tier = RiskTier::from_probability(probability);
        info!(
            probability,
            tier = %risk_tier,
            latency_us,
            "Assessment complete"
        );

        Ok(Assessment {
            probability,
            risk_tier,
            language: translated.language,
            translation: translated.source,
            embedding_status: embedding.status(),
            warnings,
            model: self.scoring_model.clone(),
            stages: clock.timings,
            latency_us,
            timestamp: Utc::now(),
        })
    }

    async fn score(&self, row: &FeatureRow) -> Result<f64> {
        self.predictor
            .predict_proba(row, &self.scoring_model)
            .await?
            .positive_class()
    }
}
