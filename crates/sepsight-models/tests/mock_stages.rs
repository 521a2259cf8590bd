//! Mock pipeline stages
//!
//! Configurable stand-ins for the translator, encoder and predictor, used to
//! exercise the pipeline and the model store without model downloads.

use async_trait::async_trait;
use parking_lot::Mutex;
use sepsight_core::{
    ClinicalField, EmbeddingStatus, Error, Result, RiskTier, TabularInput, TranslationErrorKind,
};
use sepsight_models::{
    ClassProbabilities, FeatureRow, FeatureValue, LexiconDetector, LoadedModels, ModelInfo,
    ModelStore, Predictor, RiskPipeline, SchemaConfig, TextEncoder, TranslationChain,
    TranslationSource, Translator, TrigramDetector,
};
use sepsight_telemetry::MetricsCollector;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A translator returning a fixed text or failing with a fixed kind
pub struct MockTranslator {
    name: String,
    output: std::result::Result<String, TranslationErrorKind>,
    call_count: AtomicU32,
}

impl MockTranslator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Ok("translated".to_string()),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn with_output(mut self, text: &str) -> Self {
        self.output = Ok(text.to_string());
        self
    }

    pub fn failing(mut self, kind: TranslationErrorKind) -> Self {
        self.output = Err(kind);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, _text: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.output
            .clone()
            .map_err(|kind| Error::translation(kind, "mock failure"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An encoder returning a constant vector, recording what it was given
pub struct MockEncoder {
    dimension: usize,
    fill: f32,
    fail: bool,
    call_count: AtomicU32,
    last_text: Mutex<Option<String>>,
}

impl MockEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fill: 0.5,
            fail: false,
            call_count: AtomicU32::new(0),
            last_text: Mutex::new(None),
        }
    }

    pub fn with_fill(mut self, fill: f32) -> Self {
        self.fill = fill;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().clone()
    }
}

#[async_trait]
impl TextEncoder for MockEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_text.lock() = Some(text.to_string());
        if self.fail {
            return Err(Error::encoding("mock failure"));
        }
        Ok(vec![self.fill; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock-encoder"
    }
}

/// A predictor returning fixed probability columns
pub struct MockPredictor {
    features: Vec<String>,
    models: Vec<String>,
    probabilities: Vec<f32>,
    fail: bool,
    call_count: AtomicU32,
    last_row: Mutex<Option<FeatureRow>>,
    last_model: Mutex<Option<String>>,
}

impl MockPredictor {
    /// Five tabular columns followed by `embedding_dim` embedding columns
    pub fn new(embedding_dim: usize) -> Self {
        let mut features: Vec<String> = ClinicalField::ALL.iter().map(|f| f.name().to_string()).collect();
        features.extend((0..embedding_dim).map(|i| format!("emb_{i}")));
        Self {
            features,
            models: vec!["WeightedEnsemble_L2".to_string(), "CatBoost".to_string()],
            probabilities: vec![0.8, 0.2],
            fail: false,
            call_count: AtomicU32::new(0),
            last_row: Mutex::new(None),
            last_model: Mutex::new(None),
        }
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_probabilities(mut self, probabilities: &[f32]) -> Self {
        self.probabilities = probabilities.to_vec();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_row(&self) -> Option<FeatureRow> {
        self.last_row.lock().clone()
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().clone()
    }
}

#[async_trait]
impl Predictor for MockPredictor {
    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn best_model(&self) -> &str {
        &self.models[0]
    }

    fn model_names(&self) -> &[String] {
        &self.models
    }

    async fn predict_proba(&self, row: &FeatureRow, model: &str) -> Result<ClassProbabilities> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_row.lock() = Some(row.clone());
        *self.last_model.lock() = Some(model.to_string());
        if self.fail {
            return Err(Error::prediction("mock failure"));
        }
        Ok(ClassProbabilities::new(self.probabilities.clone()))
    }
}

struct Harness {
    pipeline: RiskPipeline,
    primary: Arc<MockTranslator>,
    fallback: Arc<MockTranslator>,
    encoder: Arc<MockEncoder>,
    predictor: Arc<MockPredictor>,
    metrics: MetricsCollector,
}

fn harness(
    primary: MockTranslator,
    fallback: MockTranslator,
    encoder: MockEncoder,
    predictor: MockPredictor,
) -> Harness {
    let primary = Arc::new(primary);
    let fallback = Arc::new(fallback);
    let encoder = Arc::new(encoder);
    let predictor = Arc::new(predictor);
    let metrics = MetricsCollector::new();

    let chain = TranslationChain::new(Arc::new(TrigramDetector::new().unwrap()))
        .with_primary(primary.clone())
        .with_fallback(fallback.clone())
        .with_metrics(metrics.clone());

    let schema = SchemaConfig {
        embedding_dim: encoder.dimension(),
        ..SchemaConfig::default()
    };
    let pipeline = RiskPipeline::new(chain, encoder.clone(), predictor.clone(), &schema)
        .unwrap()
        .with_metrics(metrics.clone());

    Harness {
        pipeline,
        primary,
        fallback,
        encoder,
        predictor,
        metrics,
    }
}

fn default_harness() -> Harness {
    harness(
        MockTranslator::new("primary").with_output("patient stable"),
        MockTranslator::new("fallback").with_output("stable patient"),
        MockEncoder::new(8),
        MockPredictor::new(8),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_note_skips_translation_and_encoding() {
        let h = default_harness();

        let assessment = h.pipeline.assess(&TabularInput::defaults(), "").await.unwrap();

        assert!(assessment.language.is_unknown());
        assert_eq!(assessment.translation, TranslationSource::Passthrough);
        assert_eq!(assessment.embedding_status, EmbeddingStatus::EmptyText);
        assert_eq!(h.primary.call_count(), 0);
        assert_eq!(h.fallback.call_count(), 0);
        assert_eq!(h.encoder.call_count(), 0);

        let row = h.predictor.last_row().unwrap();
        assert_eq!(row.get("emb_0"), Some(FeatureValue::Value(0.0)));
        assert_eq!(row.get("emb_7"), Some(FeatureValue::Value(0.0)));
    }

    #[tokio::test]
    async fn test_english_note_passes_through() {
        let h = default_harness();
        let note = "The patient was admitted with fever and hypotension.";

        let assessment = h.pipeline.assess(&TabularInput::defaults(), note).await.unwrap();

        assert_eq!(assessment.language.as_str(), "en");
        assert!(!assessment.is_translated());
        assert_eq!(h.primary.call_count(), 0);
        assert_eq!(h.encoder.last_text().as_deref(), Some(note));
        assert_eq!(assessment.embedding_status, EmbeddingStatus::Encoded);
    }

    #[tokio::test]
    async fn test_spanish_note_uses_primary() {
        let h = default_harness();

        let assessment = h
            .pipeline
            .assess(&TabularInput::defaults(), "paciente estable")
            .await
            .unwrap();

        assert_eq!(assessment.language.as_str(), "es");
        assert_eq!(assessment.translation, TranslationSource::Primary);
        assert_eq!(h.encoder.last_text().as_deref(), Some("patient stable"));
        assert_eq!(h.fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_spanish_note_falls_back_on_quota() {
        let h = harness(
            MockTranslator::new("primary").failing(TranslationErrorKind::QuotaExceeded),
            MockTranslator::new("fallback").with_output("stable patient"),
            MockEncoder::new(8),
            MockPredictor::new(8),
        );

        let assessment = h
            .pipeline
            .assess(&TabularInput::defaults(), "paciente estable")
            .await
            .unwrap();

        assert_eq!(assessment.translation, TranslationSource::Fallback);
        assert_eq!(h.encoder.last_text().as_deref(), Some("stable patient"));
        assert_eq!(h.metrics.snapshot().primary_translation_failures, 1);
    }

    #[tokio::test]
    async fn test_both_translators_fail_encodes_original() {
        let h = harness(
            MockTranslator::new("primary").failing(TranslationErrorKind::Network),
            MockTranslator::new("fallback").failing(TranslationErrorKind::Model),
            MockEncoder::new(8),
            MockPredictor::new(8),
        );

        let assessment = h
            .pipeline
            .assess(&TabularInput::defaults(), "paciente estable")
            .await
            .unwrap();

        assert_eq!(assessment.language.as_str(), "es");
        assert_eq!(assessment.translation, TranslationSource::Untranslated);
        assert_eq!(h.encoder.last_text().as_deref(), Some("paciente estable"));
    }

    #[tokio::test]
    async fn test_encoder_failure_degrades_to_zero_vector() {
        let h = harness(
            MockTranslator::new("primary"),
            MockTranslator::new("fallback"),
            MockEncoder::new(8).failing(),
            MockPredictor::new(8),
        );

        let assessment = h
            .pipeline
            .assess(&TabularInput::defaults(), "patient with fever")
            .await
            .unwrap();

        assert_eq!(assessment.embedding_status, EmbeddingStatus::Failed);
        let row = h.predictor.last_row().unwrap();
        assert_eq!(row.get("emb_3"), Some(FeatureValue::Value(0.0)));
        assert_eq!(h.metrics.snapshot().encoding_failures, 1);
    }

    #[tokio::test]
    async fn test_row_follows_declared_order() {
        let h = harness(
            MockTranslator::new("primary"),
            MockTranslator::new("fallback"),
            MockEncoder::new(4).with_fill(0.25),
            MockPredictor::new(4).with_features(&[
                "emb_3",
                "aptt",
                "emb_0",
                "sofa_score",
                "hemoglobin",
            ]),
        );
        let input = TabularInput::new()
            .with(ClinicalField::Hemoglobin, 11.0)
            .with(ClinicalField::Aptt, 35.0);

        h.pipeline.assess(&input, "patient with fever").await.unwrap();

        let row = h.predictor.last_row().unwrap();
        let names: Vec<&str> = row.names().iter().map(String::as_str).collect();
        assert_eq!(names, vec!["emb_3", "aptt", "emb_0", "sofa_score", "hemoglobin"]);
        assert_eq!(row.values()[0], FeatureValue::Value(0.25));
        assert_eq!(row.values()[1], FeatureValue::Value(35.0));
        assert_eq!(row.values()[3], FeatureValue::Missing);
        assert_eq!(row.values()[4], FeatureValue::Value(11.0));
    }

    #[tokio::test]
    async fn test_probability_and_tier() {
        let cases = [
            (vec![0.9, 0.1], RiskTier::Low),
            (vec![0.55, 0.45], RiskTier::Moderate),
            (vec![0.2, 0.8], RiskTier::High),
            (vec![0.6], RiskTier::High),
        ];

        for (probabilities, tier) in cases {
            let h = harness(
                MockTranslator::new("primary"),
                MockTranslator::new("fallback"),
                MockEncoder::new(8),
                MockPredictor::new(8).with_probabilities(&probabilities),
            );
            let assessment = h.pipeline.assess(&TabularInput::defaults(), "").await.unwrap();
            assert_eq!(assessment.risk_tier, tier, "probabilities {:?}", probabilities);
            assert!((0.0..=1.0).contains(&assessment.probability));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_value_warns_but_scores() {
        let h = default_harness();
        let input = TabularInput::defaults().with(ClinicalField::Hemoglobin, 40.0);

        let assessment = h.pipeline.assess(&input, "").await.unwrap();

        assert_eq!(assessment.warnings.len(), 1);
        assert!(assessment.warnings[0].contains("Hemoglobin"));
        let row = h.predictor.last_row().unwrap();
        assert_eq!(row.get("hemoglobin"), Some(FeatureValue::Value(40.0)));
        assert_eq!(h.metrics.snapshot().out_of_range_warnings, 1);
    }

    #[tokio::test]
    async fn test_prediction_failure_propagates() {
        let h = harness(
            MockTranslator::new("primary"),
            MockTranslator::new("fallback"),
            MockEncoder::new(8),
            MockPredictor::new(8).failing(),
        );

        let result = h.pipeline.assess(&TabularInput::defaults(), "").await;

        assert!(matches!(result, Err(Error::Prediction(_))));
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.prediction_failures, 1);
        assert_eq!(snapshot.predictions, 0);
    }

    #[tokio::test]
    async fn test_malformed_probabilities_fail_request() {
        let h = harness(
            MockTranslator::new("primary"),
            MockTranslator::new("fallback"),
            MockEncoder::new(8),
            MockPredictor::new(8).with_probabilities(&[0.2, 0.3, 0.5]),
        );

        let result = h.pipeline.assess(&TabularInput::defaults(), "").await;
        assert!(matches!(result, Err(Error::Prediction(_))));
    }

    #[tokio::test]
    async fn test_scoring_model_selection() {
        let h = default_harness();
        assert_eq!(h.pipeline.scoring_model(), "WeightedEnsemble_L2");

        let pipeline = h.pipeline.clone().with_scoring_model("CatBoost").unwrap();
        pipeline.assess(&TabularInput::defaults(), "").await.unwrap();
        assert_eq!(h.predictor.last_model().as_deref(), Some("CatBoost"));

        assert!(h.pipeline.clone().with_scoring_model("Unknown").is_err());
    }

    #[tokio::test]
    async fn test_stage_timings_recorded() {
        let h = default_harness();
        let assessment = h.pipeline.assess(&TabularInput::defaults(), "").await.unwrap();

        let stages: Vec<&str> = assessment.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec!["validate", "translate", "encode", "predict"]);
        assert_eq!(h.metrics.snapshot().predictions, 1);
    }

    #[tokio::test]
    async fn test_malformed_schema_fails_construction() {
        let predictor = Arc::new(MockPredictor::new(0).with_features(&["hemoglobin", "emb_x"]));
        let chain = TranslationChain::new(Arc::new(LexiconDetector::new().unwrap()));

        let result = RiskPipeline::new(
            chain,
            Arc::new(MockEncoder::new(8)),
            predictor,
            &SchemaConfig::default(),
        );

        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[tokio::test]
    async fn test_encoder_dimension_mismatch_fails_construction() {
        // Well-formed eight-column schema, but the encoder yields 16 values
        let predictor = Arc::new(MockPredictor::new(8));
        let chain = TranslationChain::new(Arc::new(TrigramDetector::new().unwrap()));
        let schema = SchemaConfig {
            embedding_dim: 8,
            ..SchemaConfig::default()
        };

        let result = RiskPipeline::new(chain, Arc::new(MockEncoder::new(16)), predictor, &schema);

        match result {
            Err(Error::ModelLoad(msg)) => assert!(msg.contains("16"), "{msg}"),
            Err(other) => panic!("expected a model-load error, got {other}"),
            Ok(_) => panic!("pipeline built with a mismatched encoder"),
        }
    }

    fn mock_loaded_models() -> LoadedModels {
        let h = default_harness();
        let info = ModelInfo::describe(&h.pipeline, "cpu", Some("1.0".to_string()));
        LoadedModels {
            pipeline: h.pipeline,
            info,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_model_store_single_flight() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = loads.clone();
        let store = Arc::new(ModelStore::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(mock_loaded_models())
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get().await.map(|m| m.info.feature_count) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 13);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(store.load_count(), 1);
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_model_store_caches_failure() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = loads.clone();
        let store = ModelStore::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::model_load("predictor.json not found"))
        });

        let first = store.get().await;
        let second = store.get().await;

        assert!(matches!(first, Err(Error::ModelLoad(ref m)) if m.contains("predictor.json")));
        assert!(matches!(second, Err(Error::ModelLoad(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_info() {
        let models = mock_loaded_models();
        let info = &models.info;

        assert_eq!(info.total_models, 2);
        assert_eq!(info.best_model, "WeightedEnsemble_L2");
        assert_eq!(info.tabular_features, 5);
        assert_eq!(info.embedding_columns, 8);
        assert_eq!(info.feature_count, 13);
        assert_eq!(info.device, "cpu");
        assert_eq!(info.version.as_deref(), Some("1.0"));
    }
}
