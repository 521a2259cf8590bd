//! Process-wide model store
//!
//! Model artifacts are loaded once, on first use. Concurrent first callers
//! share a single load, and the outcome is kept for the life of the process:
//! a failed load keeps failing until restart.

use crate::pipeline::RiskPipeline;
use sepsight_core::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Summary of the loaded models for display
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub total_models: usize,
    pub best_model: String,
    pub scoring_model: String,
    pub models: Vec<String>,
    pub device: String,
    pub tabular_features: usize,
    /// Embedding columns the ensemble declares
    pub embedding_columns: usize,
    pub feature_count: usize,
    pub version: Option<String>,
}

impl ModelInfo {
    /// Describe a pipeline's predictor and schema
    pub fn describe(pipeline: &RiskPipeline, device: impl Into<String>, version: Option<String>) -> Self {
        let predictor = pipeline.predictor();
        let schema = pipeline.schema();
        Self {
            total_models: predictor.model_names().len(),
            best_model: predictor.best_model().to_string(),
            scoring_model: pipeline.scoring_model().to_string(),
            models: predictor.model_names().to_vec(),
            device: device.into(),
            tabular_features: schema.tabular_fields().len(),
            embedding_columns: schema.embedding_columns().len(),
            feature_count: schema.len(),
            version,
        }
    }
}

/// Everything an assessment needs, loaded together
pub struct LoadedModels {
    pub pipeline: RiskPipeline,
    pub info: ModelInfo,
}

type Loader = Arc<dyn Fn() -> Result<LoadedModels> + Send + Sync>;

/// Lazily loaded, shared model artifacts
pub struct ModelStore {
    loader: Loader,
    cell: OnceCell<std::result::Result<Arc<LoadedModels>, String>>,
    loads: AtomicU32,
}

impl ModelStore {
    /// Store backed by a blocking loader
    pub fn new(loader: impl Fn() -> Result<LoadedModels> + Send + Sync + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            cell: OnceCell::new(),
            loads: AtomicU32::new(0),
        }
    }

    /// Store that loads from configuration
    #[cfg(feature = "ml-models")]
    pub fn from_config(
        config: crate::config::ModelsConfig,
        metrics: sepsight_telemetry::MetricsCollector,
    ) -> Self {
        Self::new(move || load_models(&config, &metrics))
    }

    /// Loaded models, loading them on first call
    pub async fn get(&self) -> Result<Arc<LoadedModels>> {
        let loaded = self
            .cell
            .get_or_init(|| async {
                self.loads.fetch_add(1, Ordering::Relaxed);
                let loader = Arc::clone(&self.loader);
                let result = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| format!("model load task failed: {}", e))
                    .and_then(|r| r.map(Arc::new).map_err(|e| e.to_string()));
                match &result {
                    Ok(models) => info!(
                        model = %models.info.scoring_model,
                        features = models.info.feature_count,
                        "Models loaded"
                    ),
                    Err(e) => error!("Model loading failed; restart to retry: {}", e),
                }
                result
            })
            .await;

        loaded.clone().map_err(Error::ModelLoad)
    }

    /// Whether a load has completed, successfully or not
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of load attempts made
    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::Relaxed)
    }
}

/// Load every model artifact named by the configuration; blocking
#[cfg(feature = "ml-models")]
pub fn load_models(
    config: &crate::config::ModelsConfig,
    metrics: &sepsight_telemetry::MetricsCollector,
) -> Result<LoadedModels> {
    use crate::encoder::BertEncoder;
    use crate::language::TrigramDetector;
    use crate::predictor::OnnxEnsemble;
    use crate::translation::{DeepLTranslator, LazyMarianTranslator, TranslationChain};

    let device = config.device.to_device_type();

    let ensemble = OnnxEnsemble::load(&config.predictor.dir, config.predictor.model.as_deref())?;
    let scoring_model = ensemble.scoring_model().to_string();
    let version = ensemble.metadata().version.clone();

    let encoder = BertEncoder::load(&config.encoder, device)?;

    let mut chain = TranslationChain::new(Arc::new(TrigramDetector::new()?))
        .with_primary(Arc::new(DeepLTranslator::new(&config.translation)?))
        .with_metrics(metrics.clone());
    if config.translator.enabled {
        chain = chain.with_fallback(Arc::new(LazyMarianTranslator::new(
            config.translator.clone(),
            device,
        )));
    }

    let pipeline = RiskPipeline::new(chain, Arc::new(encoder), Arc::new(ensemble), &config.schema)?
        .with_scoring_model(scoring_model)?
        .with_metrics(metrics.clone());

    let info = ModelInfo::describe(&pipeline, device.to_string(), version);
    Ok(LoadedModels { pipeline, info })
}
