use metrics_exporter_prometheus::PrometheusHandle;
use sepsight_models::ModelStore;
use sepsight_telemetry::MetricsCollector;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Lazily loaded models and the pipeline built on them
    pub models: Arc<ModelStore>,

    /// Held for the length of an assessment; one calculation at a time
    pub assess_lock: Arc<Mutex<()>>,

    /// Counters behind `/api/stats`
    pub metrics: MetricsCollector,

    /// Prometheus exposition; absent when no recorder is installed
    pub prometheus: Option<PrometheusHandle>,

    /// Permit cross-origin requests from any origin
    pub allow_any_origin: bool,
}

impl AppState {
    pub fn new(models: ModelStore, metrics: MetricsCollector) -> Self {
        Self {
            models: Arc::new(models),
            assess_lock: Arc::new(Mutex::new(())),
            metrics,
            prometheus: None,
            allow_any_origin: false,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn with_any_origin(mut self, allow: bool) -> Self {
        self.allow_any_origin = allow;
        self
    }
}
