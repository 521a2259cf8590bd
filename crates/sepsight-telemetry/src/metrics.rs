//! Metrics collection and reporting

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline stage, used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Translate,
    Encode,
    Predict,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Self::Validate, Self::Translate, Self::Encode, Self::Predict];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Translate => "translate",
            Self::Encode => "encode",
            Self::Predict => "predict",
        }
    }
}

/// A stage falling back to its safe default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeEvent {
    /// Detector could not decide; language set to unknown
    DetectionFailed,
    /// Remote translation was attempted and failed; a missing credential is
    /// a skip, not a failure
    PrimaryTranslationFailed,
    /// Local translation failed too; original text passed through
    FallbackTranslationFailed,
    /// Encoder failed; zero vector used
    EncodingFailed,
}

impl DegradeEvent {
    pub const ALL: [DegradeEvent; 4] = [
        Self::DetectionFailed,
        Self::PrimaryTranslationFailed,
        Self::FallbackTranslationFailed,
        Self::EncodingFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectionFailed => "detection_failed",
            Self::PrimaryTranslationFailed => "primary_translation_failed",
            Self::FallbackTranslationFailed => "fallback_translation_failed",
            Self::EncodingFailed => "encoding_failed",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::DetectionFailed => 0,
            Self::PrimaryTranslationFailed => 1,
            Self::FallbackTranslationFailed => 2,
            Self::EncodingFailed => 3,
        }
    }
}

/// Metrics collector for SepSight request monitoring
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    total_requests: AtomicU64,
    predictions: AtomicU64,
    prediction_failures: AtomicU64,
    out_of_range_warnings: AtomicU64,
    translations: AtomicU64,
    degrade_events: [AtomicU64; 4],
    total_latency_us: AtomicU64,
    predict_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                total_requests: AtomicU64::new(0),
                predictions: AtomicU64::new(0),
                prediction_failures: AtomicU64::new(0),
                out_of_range_warnings: AtomicU64::new(0),
                translations: AtomicU64::new(0),
                degrade_events: Default::default(),
                total_latency_us: AtomicU64::new(0),
                predict_latency_us: AtomicU64::new(0),
            }),
        }
    }

    /// Record an assessment request
    pub fn record_request(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sepsight_requests_total").increment(1);
    }

    /// Record a successful prediction and its end-to-end latency
    pub fn record_prediction(&self, latency_us: u64) {
        self.inner.predictions.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        metrics::counter!("sepsight_predictions_total").increment(1);
    }

    /// Record a failed prediction
    pub fn record_prediction_failure(&self) {
        self.inner.prediction_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sepsight_prediction_failures_total").increment(1);
    }

    /// Record an advisory range warning
    pub fn record_range_warning(&self) {
        self.inner
            .out_of_range_warnings
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sepsight_range_warnings_total").increment(1);
    }

    /// Record a note that was translated
    pub fn record_translation(&self) {
        self.inner.translations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sepsight_translations_total").increment(1);
    }

    /// Record a degrade event
    pub fn record_degrade(&self, event: DegradeEvent) {
        self.inner.degrade_events[event.index()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sepsight_degrade_events_total", "event" => event.as_str())
            .increment(1);
    }

    /// Record the latency of one stage
    pub fn record_stage_latency(&self, stage: Stage, latency_us: u64) {
        if stage == Stage::Predict {
            self.inner
                .predict_latency_us
                .fetch_add(latency_us, Ordering::Relaxed);
        }
        metrics::histogram!("sepsight_stage_latency_us", "stage" => stage.as_str())
            .record(latency_us as f64);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let degrade = |e: DegradeEvent| self.inner.degrade_events[e.index()].load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            predictions: self.inner.predictions.load(Ordering::Relaxed),
            prediction_failures: self.inner.prediction_failures.load(Ordering::Relaxed),
            out_of_range_warnings: self.inner.out_of_range_warnings.load(Ordering::Relaxed),
            translations: self.inner.translations.load(Ordering::Relaxed),
            detection_failures: degrade(DegradeEvent::DetectionFailed),
            primary_translation_failures: degrade(DegradeEvent::PrimaryTranslationFailed),
            fallback_translation_failures: degrade(DegradeEvent::FallbackTranslationFailed),
            encoding_failures: degrade(DegradeEvent::EncodingFailed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
            predict_latency_us: self.inner.predict_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub predictions: u64,
    pub prediction_failures: u64,
    pub out_of_range_warnings: u64,
    pub translations: u64,
    pub detection_failures: u64,
    pub primary_translation_failures: u64,
    pub fallback_translation_failures: u64,
    pub encoding_failures: u64,
    pub total_latency_us: u64,
    pub predict_latency_us: u64,
}

impl MetricsSnapshot {
    /// Average end-to-end latency per successful prediction
    pub fn avg_latency_us(&self) -> u64 {
        if self.predictions == 0 {
            0
        } else {
            self.total_latency_us / self.predictions
        }
    }

    /// Share of requests whose prediction failed
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.prediction_failures as f64 / self.total_requests as f64
        }
    }
}

/// Register descriptions for every exported metric
pub fn describe_metrics() {
    metrics::describe_counter!(
        "sepsight_requests_total",
        "Total number of assessment requests"
    );
    metrics::describe_counter!(
        "sepsight_predictions_total",
        "Total number of successful predictions"
    );
    metrics::describe_counter!(
        "sepsight_prediction_failures_total",
        "Total number of predictions that failed the request"
    );
    metrics::describe_counter!(
        "sepsight_range_warnings_total",
        "Inputs outside the training ranges"
    );
    metrics::describe_counter!(
        "sepsight_translations_total",
        "Clinical notes translated to English"
    );
    metrics::describe_counter!(
        "sepsight_degrade_events_total",
        "Stages that fell back to their safe default, by event"
    );
    metrics::describe_histogram!(
        "sepsight_stage_latency_us",
        metrics::Unit::Microseconds,
        "Pipeline stage latency in microseconds by stage"
    );

    // Every label is exported from startup, not from its first event
    for event in DegradeEvent::ALL {
        metrics::counter!("sepsight_degrade_events_total", "event" => event.as_str()).increment(0);
    }
    for stage in Stage::ALL {
        let _ = metrics::histogram!("sepsight_stage_latency_us", "stage" => stage.as_str());
    }
    tracing::debug!("Metric descriptions registered");
}
