use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use sepsight_core::{ClinicalField, EmbeddingStatus, FieldSpec, LanguageTag, RiskTier, TabularInput};
use sepsight_models::{Assessment, StageTiming, TranslationSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

// ============================================================================
// Health and metadata
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Describe the loaded ensemble, loading it on first call
pub async fn model_info(State(state): State<AppState>) -> Result<Response, AppError> {
    let loaded = state.models.get().await?;
    Ok(Json(loaded.info.clone()).into_response())
}

pub async fn fields() -> Json<Vec<FieldSpec>> {
    Json(ClinicalField::ALL.iter().map(ClinicalField::spec).collect())
}

// ============================================================================
// Assessment
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessRequest {
    pub tabular: TabularInput,
    #[serde(default)]
    pub note: String,
}

impl AssessRequest {
    fn check(&self) -> Result<(), AppError> {
        let missing = self.tabular.missing_fields();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|f| f.name()).collect();
            return Err(AppError::InvalidRequest(format!(
                "missing lab values: {}",
                names.join(", ")
            )));
        }
        if let Some((field, _)) = self.tabular.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::InvalidRequest(format!("{} must be a finite number", field)));
        }
        if self.note.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "a clinical note is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct AssessResponse {
    pub probability: f64,
    pub probability_percent: f64,
    pub risk_tier: RiskTier,
    pub risk_label: &'static str,
    pub language: LanguageTag,
    pub translated: bool,
    pub translation: TranslationSource,
    pub embedding_status: EmbeddingStatus,
    pub warnings: Vec<String>,
    pub model: String,
    pub stages: Vec<StageTiming>,
    pub latency_us: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<Assessment> for AssessResponse {
    fn from(a: Assessment) -> Self {
        Self {
            probability: a.probability,
            probability_percent: a.probability_percent(),
            risk_tier: a.risk_tier,
            risk_label: a.risk_tier.label(),
            translated: a.is_translated(),
            language: a.language,
            translation: a.translation,
            embedding_status: a.embedding_status,
            warnings: a.warnings,
            model: a.model,
            stages: a.stages,
            latency_us: a.latency_us,
            timestamp: a.timestamp,
        }
    }
}

/// Score one patient; assessments run one at a time
pub async fn assess(
    State(state): State<AppState>,
    payload: Result<Json<AssessRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    request.check()?;

    let _guard = state.assess_lock.lock().await;
    let loaded = state.models.get().await?;
    let assessment = loaded.pipeline.assess(&request.tabular, &request.note).await?;

    info!(
        tier = %assessment.risk_tier,
        language = %assessment.language,
        "Assessment served"
    );
    Ok(Json(AssessResponse::from(assessment)).into_response())
}

// ============================================================================
// Statistics
// ============================================================================

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "models_loaded": state.models.is_initialized(),
        "avg_latency_us": snapshot.avg_latency_us(),
        "failure_rate": snapshot.failure_rate(),
        "metrics": snapshot,
    }))
}

/// Prometheus text exposition
pub async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request body is malformed or incomplete
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pipeline(#[from] sepsight_core::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid request"),
            AppError::Pipeline(e) if e.is_fatal_to_session() => {
                (StatusCode::SERVICE_UNAVAILABLE, "models unavailable")
            }
            AppError::Pipeline(sepsight_core::Error::Prediction(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "prediction failed")
            }
            AppError::Pipeline(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };

        if status.is_server_error() {
            warn!(status = status.as_u16(), "{}: {}", error, self);
        }

        let body = json!({
            "error": error,
            "detail": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
