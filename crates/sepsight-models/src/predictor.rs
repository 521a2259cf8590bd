//! Adapter over the exported tabular ensemble
//!
//! The ensemble directory holds `predictor.json` (declared features, model
//! names, best model and the stacking graph), one `<model>.onnx` per
//! exported sub-model, and an optional `version.txt`.

use crate::feature_row::FeatureRow;
use async_trait::async_trait;
use sepsight_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Metadata file inside the ensemble directory
pub const METADATA_FILE: &str = "predictor.json";

/// Optional version file inside the ensemble directory
pub const VERSION_FILE: &str = "version.txt";

/// Tolerance for probabilities that drift just outside [0, 1]
const PROBABILITY_EPSILON: f64 = 1e-6;

/// Binary classifier over a feature row
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Declared feature columns, in order
    fn feature_names(&self) -> &[String];

    /// The ensemble's best model
    fn best_model(&self) -> &str;

    /// Every trained model
    fn model_names(&self) -> &[String];

    /// Class probabilities from one named model
    async fn predict_proba(&self, row: &FeatureRow, model: &str) -> Result<ClassProbabilities>;
}

/// Probability columns for a single row
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    values: Vec<f32>,
}

impl ClassProbabilities {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Probability of the positive class
    ///
    /// Two columns read as `[negative, positive]`; a single column is the
    /// positive probability itself.
    pub fn positive_class(&self) -> Result<f64> {
        let p = match self.values.as_slice() {
            [p] | [_, p] => f64::from(*p),
            other => {
                return Err(Error::prediction(format!(
                    "expected 1 or 2 probability columns, got {}",
                    other.len()
                )))
            }
        };

        if !p.is_finite() {
            return Err(Error::prediction(format!("non-finite probability {p}")));
        }
        if !(-PROBABILITY_EPSILON..=1.0 + PROBABILITY_EPSILON).contains(&p) {
            return Err(Error::prediction(format!("probability {p} outside [0, 1]")));
        }
        Ok(p.clamp(0.0, 1.0))
    }
}

/// Contents of `predictor.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    /// Feature columns in training order
    pub features: Vec<String>,

    pub model_best: String,

    #[serde(default)]
    pub models: Vec<String>,

    /// Direct base models of each stacked model
    #[serde(default)]
    pub model_graph: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_input_name")]
    pub input_name: String,

    #[serde(default = "default_output_name")]
    pub output_name: String,

    #[serde(default)]
    pub version: Option<String>,
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_output_name() -> String {
    "probabilities".to_string()
}

impl EnsembleMetadata {
    /// Read `predictor.json` (and `version.txt`, when present) from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::model_load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut metadata: Self = serde_json::from_str(&content).map_err(|e| {
            Error::model_load(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        if metadata.version.is_none() {
            metadata.version = std::fs::read_to_string(dir.join(VERSION_FILE))
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }

        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&mut self) -> Result<()> {
        if self.features.is_empty() {
            return Err(Error::schema("ensemble declares no features"));
        }
        if self.models.is_empty() {
            self.models.push(self.model_best.clone());
        }
        if !self.models.contains(&self.model_best) {
            return Err(Error::model_load(format!(
                "best model '{}' is not among the trained models",
                self.model_best
            )));
        }
        Ok(())
    }

    /// Every model `model` depends on, directly or through stacking
    pub fn transitive_dependencies(&self, model: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = vec![model];

        while let Some(current) = stack.pop() {
            for dep in self.model_graph.get(current).into_iter().flatten() {
                if dep != model && seen.insert(dep.clone()) {
                    stack.push(dep);
                }
            }
        }

        seen
    }

    /// The model to score with: `requested` if given, else the best model
    pub fn scoring_model<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        match requested {
            None => Ok(&self.model_best),
            Some(name) if self.models.iter().any(|m| m == name) => Ok(name),
            Some(name) => Err(Error::model_load(format!(
                "model '{}' is not among the trained models {:?}",
                name, self.models
            ))),
        }
    }

    /// Exported file for a model
    pub fn model_path(dir: &Path, model: &str) -> PathBuf {
        dir.join(format!("{model}.onnx"))
    }
}

#[cfg(feature = "ml-models")]
pub use onnx::OnnxEnsemble;

#[cfg(feature = "ml-models")]
mod onnx {
    use super::{ClassProbabilities, EnsembleMetadata, Predictor};
    use crate::feature_row::FeatureRow;
    use async_trait::async_trait;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::TensorRef;
    use parking_lot::Mutex;
    use sepsight_core::{Error, Result};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use tracing::info;

    /// Ensemble whose sub-models were exported to ONNX
    pub struct OnnxEnsemble {
        metadata: EnsembleMetadata,
        scoring_model: String,
        sessions: HashMap<String, Arc<Mutex<Session>>>,
    }

    impl OnnxEnsemble {
        /// Load metadata and a session for the scoring model; blocking
        ///
        /// `model` selects a sub-model by name; the best model is used
        /// when it is `None`.
        pub fn load(dir: &Path, model: Option<&str>) -> Result<Self> {
            let metadata = EnsembleMetadata::load(dir)?;
            let scoring_model = metadata.scoring_model(model)?.to_string();

            let path = EnsembleMetadata::model_path(dir, &scoring_model);
            info!("Loading ensemble model '{}' from {}", scoring_model, path.display());
            let session = build_session(&path)?;

            let mut sessions = HashMap::new();
            sessions.insert(scoring_model.clone(), Arc::new(Mutex::new(session)));

            Ok(Self {
                metadata,
                scoring_model,
                sessions,
            })
        }

        pub fn metadata(&self) -> &EnsembleMetadata {
            &self.metadata
        }

        /// Name of the loaded sub-model
        pub fn scoring_model(&self) -> &str {
            &self.scoring_model
        }
    }

    fn build_session(model_path: &Path) -> Result<Session> {
        Session::builder()
            .map_err(|e| Error::model_load(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::model_load(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| Error::model_load(format!("Failed to load ONNX model: {}", e)))
    }

    fn run(
        session: &mut Session,
        input_name: &str,
        output_name: &str,
        features: &[f32],
    ) -> Result<Vec<f32>> {
        let shape = [1_usize, features.len()];
        let input = TensorRef::from_array_view((shape, features))
            .map_err(|e| Error::prediction(format!("Failed to create input tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![input_name => input])
            .map_err(|e| Error::prediction(format!("ONNX inference failed: {}", e)))?;

        let probabilities = outputs
            .get(output_name)
            .ok_or_else(|| Error::prediction(format!("No '{}' output found", output_name)))?;

        // (&Shape, &[f32]) for the single input row
        let (_, data) = probabilities
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::prediction(format!("Failed to extract probabilities: {}", e)))?;

        Ok(data.to_vec())
    }

    #[async_trait]
    impl Predictor for OnnxEnsemble {
        fn feature_names(&self) -> &[String] {
            &self.metadata.features
        }

        fn best_model(&self) -> &str {
            &self.metadata.model_best
        }

        fn model_names(&self) -> &[String] {
            &self.metadata.models
        }

        async fn predict_proba(&self, row: &FeatureRow, model: &str) -> Result<ClassProbabilities> {
            let session = self
                .sessions
                .get(model)
                .cloned()
                .ok_or_else(|| Error::prediction(format!("model '{}' is not loaded", model)))?;

            if row.len() != self.metadata.features.len() {
                return Err(Error::prediction(format!(
                    "feature row has {} columns, ensemble expects {}",
                    row.len(),
                    self.metadata.features.len()
                )));
            }

            let features = row.to_f32_vec();
            let input_name = self.metadata.input_name.clone();
            let output_name = self.metadata.output_name.clone();

            let values = tokio::task::spawn_blocking(move || {
                let mut session = session.lock();
                run(&mut session, &input_name, &output_name, &features)
            })
            .await
            .map_err(|e| Error::prediction(format!("Prediction task failed: {}", e)))??;

            Ok(ClassProbabilities::new(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(json: &str) -> EnsembleMetadata {
        let mut m: EnsembleMetadata = serde_json::from_str(json).unwrap();
        m.validate().unwrap();
        m
    }

    #[test]
    fn test_positive_class_two_columns() {
        let p = ClassProbabilities::new(vec![0.3, 0.7]).positive_class().unwrap();
        assert!((p - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_positive_class_single_column() {
        let p = ClassProbabilities::new(vec![0.42]).positive_class().unwrap();
        assert!((p - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_positive_class_rejects_bad_output() {
        assert!(ClassProbabilities::new(vec![]).positive_class().is_err());
        assert!(ClassProbabilities::new(vec![0.1, 0.2, 0.7]).positive_class().is_err());
        assert!(ClassProbabilities::new(vec![f32::NAN]).positive_class().is_err());
        assert!(ClassProbabilities::new(vec![0.0, 1.5]).positive_class().is_err());
    }

    #[test]
    fn test_positive_class_clamps_rounding() {
        let p = ClassProbabilities::new(vec![1.000_000_1]).positive_class().unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_metadata_defaults() {
        let m = metadata(r#"{"features": ["hemoglobin"], "model_best": "CatBoost"}"#);
        assert_eq!(m.models, vec!["CatBoost".to_string()]);
        assert_eq!(m.input_name, "input");
        assert_eq!(m.output_name, "probabilities");
        assert_eq!(m.scoring_model(None).unwrap(), "CatBoost");
        assert!(m.scoring_model(Some("LightGBM")).is_err());
    }

    #[test]
    fn test_best_model_must_be_trained() {
        let mut m: EnsembleMetadata = serde_json::from_str(
            r#"{"features": ["hemoglobin"], "model_best": "X", "models": ["A"]}"#,
        )
        .unwrap();
        assert!(matches!(m.validate(), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_empty_features_is_schema_error() {
        let mut m: EnsembleMetadata =
            serde_json::from_str(r#"{"features": [], "model_best": "A"}"#).unwrap();
        assert!(matches!(m.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_transitive_dependencies() {
        let m = metadata(
            r#"{
                "features": ["hemoglobin"],
                "model_best": "WeightedEnsemble_L3",
                "models": ["WeightedEnsemble_L3", "CatBoost_L2", "LightGBM_L1", "XGBoost_L1"],
                "model_graph": {
                    "WeightedEnsemble_L3": ["CatBoost_L2"],
                    "CatBoost_L2": ["LightGBM_L1", "XGBoost_L1"]
                }
            }"#,
        );

        let deps: Vec<String> = m.transitive_dependencies("WeightedEnsemble_L3").into_iter().collect();
        assert_eq!(deps, vec!["CatBoost_L2", "LightGBM_L1", "XGBoost_L1"]);
        assert!(m.transitive_dependencies("LightGBM_L1").is_empty());
    }

    #[test]
    fn test_transitive_dependencies_terminates_on_cycle() {
        let m = metadata(
            r#"{
                "features": ["hemoglobin"],
                "model_best": "A",
                "models": ["A", "B", "C"],
                "model_graph": {"A": ["B"], "B": ["C"], "C": ["A", "B"]}
            }"#,
        );

        let deps: Vec<String> = m.transitive_dependencies("A").into_iter().collect();
        assert_eq!(deps, vec!["B", "C"]);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"features": ["hemoglobin", "emb_0"], "model_best": "CatBoost"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "2024.06.1\n").unwrap();

        let m = EnsembleMetadata::load(dir.path()).unwrap();
        assert_eq!(m.features.len(), 2);
        assert_eq!(m.version.as_deref(), Some("2024.06.1"));
        assert_eq!(
            EnsembleMetadata::model_path(dir.path(), "CatBoost"),
            dir.path().join("CatBoost.onnx")
        );
    }

    #[test]
    fn test_missing_metadata_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(EnsembleMetadata::load(dir.path()), Err(Error::ModelLoad(_))));
    }
}
