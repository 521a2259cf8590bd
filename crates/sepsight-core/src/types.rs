//! Core types for SepSight

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dimension of the clinical note embedding fed to the ensemble
pub const EMBEDDING_DIM: usize = 768;

/// Probability at or above which the risk tier becomes moderate
pub const MODERATE_RISK_THRESHOLD: f64 = 0.3;

/// Probability at or above which the risk tier becomes high
pub const HIGH_RISK_THRESHOLD: f64 = 0.6;

/// One of the five tabular lab values collected during the first 24 hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalField {
    Hemoglobin,
    Albumin,
    Aptt,
    Bilirubin,
    IcuLosDays,
}

impl ClinicalField {
    /// All fields in their fixed table order
    pub const ALL: [ClinicalField; 5] = [
        Self::Hemoglobin,
        Self::Albumin,
        Self::Aptt,
        Self::Bilirubin,
        Self::IcuLosDays,
    ];

    /// Column name used by the ensemble and the JSON API
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hemoglobin => "hemoglobin",
            Self::Albumin => "albumin",
            Self::Aptt => "aptt",
            Self::Bilirubin => "bilirubin",
            Self::IcuLosDays => "icu_los_days",
        }
    }

    /// Human-readable label with unit
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hemoglobin => "Hemoglobin (g/dL)",
            Self::Albumin => "Albumin (g/dL)",
            Self::Aptt => "aPTT (seconds)",
            Self::Bilirubin => "Total bilirubin (mg/dL)",
            Self::IcuLosDays => "ICU length of stay (days)",
        }
    }

    /// Closed interval seen during training
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::Hemoglobin => (3.0, 25.0),
            Self::Albumin => (1.0, 8.0),
            Self::Aptt => (10.0, 200.0),
            Self::Bilirubin => (0.1, 50.0),
            Self::IcuLosDays => (0.1, 365.0),
        }
    }

    /// Initial value shown in the form
    pub fn default_value(&self) -> f64 {
        match self {
            Self::Hemoglobin => 10.0,
            Self::Albumin => 3.0,
            Self::Aptt => 30.0,
            Self::Bilirubin => 1.2,
            Self::IcuLosDays => 3.0,
        }
    }

    /// Form input step
    pub fn step(&self) -> f64 {
        match self {
            Self::Aptt | Self::IcuLosDays => 0.5,
            _ => 0.1,
        }
    }

    /// Look up a field by its column name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Describe the field for UI consumption
    pub fn spec(&self) -> FieldSpec {
        let (min, max) = self.range();
        FieldSpec {
            name: self.name(),
            label: self.label(),
            min,
            max,
            default: self.default_value(),
            step: self.step(),
        }
    }
}

impl fmt::Display for ClinicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializable description of a clinical field
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub step: f64,
}

/// Tabular lab values keyed by clinical field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabularInput {
    values: BTreeMap<ClinicalField, f64>,
}

impl TabularInput {
    /// Create an empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: ClinicalField, value: f64) -> Self {
        self.values.insert(field, value);
        self
    }

    /// Set a value
    pub fn set(&mut self, field: ClinicalField, value: f64) {
        self.values.insert(field, value);
    }

    /// Get a value
    pub fn get(&self, field: ClinicalField) -> Option<f64> {
        self.values.get(&field).copied()
    }

    /// Iterate values in table order
    pub fn iter(&self) -> impl Iterator<Item = (ClinicalField, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }

    /// Fields that have no value
    pub fn missing_fields(&self) -> Vec<ClinicalField> {
        ClinicalField::ALL
            .into_iter()
            .filter(|f| !self.values.contains_key(f))
            .collect()
    }

    /// Form defaults for every field
    pub fn defaults() -> Self {
        ClinicalField::ALL
            .into_iter()
            .fold(Self::new(), |input, f| input.with(f, f.default_value()))
    }
}

impl FromIterator<(ClinicalField, f64)> for TabularInput {
    fn from_iter<I: IntoIterator<Item = (ClinicalField, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Detected language of a clinical note
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Tag used for empty text and detector failures
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn spanish() -> Self {
        Self("es".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Spanish tags (`es`, `es-ES`, ...) trigger translation
    pub fn is_spanish(&self) -> bool {
        self.0.starts_with("es")
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an embedding came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    /// Produced by the encoder
    Encoded,
    /// Zero vector because the text was empty
    EmptyText,
    /// Zero vector because the encoder failed
    Failed,
}

/// Fixed-length note embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
    status: EmbeddingStatus,
}

impl Embedding {
    /// Wrap encoder output
    pub fn encoded(values: Vec<f32>) -> Self {
        Self {
            values,
            status: EmbeddingStatus::Encoded,
        }
    }

    /// Zero vector carrying the reason it is zero
    pub fn zeros(dim: usize, status: EmbeddingStatus) -> Self {
        Self {
            values: vec![0.0; dim],
            status,
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn status(&self) -> EmbeddingStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, or `0.0` when out of bounds
    pub fn get_or_zero(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

/// Coarse bucketing of the mortality probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    /// Map a probability onto a tier; thresholds are inclusive on the upper tier
    pub fn from_probability(p: f64) -> Self {
        if p < MODERATE_RISK_THRESHOLD {
            Self::Low
        } else if p < HIGH_RISK_THRESHOLD {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
