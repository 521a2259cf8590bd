//! SepSight Core
//!
//! Core types, traits, and utilities shared across SepSight components.
//!
//! This crate provides:
//! - The clinical field table (names, labels, training ranges, form defaults)
//! - Tabular input, language tag, embedding and risk tier types
//! - Advisory range validation
//! - Error types and result handling

pub mod error;
pub mod types;
pub mod validation;

pub use error::{Error, Result, TranslationErrorKind};
pub use types::{
    ClinicalField, Embedding, EmbeddingStatus, FieldSpec, LanguageTag, RiskTier, TabularInput,
    EMBEDDING_DIM, HIGH_RISK_THRESHOLD, MODERATE_RISK_THRESHOLD,
};
pub use validation::{RangeValidator, RangeViolation, ValidationOutcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClinicalField, Embedding, EmbeddingStatus, LanguageTag, RiskTier, TabularInput};
    pub use crate::validation::{RangeValidator, ValidationOutcome};
}
