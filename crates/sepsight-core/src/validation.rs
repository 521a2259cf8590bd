//! Advisory range validation for tabular inputs
//!
//! Values outside the training ranges do not stop a prediction; they only
//! produce a warning shown next to the result.

use crate::types::{ClinicalField, TabularInput};
use serde::Serialize;
use std::fmt;

/// A value that fell outside its field's closed interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeViolation {
    pub field: ClinicalField,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2} is outside the valid range [{:?}, {:?}]. Results may be unreliable.",
            self.field.label(),
            self.value,
            self.min,
            self.max
        )
    }
}

/// Outcome of validating a tabular input
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid,
    OutOfRange(RangeViolation),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Warning text, if any
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::OutOfRange(v) => Some(v.to_string()),
        }
    }
}

/// Checks tabular values against a fixed range table
#[derive(Debug, Clone)]
pub struct RangeValidator {
    ranges: Vec<(ClinicalField, f64, f64)>,
}

impl RangeValidator {
    /// Validator over the training ranges of every clinical field
    pub fn new() -> Self {
        Self {
            ranges: ClinicalField::ALL
                .into_iter()
                .map(|f| {
                    let (min, max) = f.range();
                    (f, min, max)
                })
                .collect(),
        }
    }

    /// Override the range of one field
    pub fn with_range(mut self, field: ClinicalField, min: f64, max: f64) -> Self {
        match self.ranges.iter_mut().find(|(f, _, _)| *f == field) {
            Some(entry) => *entry = (field, min, max),
            None => self.ranges.push((field, min, max)),
        }
        self
    }

    /// Report the first violation in table order
    pub fn validate(&self, input: &TabularInput) -> ValidationOutcome {
        match self.violations(input).next() {
            Some(violation) => ValidationOutcome::OutOfRange(violation),
            None => ValidationOutcome::Valid,
        }
    }

    /// Report every violation in table order
    pub fn validate_all(&self, input: &TabularInput) -> Vec<RangeViolation> {
        self.violations(input).collect()
    }

    fn violations<'a>(
        &'a self,
        input: &'a TabularInput,
    ) -> impl Iterator<Item = RangeViolation> + 'a {
        self.ranges.iter().filter_map(move |&(field, min, max)| {
            let value = input.get(field)?;
            // NaN fails both comparisons and is reported
            if min <= value && value <= max {
                None
            } else {
                Some(RangeViolation {
                    field,
                    value,
                    min,
                    max,
                })
            }
        })
    }
}

impl Default for RangeValidator {
    fn default() -> Self {
        Self::new()
    }
}
