//! Single-row feature table in the ensemble's column order

use crate::schema::{ColumnKind, FeatureSchema};
use sepsight_core::{Embedding, TabularInput};
use serde::Serialize;

/// One cell of the feature row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Value(f64),
    Missing,
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Named feature values, one per declared column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    names: Vec<String>,
    values: Vec<FeatureValue>,
}

impl FeatureRow {
    /// Fill every declared column from the tabular input and the embedding
    ///
    /// Embedding positions beyond the vector read as 0; tabular fields the
    /// input lacks and unknown columns are missing.
    pub fn build(schema: &FeatureSchema, tabular: &TabularInput, embedding: &Embedding) -> Self {
        let mut names = Vec::with_capacity(schema.len());
        let mut values = Vec::with_capacity(schema.len());

        for column in schema.columns() {
            let value = match column.kind {
                ColumnKind::Tabular(field) => tabular
                    .get(field)
                    .map_or(FeatureValue::Missing, FeatureValue::Value),
                ColumnKind::Embedding(index) => {
                    FeatureValue::Value(f64::from(embedding.get_or_zero(index)))
                }
                ColumnKind::Unknown => FeatureValue::Missing,
            };
            names.push(column.name.clone());
            values.push(value);
        }

        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Value of a named column
    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Dense input vector; missing cells are NaN
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.values
            .iter()
            .map(|v| v.as_f64().map_or(f32::NAN, |x| x as f32))
            .collect()
    }
}
