//! Feature schema declared by the exported ensemble
//!
//! Column names are classified once at load time: tabular field names map
//! to [`ClinicalField`], `<prefix><index>` names map to embedding positions,
//! and anything else is unknown and always scored as missing.

use crate::config::SchemaConfig;
use sepsight_core::{ClinicalField, Error, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// What a feature column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Tabular(ClinicalField),
    /// Position in the note embedding
    Embedding(usize),
    Unknown,
}

/// One declared feature column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered feature columns, as the ensemble expects them
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

/// Integer suffix of an embedding column name; 0 when malformed
pub fn embedding_sort_key(name: &str, prefix: &str) -> usize {
    embedding_index(name, prefix).unwrap_or(0)
}

fn embedding_index(name: &str, prefix: &str) -> Option<usize> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

impl FeatureSchema {
    /// Classify the declared column names
    ///
    /// In strict mode a column that carries the embedding prefix without a
    /// valid index, or a duplicated column name, fails the load. In lenient
    /// mode malformed embedding columns are kept as unknown.
    pub fn parse(names: &[String], config: &SchemaConfig) -> Result<Self> {
        let mut seen = HashSet::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());

        for name in names {
            if !seen.insert(name.as_str()) {
                if config.strict {
                    return Err(Error::schema(format!("duplicate feature column '{}'", name)));
                }
                warn!("Duplicate feature column '{}'", name);
            }

            let kind = if let Some(field) = ClinicalField::from_name(name) {
                ColumnKind::Tabular(field)
            } else if name.starts_with(&config.embedding_prefix) {
                match embedding_index(name, &config.embedding_prefix) {
                    Some(index) => {
                        if index >= config.embedding_dim {
                            warn!(
                                "Embedding column '{}' is beyond the {}-dimensional embedding and will score as 0",
                                name, config.embedding_dim
                            );
                        }
                        ColumnKind::Embedding(index)
                    }
                    None if config.strict => {
                        return Err(Error::schema(format!(
                            "malformed embedding column '{}': expected '{}<index>'",
                            name, config.embedding_prefix
                        )));
                    }
                    None => {
                        warn!("Malformed embedding column '{}' will be scored as missing", name);
                        ColumnKind::Unknown
                    }
                }
            } else {
                debug!("Unrecognized feature column '{}' will be scored as missing", name);
                ColumnKind::Unknown
            };

            columns.push(FeatureColumn {
                name: name.clone(),
                kind,
            });
        }

        let schema = Self { columns };
        for field in ClinicalField::ALL {
            if !schema.tabular_fields().contains(&field) {
                warn!("Ensemble does not declare tabular feature '{}'", field.name());
            }
        }

        Ok(schema)
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Declared tabular fields, in declaration order
    pub fn tabular_fields(&self) -> Vec<ClinicalField> {
        self.columns
            .iter()
            .filter_map(|c| match c.kind {
                ColumnKind::Tabular(field) => Some(field),
                _ => None,
            })
            .collect()
    }

    /// Embedding columns ordered by index
    pub fn embedding_columns(&self) -> Vec<&FeatureColumn> {
        let mut columns: Vec<&FeatureColumn> = self
            .columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Embedding(_)))
            .collect();
        columns.sort_by_key(|c| match c.kind {
            ColumnKind::Embedding(index) => index,
            _ => 0,
        });
        columns
    }

    /// Columns that are neither tabular nor embedding
    pub fn unknown_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Unknown)
            .map(|c| c.name.as_str())
            .collect()
    }
}
