//! Field projection for returned records.

use bson::Document;

use crate::error::{AdapterError, AdapterResult};

/// Prefix that marks a `select` entry as excluded.
pub const EXCLUDE_PREFIX: char = '-';

/// A parsed `select` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Keep only these fields.
    Include(Vec<String>),
    /// Keep every field except these.
    Exclude(Vec<String>),
}

impl Selection {
    /// Classifies a raw `select` list.
    ///
    /// Returns `Ok(None)` for an empty list. Mixing prefixed and plain entries is an error.
    pub fn parse(fields: &[String]) -> AdapterResult<Option<Selection>> {
        if fields.is_empty() {
            return Ok(None);
        }

        let excluded = fields
            .iter()
            .filter(|field| field.starts_with(EXCLUDE_PREFIX))
            .count();

        if excluded == fields.len() {
            Ok(Some(Selection::Exclude(
                fields
                    .iter()
                    .map(|field| field.trim_start_matches(EXCLUDE_PREFIX).to_string())
                    .collect(),
            )))
        } else if excluded == 0 {
            Ok(Some(Selection::Include(fields.to_vec())))
        } else {
            Err(AdapterError::InvalidQuery(
                "select cannot mix included and excluded fields".to_string(),
            ))
        }
    }

    /// Projects a single record.
    pub fn apply(&self, record: Document) -> Document {
        match self {
            Selection::Include(fields) => record
                .into_iter()
                .filter(|(key, _)| fields.iter().any(|field| field == key))
                .collect(),
            Selection::Exclude(fields) => record
                .into_iter()
                .filter(|(key, _)| !fields.iter().any(|field| field == key))
                .collect(),
        }
    }
}
