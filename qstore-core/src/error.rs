//! Error types and result types for envelope execution.
//!
//! Every failure an adapter can report is a variant of [`AdapterError`]. Use
//! [`AdapterResult<T>`] as the return type for fallible operations, and
//! [`AdapterError::kind`] when a caller needs to branch on the broad class of failure
//! rather than on the message.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::envelope::Action;

/// Broad classification of an [`AdapterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The envelope is malformed or names something the adapter cannot run.
    Validation,
    /// A mutation did not target any records.
    Targeting,
    /// A record identifier collides with an existing one.
    Conflict,
    /// A nested populate lookup failed.
    Population,
    /// Converting between wire formats failed.
    Serialization,
}

/// Represents all possible errors that can occur when executing an envelope.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The envelope is missing `action` or `resource`, or one of its modifiers is malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// No handler is registered for the requested action name.
    #[error("No matching action: {0}")]
    NoMatchingAction(String),
    /// `update` or `remove` was issued without `ids` or `match`.
    #[error("{0} must target records with ids or match")]
    MissingTarget(Action),
    /// No records matched a mutation that requires at least one.
    /// The first argument is the action, the second is the resource name.
    #[error("No records found to {0} in resource {1}")]
    NotFound(Action, String),
    /// A record with the given id already exists in the resource.
    /// The first argument is the record id, the second is the resource name.
    #[error("Record {0} already exists in resource {1}")]
    RecordAlreadyExists(String, String),
    /// A record is missing its `id` or is otherwise unusable.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// A nested lookup issued while populating `field` failed.
    #[error("Failed to populate field {field}: {source}")]
    Population {
        field: String,
        #[source]
        source: Box<AdapterError>,
    },
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AdapterError {
    /// Returns the broad class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::InvalidQuery(_)
            | AdapterError::NoMatchingAction(_)
            | AdapterError::InvalidRecord(_) => ErrorKind::Validation,
            AdapterError::MissingTarget(_) | AdapterError::NotFound(..) => ErrorKind::Targeting,
            AdapterError::RecordAlreadyExists(..) => ErrorKind::Conflict,
            AdapterError::Population { .. } => ErrorKind::Population,
            AdapterError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Wraps a nested lookup failure as a population error for `field`.
    pub fn population(field: impl Into<String>, source: AdapterError) -> Self {
        AdapterError::Population {
            field: field.into(),
            source: Box::new(source),
        }
    }
}

/// A specialized `Result` type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<BsonError> for AdapterError {
    fn from(err: BsonError) -> Self {
        AdapterError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for AdapterError {
    fn from(err: SerdeJsonError) -> Self {
        AdapterError::Serialization(err.to_string())
    }
}
