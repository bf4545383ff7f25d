//! Field-operator instructions carried in an envelope's `update` list.
//!
//! Each wire entry maps a field to one or more operators, e.g.
//! `[{ "power": { "inc": 4 } }, { "tags": { "push": ["new"], "pull": "old" } }]`.
//! Entries are flattened in order into [`UpdateOp`]s.

use bson::{Bson, Document};

use crate::error::{AdapterError, AdapterResult};

/// The mutation an [`UpdateOp`] applies to its field.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// Adds a numeric delta to the field.
    Inc(Bson),
    /// Appends to an array field. An array operand is concatenated, anything else is
    /// appended as a single element.
    Push(Bson),
    /// Removes every occurrence of the operand (or of each element, for an array
    /// operand) from an array field.
    Pull(Bson),
}

/// A single field-operator instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    /// The field to mutate.
    pub field: String,
    /// What to do to it.
    pub kind: UpdateKind,
}

impl UpdateOp {
    pub fn inc(field: impl Into<String>, delta: impl Into<Bson>) -> Self {
        Self { field: field.into(), kind: UpdateKind::Inc(delta.into()) }
    }

    pub fn push(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self { field: field.into(), kind: UpdateKind::Push(value.into()) }
    }

    pub fn pull(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self { field: field.into(), kind: UpdateKind::Pull(value.into()) }
    }

    /// Flattens one wire entry into instructions, preserving order.
    pub fn from_document(entry: &Document) -> AdapterResult<Vec<UpdateOp>> {
        let mut ops = Vec::new();

        for (field, operators) in entry {
            let operators = operators.as_document().ok_or_else(|| {
                AdapterError::InvalidQuery(format!(
                    "update on field '{field}' must map operators to operands"
                ))
            })?;

            for (op, operand) in operators {
                let kind = match op.as_str() {
                    "inc" => UpdateKind::Inc(operand.clone()),
                    "push" => UpdateKind::Push(operand.clone()),
                    "pull" => UpdateKind::Pull(operand.clone()),
                    other => {
                        return Err(AdapterError::InvalidQuery(format!(
                            "unknown update operator '{other}'"
                        )));
                    }
                };

                ops.push(UpdateOp { field: field.clone(), kind });
            }
        }

        Ok(ops)
    }

    /// Flattens a whole wire `update` list, preserving entry order.
    pub fn from_list(entries: &[Document]) -> AdapterResult<Vec<UpdateOp>> {
        let mut ops = Vec::new();

        for entry in entries {
            ops.extend(UpdateOp::from_document(entry)?);
        }

        Ok(ops)
    }
}
