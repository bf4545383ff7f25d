//! Match tree evaluation for in-memory record filtering.
//!
//! This module provides the evaluation engine for match trees and the candidate
//! resolution shared by every handler: `ids` first, then `match`.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime};

use qstore_core::{
    query::{MatchVisitor, MatchNode, FieldOp},
    error::{AdapterError, AdapterResult},
};

/// Field every record is identified by.
pub const ID_FIELD: &str = "id";


/// Type-erased, comparable representation of BSON values.
///
/// Integers of every width widen to i64 so that an `Int32` stored by a fixture
/// equals the `Int64` a JSON envelope carries. An integer and a double compare by
/// exact value, never through a lossy cast. Values of different kinds are never
/// equal and never ordered.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Anything else is compared by raw equality.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Double(a), Comparable::Double(b)) => a == b,
            (Comparable::Int(a), Comparable::Double(b))
            | (Comparable::Double(b), Comparable::Int(a)) => {
                compare_int_double(*a, *b) == Some(Ordering::Equal)
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Double(a), Comparable::Double(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Double(b)) => compare_int_double(*a, *b),
            (Comparable::Double(a), Comparable::Int(b)) => {
                compare_int_double(*b, *a).map(Ordering::reverse)
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders an integer against a double without rounding either one.
fn compare_int_double(int: i64, double: f64) -> Option<Ordering> {
    // 2^63, exactly representable as f64.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;

    if double.is_nan() {
        return None;
    }
    if double >= BOUND {
        return Some(Ordering::Less);
    }
    if double < -BOUND {
        return Some(Ordering::Greater);
    }

    // In range, so the truncated double converts to i64 exactly.
    let whole = double.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&double),
        unequal => Some(unequal),
    }
}

/// Strict equality between two stored values.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Whether `needle` equals any element of `haystack`.
pub(crate) fn contains_value(haystack: &[Bson], needle: &Bson) -> bool {
    haystack.iter().any(|item| values_equal(item, needle))
}


/// A record paired with its position in the collection.
///
/// Handlers keep the position to write back or remove the record after matching.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedRecord<'a> {
    pub index: usize,
    pub record: &'a Document,
}

/// Resolves the records an envelope targets, in collection order.
///
/// When `ids` is given only records carrying one of those ids are candidates; `matcher`
/// then filters the candidates. With neither, every record is returned.
pub(crate) fn resolve_candidates<'a>(
    records: &'a [Document],
    ids: Option<&[Bson]>,
    matcher: Option<&MatchNode>,
) -> AdapterResult<Vec<IndexedRecord<'a>>> {
    let mut candidates = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if let Some(ids) = ids {
            match record.get(ID_FIELD) {
                Some(id) if contains_value(ids, id) => {}
                _ => continue,
            }
        }

        if let Some(matcher) = matcher {
            if !RecordEvaluator::new(record).evaluate(matcher)? {
                continue;
            }
        }

        candidates.push(IndexedRecord { index, record });
    }

    Ok(candidates)
}


pub(crate) struct RecordEvaluator<'a> {
    record: &'a Document,
}

impl<'a> RecordEvaluator<'a> {
    pub fn new(record: &'a Document) -> Self {
        Self { record }
    }

    pub fn evaluate(&mut self, node: &MatchNode) -> AdapterResult<bool> {
        self.visit_node(node)
    }
}

impl<'a> MatchVisitor for RecordEvaluator<'a> {
    type Output = bool;
    type Error = AdapterError;

    fn visit_and(&mut self, nodes: &[MatchNode]) -> Result<Self::Output, Self::Error> {
        for node in nodes {
            if !self.visit_node(node)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, nodes: &[MatchNode]) -> Result<Self::Output, Self::Error> {
        for node in nodes {
            if self.visit_node(node)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, operand: &Bson) -> Result<Self::Output, Self::Error> {
        // An absent field never satisfies any operator, negative ones included.
        let Some(value) = self.record.get(field) else {
            return Ok(false);
        };

        Ok(match op {
            FieldOp::Eq => values_equal(value, operand),
            FieldOp::Neq => !values_equal(value, operand),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => matches!(
                (op, Comparable::from(value).partial_cmp(&Comparable::from(operand))),
                (FieldOp::Gt, Some(Ordering::Greater))
                    | (FieldOp::Gte, Some(Ordering::Greater | Ordering::Equal))
                    | (FieldOp::Lt, Some(Ordering::Less))
                    | (FieldOp::Lte, Some(Ordering::Less | Ordering::Equal))
            ),
            FieldOp::In => match operand {
                Bson::Array(values) => contains_value(values, value),
                _ => false,
            },
            FieldOp::Nin => match operand {
                Bson::Array(values) => !contains_value(values, value),
                _ => false,
            },
            FieldOp::All => match (value, operand) {
                (Bson::Array(items), Bson::Array(wanted)) => wanted
                    .iter()
                    .all(|want| contains_value(items, want)),
                _ => false,
            },
            FieldOp::Any => match (value, operand) {
                (Bson::Array(items), Bson::Array(wanted)) => wanted
                    .iter()
                    .any(|want| contains_value(items, want)),
                _ => false,
            },
        })
    }
}
