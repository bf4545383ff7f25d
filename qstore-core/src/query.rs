//! Match trees: the boolean conditions an envelope uses to target records.
//!
//! A [`MatchNode`] is either a combinator over child nodes or a single field test.
//! On the wire a node is a map:
//!
//! ```text
//! { "and": [ ... ] }                 // every child must hold
//! { "or":  [ ... ] }                 // at least one child must hold
//! { "speed": { "gte": 10 } }         // field test
//! ```
//!
//! A map naming several fields, or several operators for one field, is read as the
//! conjunction of those tests.
//!
//! # Building matches in code
//!
//! ```ignore
//! use qstore::query::Match;
//!
//! let node = Match::or([
//!     Match::and([Match::gt("speed", 8), Match::gte("power", 8)]),
//!     Match::eq("type", "wizard"),
//! ]);
//! ```
//!
//! Backends evaluate or translate trees through the [`MatchVisitor`] trait.

use std::{fmt, str::FromStr};

use bson::Bson;
use serde::Deserialize;

use crate::error::{AdapterError, AdapterResult};

/// Field comparison operators for match trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Strictly equal.
    Eq,
    /// Not strictly equal.
    Neq,
    /// Value is a member of the operand array.
    In,
    /// Value is not a member of the operand array.
    Nin,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Array value contains every element of the operand array.
    All,
    /// Array value contains at least one element of the operand array.
    Any,
}

impl FieldOp {
    /// Returns the wire name of this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOp::Eq => "eq",
            FieldOp::Neq => "neq",
            FieldOp::In => "in",
            FieldOp::Nin => "nin",
            FieldOp::Gt => "gt",
            FieldOp::Gte => "gte",
            FieldOp::Lt => "lt",
            FieldOp::Lte => "lte",
            FieldOp::All => "all",
            FieldOp::Any => "any",
        }
    }

    /// Whether the operand of this operator must be an array.
    pub fn takes_array(&self) -> bool {
        matches!(self, FieldOp::In | FieldOp::Nin | FieldOp::All | FieldOp::Any)
    }
}

impl FromStr for FieldOp {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => FieldOp::Eq,
            "neq" => FieldOp::Neq,
            "in" => FieldOp::In,
            "nin" => FieldOp::Nin,
            "gt" => FieldOp::Gt,
            "gte" => FieldOp::Gte,
            "lt" => FieldOp::Lt,
            "lte" => FieldOp::Lte,
            "all" => FieldOp::All,
            "any" => FieldOp::Any,
            other => {
                return Err(AdapterError::InvalidQuery(format!(
                    "unknown match operator '{other}'"
                )));
            }
        })
    }
}

impl fmt::Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of a match tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Bson")]
pub enum MatchNode {
    /// Holds when no child fails. Empty is vacuously true.
    And(Vec<MatchNode>),
    /// Holds when at least one child holds. Empty is vacuously false.
    Or(Vec<MatchNode>),
    /// Compares a single record field against an operand.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        operand: Bson,
    },
}

impl MatchNode {
    /// Creates a field test node.
    pub fn field(field: impl Into<String>, op: FieldOp, operand: impl Into<Bson>) -> Self {
        MatchNode::Field {
            field: field.into(),
            op,
            operand: operand.into(),
        }
    }

    /// Combines this node with another using logical AND.
    ///
    /// If this node is already an AND, the other node is appended to it.
    pub fn and(self, other: MatchNode) -> Self {
        match self {
            MatchNode::And(mut list) => {
                list.push(other);
                MatchNode::And(list)
            }
            _ => MatchNode::And(vec![self, other]),
        }
    }

    /// Combines this node with another using logical OR.
    ///
    /// If this node is already an OR, the other node is appended to it.
    pub fn or(self, other: MatchNode) -> Self {
        match self {
            MatchNode::Or(mut list) => {
                list.push(other);
                MatchNode::Or(list)
            }
            _ => MatchNode::Or(vec![self, other]),
        }
    }

    /// Parses a node from its wire representation.
    pub fn from_bson(value: &Bson) -> AdapterResult<Self> {
        let map = value
            .as_document()
            .ok_or_else(|| AdapterError::InvalidQuery("match node must be a map".to_string()))?;

        let mut nodes = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "and" => nodes.push(MatchNode::And(Self::children(key, value)?)),
                "or" => nodes.push(MatchNode::Or(Self::children(key, value)?)),
                field => {
                    let tests = value.as_document().ok_or_else(|| {
                        AdapterError::InvalidQuery(format!(
                            "match on field '{field}' must map operators to operands"
                        ))
                    })?;

                    if tests.is_empty() {
                        return Err(AdapterError::InvalidQuery(format!(
                            "match on field '{field}' has no operator"
                        )));
                    }

                    for (op, operand) in tests {
                        let op = op.parse::<FieldOp>()?;

                        if op.takes_array() && operand.as_array().is_none() {
                            return Err(AdapterError::InvalidQuery(format!(
                                "operator '{op}' on field '{field}' requires an array operand"
                            )));
                        }

                        nodes.push(MatchNode::field(field, op, operand.clone()));
                    }
                }
            }
        }

        match nodes.len() {
            0 => Err(AdapterError::InvalidQuery("match node is empty".to_string())),
            1 => Ok(nodes.remove(0)),
            _ => Ok(MatchNode::And(nodes)),
        }
    }

    fn children(combinator: &str, value: &Bson) -> AdapterResult<Vec<MatchNode>> {
        value
            .as_array()
            .ok_or_else(|| {
                AdapterError::InvalidQuery(format!("'{combinator}' expects a list of match nodes"))
            })?
            .iter()
            .map(MatchNode::from_bson)
            .collect()
    }
}

impl TryFrom<Bson> for MatchNode {
    type Error = AdapterError;

    fn try_from(value: Bson) -> Result<Self, Self::Error> {
        MatchNode::from_bson(&value)
    }
}

/// Helper struct for constructing match nodes.
///
/// All methods accept field names as `Into<String>` and operands as `Into<Bson>`.
pub struct Match;

impl Match {
    /// Matches records where the field strictly equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Eq, value)
    }

    /// Matches records where the field is present and differs from the value.
    pub fn neq(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Neq, value)
    }

    /// Matches records where the field is one of the values.
    pub fn is_in<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> MatchNode {
        MatchNode::field(field, FieldOp::In, Self::array(values))
    }

    /// Matches records where the field is none of the values.
    pub fn not_in<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> MatchNode {
        MatchNode::field(field, FieldOp::Nin, Self::array(values))
    }

    /// Matches records where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Gt, value)
    }

    /// Matches records where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Gte, value)
    }

    /// Matches records where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Lt, value)
    }

    /// Matches records where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> MatchNode {
        MatchNode::field(field, FieldOp::Lte, value)
    }

    /// Matches records whose array field contains every one of the values.
    pub fn all<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> MatchNode {
        MatchNode::field(field, FieldOp::All, Self::array(values))
    }

    /// Matches records whose array field contains at least one of the values.
    pub fn any<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> MatchNode {
        MatchNode::field(field, FieldOp::Any, Self::array(values))
    }

    /// Combines nodes so that all must hold.
    pub fn and(nodes: impl IntoIterator<Item = MatchNode>) -> MatchNode {
        MatchNode::And(nodes.into_iter().collect())
    }

    /// Combines nodes so that any may hold.
    pub fn or(nodes: impl IntoIterator<Item = MatchNode>) -> MatchNode {
        MatchNode::Or(nodes.into_iter().collect())
    }

    fn array<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
        Bson::Array(values.into_iter().map(Into::into).collect())
    }
}

pub trait MatchVisitor {
    type Output;
    type Error: Into<AdapterError>;

    fn visit_and(&mut self, nodes: &[MatchNode]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, nodes: &[MatchNode]) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        operand: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_node(&mut self, node: &MatchNode) -> Result<Self::Output, Self::Error> {
        match node {
            MatchNode::And(nodes) => self.visit_and(nodes),
            MatchNode::Or(nodes) => self.visit_or(nodes),
            MatchNode::Field { field, op, operand } => self.visit_field(field, op, operand),
        }
    }
}
