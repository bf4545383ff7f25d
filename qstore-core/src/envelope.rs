//! The query envelope: the single request object an adapter executes.
//!
//! An envelope names an [`Action`] and a target resource, and carries the optional
//! modifiers that shape what the action touches and returns. Envelopes arrive as
//! JSON documents from whatever transport the caller uses, or are built in code:
//!
//! ```ignore
//! use qstore::{envelope::{Action, Envelope}, query::Match};
//!
//! // From the wire
//! let envelope = Envelope::from_json(serde_json::json!({
//!     "action": "find",
//!     "resource": "supers",
//!     "match": { "speed": { "gte": 10 } },
//!     "select": ["handle"],
//! }))?;
//!
//! // Or with the builder
//! let envelope = Envelope::builder()
//!     .action(Action::Find)
//!     .resource("supers")
//!     .matcher(Match::gte("speed", 10))
//!     .select(["handle"])
//!     .build();
//! ```
//!
//! The `do` and `on` keys are accepted as aliases for `action` and `resource`.

use std::{collections::BTreeMap, fmt};

use bson::{Bson, Document, de::deserialize_from_bson};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    error::AdapterResult,
    query::MatchNode,
    update::UpdateOp,
};

/// The operation an envelope asks for.
///
/// Names the adapter does not handle are kept as [`Action::Unknown`] so the
/// dispatcher can report them instead of failing to parse the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Find,
    Update,
    Remove,
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "create",
            Action::Find => "find",
            Action::Update => "update",
            Action::Remove => "remove",
            Action::Unknown(name) => name,
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "create" => Action::Create,
            "find" => Action::Find,
            "update" => Action::Update,
            "remove" => Action::Remove,
            other => Action::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Action::from(name.as_str()))
    }
}

/// How a populated field resolves its related records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulateSpec {
    /// Nested query to run for the lookup. Its `resource` defaults to the populated
    /// field's name and its `action` is always forced to `find`.
    pub query: Option<Envelope>,
    /// Foreign key on the target resource. When set, related records are those whose
    /// `key` is one of the local field values; otherwise the local values are ids.
    pub key: Option<String>,
}

impl PopulateSpec {
    /// Looks up related records by id in the resource named after the field.
    pub fn by_id() -> Self {
        Self::default()
    }

    /// Looks up related records by a foreign key.
    pub fn by_key(key: impl Into<String>) -> Self {
        Self { query: None, key: Some(key.into()) }
    }

    /// Sets the nested query used for the lookup.
    pub fn with_query(mut self, query: Envelope) -> Self {
        self.query = Some(query);
        self
    }
}

/// A request to execute one action against one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// The operation to perform.
    pub action: Option<Action>,
    /// The target collection name.
    pub resource: Option<String>,
    /// Identifiers of the records to target directly.
    pub ids: Option<Vec<Bson>>,
    /// Payload: records to create, or (first entry) fields to merge on update.
    pub body: Option<Vec<Document>>,
    /// Field-operator instructions applied after the body merge on update.
    pub update: Option<Vec<UpdateOp>>,
    /// Condition restricting the targeted records.
    pub matcher: Option<MatchNode>,
    /// Field projection applied to returned records.
    pub select: Option<Vec<String>>,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
    /// Number of leading results to skip.
    pub offset: Option<usize>,
    /// Fields to enrich with related records.
    pub populate: Option<BTreeMap<String, PopulateSpec>>,
}

impl Envelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// Malformed `match` trees and `update` lists are reported as
    /// [`InvalidQuery`](crate::error::AdapterError::InvalidQuery). Anything else that
    /// fails to decode is a serialization error.
    pub fn from_json(value: Value) -> AdapterResult<Self> {
        serde_json::from_value::<WireEnvelope>(value)?.into_envelope()
    }

    /// Parses an envelope from a BSON document.
    pub fn from_bson(value: Bson) -> AdapterResult<Self> {
        deserialize_from_bson::<WireEnvelope>(value)?.into_envelope()
    }

    /// Whether the envelope targets specific records through `ids` or `match`.
    pub fn is_targeted(&self) -> bool {
        self.ids.is_some() || self.matcher.is_some()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        WireEnvelope::deserialize(deserializer)?
            .into_envelope()
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}

impl<'de> Deserialize<'de> for PopulateSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        WirePopulate::deserialize(deserializer)?
            .into_spec()
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}

/// Envelope as it arrives on the wire, before `match` and `update` are parsed.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEnvelope {
    #[serde(alias = "do")]
    action: Option<Action>,
    #[serde(alias = "on")]
    resource: Option<String>,
    ids: Option<Vec<Bson>>,
    body: Option<Vec<Document>>,
    update: Option<Vec<Document>>,
    #[serde(rename = "match")]
    matcher: Option<Bson>,
    select: Option<Vec<String>>,
    limit: Option<usize>,
    offset: Option<usize>,
    populate: Option<BTreeMap<String, WirePopulate>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePopulate {
    query: Option<Box<WireEnvelope>>,
    key: Option<String>,
}

impl WireEnvelope {
    fn into_envelope(self) -> AdapterResult<Envelope> {
        let update = self
            .update
            .as_deref()
            .map(UpdateOp::from_list)
            .transpose()?;

        let matcher = self
            .matcher
            .as_ref()
            .map(MatchNode::from_bson)
            .transpose()?;

        let populate = self
            .populate
            .map(|fields| {
                fields
                    .into_iter()
                    .map(|(field, spec)| Ok((field, spec.into_spec()?)))
                    .collect::<AdapterResult<BTreeMap<_, _>>>()
            })
            .transpose()?;

        Ok(Envelope {
            action: self.action,
            resource: self.resource,
            ids: self.ids,
            body: self.body,
            update,
            matcher,
            select: self.select,
            limit: self.limit,
            offset: self.offset,
            populate,
        })
    }
}

impl WirePopulate {
    fn into_spec(self) -> AdapterResult<PopulateSpec> {
        Ok(PopulateSpec {
            query: self.query.map(|query| query.into_envelope()).transpose()?,
            key: self.key,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    envelope: Envelope,
}

impl EnvelopeBuilder {
    pub fn action(mut self, action: Action) -> Self {
        self.envelope.action = Some(action);
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.envelope.resource = Some(resource.into());
        self
    }

    pub fn ids<V: Into<Bson>>(mut self, ids: impl IntoIterator<Item = V>) -> Self {
        self.envelope.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn body(mut self, body: impl IntoIterator<Item = Document>) -> Self {
        self.envelope.body = Some(body.into_iter().collect());
        self
    }

    /// Appends an update instruction.
    pub fn update(mut self, op: UpdateOp) -> Self {
        self.envelope
            .update
            .get_or_insert_with(Vec::new)
            .push(op);
        self
    }

    pub fn matcher(mut self, node: MatchNode) -> Self {
        self.envelope.matcher = Some(node);
        self
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.envelope.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.envelope.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.envelope.offset = Some(offset);
        self
    }

    /// Adds a field to populate.
    pub fn populate(mut self, field: impl Into<String>, spec: PopulateSpec) -> Self {
        self.envelope
            .populate
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), spec);
        self
    }

    pub fn build(self) -> Envelope {
        self.envelope
    }
}
