//! In-memory record store and envelope dispatcher.
//!
//! This module provides the adapter that owns the collections, validates incoming
//! envelopes and routes them to the action handlers.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use tracing::debug;

use qstore_core::{
    adapter::{AdapterBuilder, QueryAdapter},
    envelope::{Action, Envelope},
    error::{AdapterError, AdapterResult},
};

use crate::evaluator::{ID_FIELD, contains_value};

/// Ordered records of a single resource.
pub type Collection = Vec<Document>;
/// The main storage map: resource name -> ordered records.
pub type StoreMap = HashMap<String, Collection>;


/// How `create` treats an `id` supplied by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdPolicy {
    /// Keep a client id when present (it must not collide), generate one otherwise.
    #[default]
    AcceptOrGenerate,
    /// Always generate ids; a client-supplied id is reported as a conflict.
    GenerateOnly,
}


/// Thread-safe in-memory envelope executor.
///
/// This struct implements the [`QueryAdapter`] trait on top of an ordered record list per
/// resource. Resources are created implicitly by the first `create` against them.
///
/// # Thread Safety
///
/// `InMemoryAdapter` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Clones of the same instance share the
/// same underlying data; separately built adapters never do.
///
/// Mutating actions hold the write lock for their whole read-then-write step, so each
/// call is atomic with respect to the store. `find` releases its read lock before
/// populating, and every nested lookup takes its own.
///
/// # Example
///
/// ```ignore
/// use qstore_memory::InMemoryAdapter;
/// use qstore::{adapter::{AdapterBuilder, QueryAdapter}, envelope::Envelope};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let adapter = InMemoryAdapter::builder()
///         .resource("bands", vec![doc! { "id": 1, "name": "Splergh" }])
///         .build()
///         .await?;
///
///     let envelope = Envelope::from_json(serde_json::json!({ "do": "find", "on": "bands", "ids": [1] }))?;
///     let bands = adapter.exec(&envelope).await?;
///     assert_eq!(bands.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryAdapter {
    pub(crate) store: Arc<RwLock<StoreMap>>,
    pub(crate) id_policy: IdPolicy,
}

impl InMemoryAdapter {
    /// Creates a new adapter with no resources and the default [`IdPolicy`].
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            id_policy: IdPolicy::default(),
        }
    }

    /// Creates a builder for constructing an `InMemoryAdapter` with custom options.
    pub fn builder() -> InMemoryAdapterBuilder {
        InMemoryAdapterBuilder::default()
    }

    /// Returns the policy `create` applies to client-supplied ids.
    pub fn id_policy(&self) -> IdPolicy {
        self.id_policy
    }

    /// Replaces every resource with the given collections.
    ///
    /// The new collections are validated like builder fixtures; on error the current
    /// store is left untouched.
    pub async fn replace_store(&self, store: StoreMap) -> AdapterResult<()> {
        validate_store(&store)?;

        *self.store.write().await = store;

        Ok(())
    }

    /// Lists the names of all resources created so far.
    pub async fn resources(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }
}


#[async_trait]
impl QueryAdapter for InMemoryAdapter {
    async fn exec(&self, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        let (Some(action), Some(resource)) = (
            envelope.action.as_ref(),
            envelope.resource.as_deref().filter(|resource| !resource.is_empty()),
        ) else {
            return Err(AdapterError::InvalidQuery(
                "envelope requires both action and resource".to_string(),
            ));
        };

        debug!(target: "qstore::memory", %action, resource, "executing envelope");

        match action {
            Action::Create => self.create(resource, envelope).await,
            Action::Find => self.find(resource, envelope).await,
            Action::Update => self.update(resource, envelope).await,
            Action::Remove => self.remove(resource, envelope).await,
            Action::Unknown(name) => Err(AdapterError::NoMatchingAction(name.clone())),
        }
    }
}


/// Renders a record id for error messages.
pub(crate) fn display_id(id: &Bson) -> String {
    match id {
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// Checks that `id` is a usable record identifier: a non-empty string or a number.
pub(crate) fn validate_id(id: &Bson, resource: &str) -> AdapterResult<()> {
    match id {
        Bson::String(id) if !id.is_empty() => Ok(()),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(()),
        other => Err(AdapterError::InvalidRecord(format!(
            "id {other} in resource {resource} must be a non-empty string or a number"
        ))),
    }
}

fn validate_store(store: &StoreMap) -> AdapterResult<()> {
    for (resource, records) in store {
        let mut seen: Vec<Bson> = Vec::with_capacity(records.len());

        for record in records {
            let id = record.get(ID_FIELD).ok_or_else(|| {
                AdapterError::InvalidRecord(format!("record in resource {resource} has no id"))
            })?;

            validate_id(id, resource)?;

            if contains_value(&seen, id) {
                return Err(AdapterError::RecordAlreadyExists(display_id(id), resource.clone()));
            }

            seen.push(id.clone());
        }
    }

    Ok(())
}


/// Builder for constructing [`InMemoryAdapter`] instances.
///
/// # Example
///
/// ```ignore
/// use qstore_memory::{InMemoryAdapter, IdPolicy};
/// use qstore::adapter::AdapterBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let adapter = InMemoryAdapter::builder()
///         .id_policy(IdPolicy::GenerateOnly)
///         .build()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryAdapterBuilder {
    id_policy: IdPolicy,
    resources: StoreMap,
}

impl InMemoryAdapterBuilder {
    /// Sets the policy `create` applies to client-supplied ids.
    pub fn id_policy(mut self, id_policy: IdPolicy) -> Self {
        self.id_policy = id_policy;
        self
    }

    /// Seeds a resource with fixture records, replacing any earlier seed of the same name.
    pub fn resource(mut self, name: impl Into<String>, records: impl IntoIterator<Item = Document>) -> Self {
        self.resources
            .insert(name.into(), records.into_iter().collect());
        self
    }
}

#[async_trait]
impl AdapterBuilder for InMemoryAdapterBuilder {
    type Adapter = InMemoryAdapter;

    /// Builds the adapter.
    ///
    /// Fails when a seeded record has no usable `id` or two records of one resource
    /// share an id.
    async fn build(self) -> AdapterResult<Self::Adapter> {
        validate_store(&self.resources)?;

        debug!(target: "qstore::memory", resources = self.resources.len(), "building in-memory adapter");

        Ok(InMemoryAdapter {
            store: Arc::new(RwLock::new(self.resources)),
            id_policy: self.id_policy,
        })
    }
}
