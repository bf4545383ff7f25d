//! Relational enrichment of `find` results.
//!
//! For every (record, populated field) pair a nested `find` is issued back through the
//! adapter's dispatcher. All lookups run concurrently and are joined before any record
//! is touched; the first failure aborts the join and drops the lookups still in flight.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use futures::future::try_join_all;
use tracing::warn;

use qstore_core::{
    adapter::QueryAdapter,
    envelope::{Action, Envelope, PopulateSpec},
    error::{AdapterError, AdapterResult},
    query::Match,
};

/// Replaces each populated field of `records` with the array of records it refers to.
///
/// `records` is the caller's own copy of the result set, so the store is never mutated.
/// Records lacking a populated field are left as they are.
pub(crate) async fn populate<A>(
    adapter: &A,
    mut records: Vec<Document>,
    fields: &BTreeMap<String, PopulateSpec>,
) -> AdapterResult<Vec<Document>>
where
    A: QueryAdapter + ?Sized,
{
    let mut lookups = Vec::new();

    for (position, record) in records.iter().enumerate() {
        for (field, spec) in fields {
            let Some(local) = record.get(field) else {
                continue;
            };

            let nested = nested_query(field, spec, local);

            lookups.push(async move {
                match adapter.exec(&nested).await {
                    Ok(found) => Ok((position, field, found)),
                    Err(err) => {
                        warn!(target: "qstore::memory", field = %field, error = %err, "populate lookup failed");
                        Err(AdapterError::population(field.as_str(), err))
                    }
                }
            });
        }
    }

    for (position, field, found) in try_join_all(lookups).await? {
        records[position].insert(
            field.as_str(),
            Bson::Array(found.into_iter().map(Bson::Document).collect()),
        );
    }

    Ok(records)
}

/// Builds the `find` that resolves one populated field of one record.
fn nested_query(field: &str, spec: &PopulateSpec, local: &Bson) -> Envelope {
    let values = match local {
        Bson::Array(values) => values.clone(),
        other => vec![other.clone()],
    };

    let mut nested = spec.query.clone().unwrap_or_default();
    nested.action = Some(Action::Find);

    if nested.resource.is_none() {
        nested.resource = Some(field.to_string());
    }

    match &spec.key {
        Some(key) => {
            let foreign = Match::is_in(key.as_str(), values);

            nested.matcher = Some(match nested.matcher.take() {
                Some(existing) => existing.and(foreign),
                None => foreign,
            });
        }
        None => nested.ids = Some(values),
    }

    nested
}
