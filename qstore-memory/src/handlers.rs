//! Action handlers: create, find, update and remove.
//!
//! Each handler builds its [`ResultFilter`] first, so a malformed `select` fails the call
//! before the store is touched. Mutating handlers compute their changes under the write
//! lock and only write back once every record has been processed successfully.

use bson::{Bson, Document};
use tracing::{debug, trace};
use uuid::Uuid;

use qstore_core::{
    envelope::{Action, Envelope},
    error::{AdapterError, AdapterResult},
    update::{UpdateKind, UpdateOp},
};

use crate::{
    evaluator::{ID_FIELD, contains_value, resolve_candidates},
    filter::ResultFilter,
    populate::populate,
    store::{IdPolicy, InMemoryAdapter, display_id, validate_id},
};

impl InMemoryAdapter {
    /// Appends every `body` item to the resource, in order.
    pub(crate) async fn create(&self, resource: &str, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        let filter = ResultFilter::from_envelope(envelope)?;

        let body = match &envelope.body {
            Some(body) if !body.is_empty() => body,
            _ => {
                return Err(AdapterError::InvalidQuery(
                    "create requires a non-empty body".to_string(),
                ));
            }
        };

        let mut store = self.store.write().await;
        let existing = store
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut created: Vec<Document> = Vec::with_capacity(body.len());
        let mut taken: Vec<Bson> = existing
            .iter()
            .filter_map(|record| record.get(ID_FIELD).cloned())
            .collect();

        for item in body {
            let id = match (item.get(ID_FIELD), self.id_policy) {
                (Some(id), IdPolicy::GenerateOnly) => {
                    return Err(AdapterError::RecordAlreadyExists(display_id(id), resource.to_string()));
                }
                (Some(id), IdPolicy::AcceptOrGenerate) => {
                    validate_id(id, resource)?;

                    if contains_value(&taken, id) {
                        return Err(AdapterError::RecordAlreadyExists(display_id(id), resource.to_string()));
                    }

                    id.clone()
                }
                (None, _) => generate_id(&taken),
            };

            let mut record = Document::new();
            record.insert(ID_FIELD, id.clone());

            for (key, value) in item {
                if key != ID_FIELD {
                    record.insert(key.clone(), value.clone());
                }
            }

            taken.push(id);
            created.push(record);
        }

        store
            .entry(resource.to_string())
            .or_default()
            .extend(created.iter().cloned());

        debug!(target: "qstore::memory", resource, count = created.len(), "created records");

        Ok(filter.apply(created))
    }

    /// Reads matching records. Never fails for a missing resource or an empty match.
    pub(crate) async fn find(&self, resource: &str, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        let filter = ResultFilter::from_envelope(envelope)?;

        let records = {
            let store = self.store.read().await;

            let Some(collection) = store.get(resource) else {
                return Ok(Vec::new());
            };

            let candidates = resolve_candidates(
                collection,
                envelope.ids.as_deref(),
                envelope.matcher.as_ref(),
            )?;

            trace!(target: "qstore::memory", resource, candidates = candidates.len(), "resolved find candidates");

            filter.apply(
                candidates
                    .into_iter()
                    .skip(envelope.offset.unwrap_or(0)),
            )
        };

        debug!(target: "qstore::memory", resource, count = records.len(), "found records");

        match &envelope.populate {
            Some(fields) if !fields.is_empty() && !records.is_empty() => {
                populate(self, records, fields).await
            }
            _ => Ok(records),
        }
    }

    /// Merges `body[0]` into every targeted record, then applies `update` instructions.
    pub(crate) async fn update(&self, resource: &str, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        let filter = ResultFilter::from_envelope(envelope)?;

        if !envelope.is_targeted() {
            return Err(AdapterError::MissingTarget(Action::Update));
        }

        let mut store = self.store.write().await;

        let Some(collection) = store.get_mut(resource) else {
            return Err(AdapterError::NotFound(Action::Update, resource.to_string()));
        };

        let targets = resolve_candidates(
            collection,
            envelope.ids.as_deref(),
            envelope.matcher.as_ref(),
        )?
        .into_iter()
        .map(|candidate| (candidate.index, candidate.record.clone()))
        .collect::<Vec<_>>();

        if targets.is_empty() {
            return Err(AdapterError::NotFound(Action::Update, resource.to_string()));
        }

        let changes = envelope
            .body
            .as_ref()
            .and_then(|body| body.first());
        let ops = envelope.update.as_deref().unwrap_or_default();

        let mut updated = Vec::with_capacity(targets.len());

        for (index, mut record) in targets {
            if let Some(changes) = changes {
                merge(&mut record, changes);
            }

            for op in ops {
                apply_update(&mut record, op)?;
            }

            updated.push((index, record));
        }

        for (index, record) in &updated {
            collection[*index] = record.clone();
        }

        debug!(target: "qstore::memory", resource, count = updated.len(), "updated records");

        Ok(filter.apply(updated.into_iter().map(|(_, record)| record)))
    }

    /// Deletes every targeted record and returns them.
    pub(crate) async fn remove(&self, resource: &str, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        let filter = ResultFilter::from_envelope(envelope)?;

        if !envelope.is_targeted() {
            return Err(AdapterError::MissingTarget(Action::Remove));
        }

        let mut store = self.store.write().await;

        let Some(collection) = store.get_mut(resource) else {
            return Ok(Vec::new());
        };

        let positions = resolve_candidates(
            collection,
            envelope.ids.as_deref(),
            envelope.matcher.as_ref(),
        )?
        .iter()
        .map(|candidate| candidate.index)
        .collect::<Vec<_>>();

        // Positions ascend; each removal shifts the later ones left by one.
        let mut removed = Vec::with_capacity(positions.len());
        for (already_removed, position) in positions.into_iter().enumerate() {
            removed.push(collection.remove(position - already_removed));
        }

        debug!(target: "qstore::memory", resource, count = removed.len(), "removed records");

        Ok(filter.apply(removed))
    }
}

fn generate_id(taken: &[Bson]) -> Bson {
    loop {
        let id = Bson::String(Uuid::new_v4().simple().to_string());

        if !contains_value(taken, &id) {
            return id;
        }
    }
}

/// Overwrites fields of `record` with those of `changes`. The id is immutable.
fn merge(record: &mut Document, changes: &Document) {
    for (key, value) in changes {
        if key != ID_FIELD {
            record.insert(key.clone(), value.clone());
        }
    }
}

fn apply_update(record: &mut Document, op: &UpdateOp) -> AdapterResult<()> {
    let field = op.field.as_str();

    if field == ID_FIELD {
        return Err(AdapterError::InvalidQuery("record id cannot be updated".to_string()));
    }

    match &op.kind {
        UpdateKind::Inc(delta) => {
            let current = record.get(field).cloned().unwrap_or(Bson::Int32(0));
            let sum = add_numbers(&current, delta).ok_or_else(|| {
                AdapterError::InvalidQuery(format!(
                    "inc on field '{field}' requires numeric values, got {current} and {delta}"
                ))
            })?;

            record.insert(field, sum);
        }
        UpdateKind::Push(value) => {
            let values = match value {
                Bson::Array(values) => values.clone(),
                other => vec![other.clone()],
            };

            match record.get_mut(field) {
                Some(Bson::Array(items)) => items.extend(values),
                Some(_) => {
                    return Err(AdapterError::InvalidQuery(format!(
                        "push on field '{field}' requires an array field"
                    )));
                }
                None => {
                    record.insert(field, Bson::Array(values));
                }
            }
        }
        UpdateKind::Pull(value) => {
            let values = match value {
                Bson::Array(values) => values.clone(),
                other => vec![other.clone()],
            };

            match record.get_mut(field) {
                Some(Bson::Array(items)) => items.retain(|item| !contains_value(&values, item)),
                Some(_) => {
                    return Err(AdapterError::InvalidQuery(format!(
                        "pull on field '{field}' requires an array field"
                    )));
                }
                None => {}
            }
        }
    }

    Ok(())
}

/// Adds two numeric values, keeping integers integral and widening on overflow.
fn add_numbers(left: &Bson, right: &Bson) -> Option<Bson> {
    fn as_i64(value: &Bson) -> Option<i64> {
        match value {
            Bson::Int32(value) => Some(i64::from(*value)),
            Bson::Int64(value) => Some(*value),
            _ => None,
        }
    }

    fn as_f64(value: &Bson) -> Option<f64> {
        match value {
            Bson::Double(value) => Some(*value),
            other => as_i64(other).map(|value| value as f64),
        }
    }

    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        }),
        _ => match (as_i64(left), as_i64(right)) {
            (Some(a), Some(b)) => Some(match a.checked_add(b) {
                Some(sum) => Bson::Int64(sum),
                None => Bson::Double(a as f64 + b as f64),
            }),
            _ => Some(Bson::Double(as_f64(left)? + as_f64(right)?)),
        },
    }
}
