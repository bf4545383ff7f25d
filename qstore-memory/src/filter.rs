//! Result shaping: squash, limit, select.
//!
//! Every handler passes its output through a [`ResultFilter`] exactly once. The filter
//! is built before the handler touches the store so that a malformed `select` fails the
//! call without side effects.

use bson::Document;

use qstore_core::{envelope::Envelope, error::AdapterResult, select::Selection};

use crate::evaluator::IndexedRecord;

/// Collapses an engine-internal wrapper back to the plain record.
pub(crate) trait Squash {
    fn squash(self) -> Document;
}

impl Squash for Document {
    fn squash(self) -> Document {
        self
    }
}

impl<'a> Squash for IndexedRecord<'a> {
    fn squash(self) -> Document {
        self.record.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ResultFilter {
    limit: Option<usize>,
    selection: Option<Selection>,
}

impl ResultFilter {
    pub fn from_envelope(envelope: &Envelope) -> AdapterResult<Self> {
        let selection = match &envelope.select {
            Some(fields) => Selection::parse(fields)?,
            None => None,
        };

        Ok(Self { limit: envelope.limit, selection })
    }

    /// Squashes, truncates to `limit`, then projects each record.
    pub fn apply<R: Squash>(&self, records: impl IntoIterator<Item = R>) -> Vec<Document> {
        records
            .into_iter()
            .map(Squash::squash)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|record| match &self.selection {
                Some(selection) => selection.apply(record),
                None => record,
            })
            .collect()
    }
}
