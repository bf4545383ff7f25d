//! Adapter abstraction: the uniform data-access contract envelopes are executed against.
//!
//! A higher-level query layer only ever talks to a [`QueryAdapter`]. Adapters accept an
//! [`Envelope`] and yield the resulting records, or an
//! [`AdapterError`](crate::error::AdapterError) describing why the envelope could not
//! be executed.
//!
//! # Examples
//!
//! ```ignore
//! use qstore::{adapter::QueryAdapter, envelope::Envelope};
//!
//! let envelope = Envelope::from_json(serde_json::json!({ "do": "find", "on": "bands" }))?;
//!
//! // Await the result directly
//! let bands = adapter.exec(&envelope).await?;
//!
//! // Or hand it to a completion callback
//! adapter
//!     .exec_with(&envelope, |result| match result {
//!         Ok(records) => println!("{} bands", records.len()),
//!         Err(err) => eprintln!("{err}"),
//!     })
//!     .await;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{envelope::Envelope, error::AdapterResult};

/// Executes query envelopes against a set of named resources.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and tolerate concurrent calls. Each call is
/// atomic with respect to the resource it mutates; nothing stronger is promised.
///
/// # Completion
///
/// Every call completes exactly once, either with records or with an error. Errors are
/// never partial: an envelope that fails leaves no observable result.
#[async_trait]
pub trait QueryAdapter: Send + Sync + Debug {
    /// Validates the envelope and routes it to the handler for its action.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` when `action` or `resource` is missing or a modifier is malformed
    /// - `NoMatchingAction` when the action has no handler
    /// - handler-specific targeting, conflict and population errors
    async fn exec(&self, envelope: &Envelope) -> AdapterResult<Vec<Document>>;

    /// Executes the envelope and delivers the outcome to `callback`.
    ///
    /// The callback is invoked exactly once.
    async fn exec_with<F>(&self, envelope: &Envelope, callback: F)
    where
        F: FnOnce(AdapterResult<Vec<Document>>) + Send,
        Self: Sized,
    {
        callback(self.exec(envelope).await)
    }
}

#[async_trait]
impl<A> QueryAdapter for &A
where
    A: QueryAdapter,
{
    async fn exec(&self, envelope: &Envelope) -> AdapterResult<Vec<Document>> {
        (*self).exec(envelope).await
    }
}

#[async_trait]
pub trait AdapterBuilder {
    type Adapter: QueryAdapter;

    async fn build(self) -> AdapterResult<Self::Adapter>;
}
