//! Main qstore crate providing a single entry point for executing query envelopes.
//!
//! This crate re-exports the envelope model, the match and update vocabularies and the
//! adapter traits from `qstore-core`, together with the in-memory adapter.
//!
//! # Features
//!
//! - **Query envelopes** - One self-describing value per request: action, resource, targeting and shaping
//! - **Composable matching** - Nested `and`/`or` trees over field operators
//! - **Result shaping** - Pagination and field selection applied uniformly to every action
//! - **Populate** - Related records resolved concurrently through the same dispatcher
//!
//! # Quick Start
//!
//! ```ignore
//! use qstore::{prelude::*, memory::InMemoryAdapter};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = InMemoryAdapter::builder().build().await?;
//!
//!     // Wire-shaped envelopes use the short `do`/`on` keys
//!     adapter
//!         .exec(&Envelope::from_json(json!({
//!             "do": "create",
//!             "on": "supers",
//!             "body": [{ "handle": "Drzzt", "type": "rogue", "power": 5 }]
//!         }))?)
//!         .await?;
//!
//!     // Envelopes can also be built in code
//!     let rogues = adapter
//!         .exec(
//!             &Envelope::builder()
//!                 .action(Action::Find)
//!                 .resource("supers")
//!                 .matcher(Match::eq("type", "rogue"))
//!                 .select(["handle"])
//!                 .build(),
//!         )
//!         .await?;
//!
//!     println!("Rogues: {:?}", rogues);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Populate
//!
//! A `find` can replace reference fields with the records they point at. Each lookup is
//! an ordinary nested `find`, so it may itself select, paginate or populate.
//!
//! ```ignore
//! use qstore::{prelude::*, memory::InMemoryAdapter};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = InMemoryAdapter::builder()
//!         .resource("supers", vec![doc! { "id": 1, "handle": "Drzzt", "powers": [10] }])
//!         .resource("abilities", vec![doc! { "id": "a", "power_id": 10, "name": "stealth" }])
//!         .build()
//!         .await?;
//!
//!     let supers = adapter
//!         .exec(
//!             &Envelope::builder()
//!                 .action(Action::Find)
//!                 .resource("supers")
//!                 .populate(
//!                     "powers",
//!                     PopulateSpec::by_key("power_id")
//!                         .with_query(Envelope::builder().resource("abilities").build()),
//!                 )
//!                 .build(),
//!         )
//!         .await?;
//!
//!     println!("Supers with abilities: {:?}", supers);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Adapters
//!
//! - [`memory`] - Volatile in-memory adapter for development, fixtures and testing

pub mod prelude;

pub use qstore_core::{adapter, envelope, error, query, select, update};

// Re-export BSON types for convenience
pub use bson;

/// In-memory adapter implementation.
pub mod memory {
    pub use qstore_memory::{ID_FIELD, IdPolicy, InMemoryAdapter, InMemoryAdapterBuilder, StoreMap};
}
