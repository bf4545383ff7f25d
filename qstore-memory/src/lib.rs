//! In-memory envelope executor for qstore.
//!
//! This crate provides a thread-safe, volatile implementation of the `QueryAdapter` trait.
//! It keeps every resource as an ordered list of records behind an async-aware read-write
//! lock, and is ideal for development, testing and fixture-driven query layers.
//!
//! # Features
//!
//! - **Envelope dispatch** - `create`, `find`, `update` and `remove` over named resources
//! - **Match trees** - Nested `and`/`or` conditions over field operators
//! - **Result shaping** - `offset`, `limit` and whitelist/blacklist `select`
//! - **Populate** - Concurrent nested lookups that enrich results with related records
//!
//! # Quick Start
//!
//! ```ignore
//! use qstore::{adapter::{AdapterBuilder, QueryAdapter}, envelope::Envelope, memory::InMemoryAdapter};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = InMemoryAdapter::builder().build().await?;
//!
//!     let created = adapter
//!         .exec(&Envelope::from_json(json!({ "do": "create", "on": "bands", "body": [{ "name": "Splergh" }] }))?)
//!         .await?;
//!
//!     let id = created[0].get("id").cloned().unwrap();
//!     let found = adapter
//!         .exec(&Envelope::builder().action(qstore::envelope::Action::Find).resource("bands").ids([id]).build())
//!         .await?;
//!
//!     assert_eq!(found, created);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as qstore_memory;

pub mod store;
pub(crate) mod evaluator;
pub(crate) mod filter;
pub(crate) mod handlers;
pub(crate) mod populate;

pub use evaluator::ID_FIELD;
pub use store::{IdPolicy, InMemoryAdapter, InMemoryAdapterBuilder, StoreMap};
