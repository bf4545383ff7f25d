//! Core types for executing query envelopes against record stores.
//!
//! This crate is the core of the qstore project and provides:
//!
//! - **Envelopes** ([`envelope`]) - The request object: action, resource and modifiers
//! - **Match trees** ([`query`]) - Boolean conditions over record fields, with a visitor
//! - **Update instructions** ([`update`]) - `inc`, `push` and `pull` field operators
//! - **Projection** ([`select`]) - Whitelist/blacklist parsing for returned fields
//! - **Adapter abstraction** ([`adapter`]) - The trait every backend implements
//! - **Error handling** ([`error`]) - Error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use qstore::{adapter::QueryAdapter, envelope::Envelope};
//!
//! async fn handle(adapter: &impl QueryAdapter, wire: serde_json::Value) {
//!     let envelope = Envelope::from_json(wire).unwrap();
//!     let records = adapter.exec(&envelope).await.unwrap();
//!     println!("{records:?}");
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as qstore_core;

pub mod adapter;
pub mod envelope;
pub mod error;
pub mod query;
pub mod select;
pub mod update;
