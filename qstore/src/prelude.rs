//! Convenient re-exports of commonly used types from qstore.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use qstore::prelude::*;
//! ```

pub use qstore_core::{
    adapter::{QueryAdapter, AdapterBuilder},
    envelope::{Envelope, EnvelopeBuilder, Action, PopulateSpec},
    query::{MatchNode, Match, MatchVisitor, FieldOp},
    update::{UpdateOp, UpdateKind},
    select::Selection,
    error::{AdapterError, AdapterResult, ErrorKind},
};
