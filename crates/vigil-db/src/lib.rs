//! Event log and face identity store.
//!
//! This crate provides:
//! - Append-only event timeline with attendance aggregation
//! - Registered identities with canonical and auxiliary embedding samples
//! - Unknown face clusters with atomic assign-or-create
//! - Dimension checks that drop corrupt embedding rows on read

pub mod error;
pub mod schema;
pub mod store;

pub use error::{DbError, DbResult};
pub use store::{ClusterChoice, EventStore, Registration, UnknownAssignment};
