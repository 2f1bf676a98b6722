//! Nexus Storage - Repository Traits and In-Memory Implementation
//!
//! Persistence for the registry is abstracted behind async repository
//! traits; the service layer never sees SQL. This crate ships the trait
//! contracts plus a complete in-memory implementation backed by
//! `tokio::sync` primitives, used by tests and single-node deployments.
//!
//! The contracts encode the two serialization points the service layer
//! relies on: agent status writes are compare-and-set on `(id, status)`,
//! and ledger appends are globally serialized.

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;
