//! Repository layer over the legacy relational schema.
//!
//! # Responsibility
//! - Define the scoped persistence contract the store adapter consumes.
//! - Isolate SQLite query details from translation and store logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, duplicates, version
//!   conflicts) in addition to DB transport errors.
//! - Uniqueness, version bumps and timestamps are decided here only.

pub mod data_source_repo;
