//! Datasource models for both sides of the store adapter.
//!
//! # Responsibility
//! - `legacy`: the flat, org-scoped row shape owned by the SQL layer.
//! - `resource`: the name/resource-version shape handed to generic callers.
//!
//! # Invariants
//! - Both sides share one settings representation, [`legacy::SettingsMap`].

pub mod legacy;
pub mod resource;
