//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed entities and row slices returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `rsvp_importer::db`; the repository
//! API and commonly used models are re-exported here for convenience.
//!
//! Every write here is a natural-key upsert: look the row up by its composite
//! key, update the mutable fields in place if found, insert otherwise, and
//! return the row id either way. Re-running an import pass with identical
//! vendor data therefore resolves to the same ids.

pub mod model;
pub mod repo;

pub use model::{EventRow, NewEvent, UserCredential};
pub use repo::*;
