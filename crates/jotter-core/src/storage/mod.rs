//! Storage layer
//!
//! SQLite persistence for notes, tags and their associations.
//!
//! ## Architecture
//!
//! - **Database**: Owns the connection and implements every query
//! - **Schema**: Tables, indexes and the trigram search index
//! - **Error**: Failure kinds surfaced to callers
//!
//! The database is synchronous; `Store` wraps it for async callers.

pub mod database;
pub mod error;
pub mod schema;

pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
