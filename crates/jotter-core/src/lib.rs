//! Jotter Core Library
//!
//! This crate provides the data layer for Jotter, a local note-taking
//! application: notes, tags, the links between them, and live queries that
//! keep observers up to date as the data changes.
//!
//! # Architecture
//!
//! - **SQLite**: Single source of truth, with a trigram index for search
//! - **Live queries**: Re-run when a mutation touches the tables they read
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! // Add a note
//! let note = store.insert_note(&Note::with_fields("Plan", "", "Work")).await?;
//!
//! // Follow the list as it changes
//! let controller = SearchController::new(store.clone());
//! let mut notes = controller.notes();
//! controller.set_search_term("plan");
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `models`: Data structures for notes and tags
//! - `live`: Live query handles and change notifications
//! - `search`: Search term controller
//! - `actions`: Queued background mutations
//! - `storage`: SQLite schema and queries
//! - `config`: Application configuration

pub mod actions;
pub mod config;
pub mod live;
pub mod models;
pub mod search;
pub mod storage;
pub mod store;

pub use actions::{NoteActions, Pending};
pub use config::Config;
pub use live::{LiveQuery, QueryState, Subscription, TableSet};
pub use models::{Note, NoteId, NoteTagCrossRef, NoteWithTags, Tag, TagId};
pub use search::{NoteSource, SearchController, SearchSnapshot};
pub use storage::{Database, StoreError, StoreResult};
pub use store::Store;
