//! Unified storage interface
//!
//! The `Store` is a cheaply clonable handle on the note database. Every
//! database access runs on the blocking thread pool behind a single
//! connection lock, and every committed mutation broadcasts the tables it
//! touched so live queries can refresh.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! // Mutate
//! let note = store.insert_note(&Note::new("Groceries")).await?;
//!
//! // Observe
//! let mut notes = store.get_all_notes();
//! let latest = notes.next_ready().await?;
//! ```

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, OnceCell};
use tracing::debug;

use crate::config::Config;
use crate::live::{ChangeSender, LiveQuery, TableSet, CHANGE_CHANNEL_CAPACITY};
use crate::models::{Note, NoteId, NoteTagCrossRef, NoteWithTags, Tag, TagId};
use crate::storage::{Database, StoreError, StoreResult};

/// Process-wide store, created on first use
static SHARED: OnceCell<Store> = OnceCell::const_new();

/// Unified storage interface for Jotter
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// The single database connection
    db: Mutex<Database>,
    /// Table-change notifications for live queries
    changes: ChangeSender,
    /// Configuration
    config: Config,
}

impl Store {
    /// Open the store using the default configuration file
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config).context("Failed to open note database")
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> StoreResult<Self> {
        let path = config.sqlite_path();
        let db = Database::open(&path)?.with_default_title(config.default_title.clone());
        debug!(path = %path.display(), "opened note database");
        Ok(Self::from_database(db, config))
    }

    /// Open a store backed by an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let config = Config::default();
        let db = Database::open_in_memory()?.with_default_title(config.default_title.clone());
        Ok(Self::from_database(db, config))
    }

    fn from_database(db: Database, config: Config) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                db: Mutex::new(db),
                changes,
                config,
            }),
        }
    }

    /// Get the process-wide store, opening it on first call
    ///
    /// Concurrent first callers wait for the same initialization, so only
    /// one database handle is ever created. `config` is ignored once the
    /// store exists.
    pub async fn instance(config: &Config) -> StoreResult<&'static Store> {
        SHARED
            .get_or_try_init(|| async { Store::open_with_config(config.clone()) })
            .await
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether two handles refer to the same underlying store
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ==================== Note Operations ====================

    /// Insert a note and return it with its assigned id and timestamps
    pub async fn insert_note(&self, note: &Note) -> StoreResult<Note> {
        let note = note.clone();
        self.write(TableSet::NOTES, move |db| db.insert_note(&note))
            .await
    }

    /// Update an existing note
    pub async fn update_note(&self, note: &Note) -> StoreResult<Note> {
        let note = note.clone();
        self.write(TableSet::NOTES, move |db| db.update_note(&note))
            .await
    }

    /// Insert when the note is unsaved (id 0), otherwise update
    pub async fn upsert_note(&self, note: &Note) -> StoreResult<Note> {
        if note.is_saved() {
            self.update_note(note).await
        } else {
            self.insert_note(note).await
        }
    }

    /// Delete a note and its tag links
    pub async fn delete_note(&self, note: &Note) -> StoreResult<bool> {
        self.delete_note_by_id(note.id).await
    }

    /// Delete a note by id and its tag links
    pub async fn delete_note_by_id(&self, id: NoteId) -> StoreResult<bool> {
        self.write(TableSet::NOTES | TableSet::NOTE_TAGS, move |db| {
            db.delete_note_by_id(id)
        })
        .await
    }

    /// Get a note by id
    pub async fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>> {
        self.read(move |db| db.get_note_by_id(id)).await
    }

    /// Get a note with its tags
    pub async fn get_note_with_tags(&self, id: NoteId) -> StoreResult<Option<NoteWithTags>> {
        self.read(move |db| db.get_note_with_tags(id)).await
    }

    /// Get count of notes
    pub async fn note_count(&self) -> StoreResult<i64> {
        self.read(|db| db.note_count()).await
    }

    // ==================== Live Note Queries ====================

    /// All notes, most recently updated first
    pub fn get_all_notes(&self) -> LiveQuery<Vec<Note>> {
        self.live(TableSet::NOTES, |db| db.get_all_notes())
    }

    /// Notes whose title, content or category contains `term`
    pub fn search_notes(&self, term: &str) -> LiveQuery<Vec<Note>> {
        let term = term.to_string();
        self.live(TableSet::NOTES, move |db| db.search_notes(&term))
    }

    /// All notes with their tags
    pub fn get_all_notes_with_tags(&self) -> LiveQuery<Vec<NoteWithTags>> {
        self.live(TableSet::NOTES_WITH_TAGS, |db| db.get_all_notes_with_tags())
    }

    /// Matching notes with their tags
    pub fn search_notes_with_tags(&self, term: &str) -> LiveQuery<Vec<NoteWithTags>> {
        let term = term.to_string();
        self.live(TableSet::NOTES_WITH_TAGS, move |db| {
            db.search_notes_with_tags(&term)
        })
    }

    /// Notes linked to a tag
    pub fn get_notes_with_tag(&self, tag_id: TagId) -> LiveQuery<Vec<Note>> {
        self.live(TableSet::NOTES | TableSet::NOTE_TAGS, move |db| {
            db.get_notes_with_tag(tag_id)
        })
    }

    /// Notes in a category
    pub fn get_notes_in_category(&self, category: &str) -> LiveQuery<Vec<Note>> {
        let category = category.to_string();
        self.live(TableSet::NOTES, move |db| {
            db.get_notes_in_category(&category)
        })
    }

    // ==================== Tag Operations ====================

    /// Insert a tag and return it with its assigned id
    pub async fn insert_tag(&self, tag: &Tag) -> StoreResult<Tag> {
        let tag = tag.clone();
        self.write(TableSet::TAGS, move |db| db.insert_tag(&tag)).await
    }

    /// Update a tag's name and color
    pub async fn update_tag(&self, tag: &Tag) -> StoreResult<Tag> {
        let tag = tag.clone();
        self.write(TableSet::TAGS, move |db| db.update_tag(&tag)).await
    }

    /// Delete a tag and every link to it
    pub async fn delete_tag(&self, tag: &Tag) -> StoreResult<bool> {
        self.delete_tag_by_id(tag.id).await
    }

    /// Delete a tag by id and every link to it
    pub async fn delete_tag_by_id(&self, id: TagId) -> StoreResult<bool> {
        self.write(TableSet::TAGS | TableSet::NOTE_TAGS, move |db| {
            db.delete_tag_by_id(id)
        })
        .await
    }

    /// Get a tag by id
    pub async fn get_tag_by_id(&self, id: TagId) -> StoreResult<Option<Tag>> {
        self.read(move |db| db.get_tag_by_id(id)).await
    }

    /// Get a tag by name
    pub async fn get_tag_by_name(&self, name: &str) -> StoreResult<Option<Tag>> {
        let name = name.to_string();
        self.read(move |db| db.get_tag_by_name(&name)).await
    }

    /// Get tags linked to a note
    pub async fn get_tags_for_note(&self, note_id: NoteId) -> StoreResult<Vec<Tag>> {
        self.read(move |db| db.get_tags_for_note(note_id)).await
    }

    /// Get tags with usage counts
    pub async fn get_tags_with_counts(&self) -> StoreResult<Vec<(Tag, i64)>> {
        self.read(|db| db.get_tags_with_counts()).await
    }

    /// Get count of tags
    pub async fn tag_count(&self) -> StoreResult<i64> {
        self.read(|db| db.tag_count()).await
    }

    /// All tags, by name
    pub fn get_all_tags(&self) -> LiveQuery<Vec<Tag>> {
        self.live(TableSet::TAGS, |db| db.get_all_tags())
    }

    // ==================== Tag Links ====================

    /// Link a note to a tag; returns `false` if already linked
    pub async fn insert_note_tag_cross_ref(&self, cross_ref: NoteTagCrossRef) -> StoreResult<bool> {
        self.write(TableSet::NOTE_TAGS, move |db| {
            db.insert_note_tag_cross_ref(cross_ref)
        })
        .await
    }

    /// Unlink a note from a tag; returns `false` if not linked
    pub async fn delete_note_tag_cross_ref(&self, cross_ref: NoteTagCrossRef) -> StoreResult<bool> {
        self.write(TableSet::NOTE_TAGS, move |db| {
            db.delete_note_tag_cross_ref(cross_ref)
        })
        .await
    }

    // ==================== Private helpers ====================

    /// Run a read on the blocking pool
    async fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner.db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&db)
        })
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
    }

    /// Run a mutation on the blocking pool and announce the touched tables
    ///
    /// The announcement is sent before the lock is released, so refetches
    /// always observe the committed state.
    async fn write<T, F>(&self, tables: TableSet, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut db = inner.db.lock().map_err(|_| StoreError::Poisoned)?;
            let result = f(&mut db);
            if result.is_ok() {
                // No receivers just means no live queries are running.
                let _ = inner.changes.send(tables);
            }
            result
        })
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
    }

    /// Build a live query that re-runs `fetch` when `tables` change
    fn live<T, F>(&self, tables: TableSet, fetch: F) -> LiveQuery<T>
    where
        F: Fn(&Database) -> StoreResult<T> + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let store = self.clone();
        let fetch = Arc::new(fetch);
        LiveQuery::spawn(&self.inner.changes, tables, move || {
            let store = store.clone();
            let fetch = Arc::clone(&fetch);
            async move { store.read(move |db| (*fetch)(db)).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config::with_data_dir(temp_dir.path())
    }

    fn ids(notes: &[Note]) -> Vec<NoteId> {
        notes.iter().map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let store = Store::open_with_config(config.clone()).unwrap();

        assert!(config.sqlite_path().exists());
        assert_eq!(store.note_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let id = {
            let store = Store::open_with_config(config.clone()).unwrap();
            store.insert_note(&Note::new("Persistent")).await.unwrap().id
        };

        let store = Store::open_with_config(config).unwrap();
        let note = store.get_note_by_id(id).await.unwrap().unwrap();
        assert_eq!(note.title, "Persistent");
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = Store::open_in_memory().unwrap();
        let stored = store
            .insert_note(&Note::with_fields("Plan", "ship", "Work"))
            .await
            .unwrap();

        assert_ne!(stored.id, 0);
        assert_eq!(stored.created_at, stored.updated_at);
        assert_eq!(store.get_note_by_id(stored.id).await.unwrap(), Some(stored));
        assert!(store.get_note_by_id(12345).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_branches_on_id() {
        let store = Store::open_in_memory().unwrap();

        let inserted = store.upsert_note(&Note::new("one")).await.unwrap();
        assert_eq!(store.note_count().await.unwrap(), 1);

        let mut edited = inserted.clone();
        edited.title = "one, edited".to_string();
        let updated = store.upsert_note(&edited).await.unwrap();

        assert_eq!(store.note_count().await.unwrap(), 1);
        assert_eq!(updated.id, inserted.id);
        assert_eq!(updated.title, "one, edited");
        assert_eq!(updated.created_at, inserted.created_at);
    }

    #[tokio::test]
    async fn test_custom_default_title() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.default_title = "(no title)".to_string();

        let store = Store::open_with_config(config).unwrap();
        let note = store.insert_note(&Note::new("")).await.unwrap();
        assert_eq!(note.title, "(no title)");
    }

    #[tokio::test]
    async fn test_blank_default_title_from_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "data_dir = {:?}\ndefault_title = \"\"\n",
                temp_dir.path().join("data")
            ),
        )
        .unwrap();
        let config = Config::load_file(&path).unwrap();

        let store = Store::open_with_config(config).unwrap();
        let note = store
            .insert_note(&Note::with_fields("", "x", "Work"))
            .await
            .unwrap();
        assert_eq!(note.title, "Untitled");

        let mut blank = test_config(&temp_dir);
        blank.default_title = "  ".to_string();
        let store = Store::open_with_config(blank).unwrap();
        let note = store.upsert_note(&Note::new("")).await.unwrap();
        assert_eq!(note.title, "Untitled");
    }

    #[tokio::test]
    async fn test_all_notes_is_live() {
        let store = Store::open_in_memory().unwrap();
        let mut notes = store.get_all_notes();
        assert!(notes.next_ready().await.unwrap().is_empty());

        let first = store.insert_note(&Note::new("first")).await.unwrap();
        let snapshot = notes
            .wait_for(|s| s.ready().is_some_and(|v| v.len() == 1))
            .await
            .unwrap();
        assert_eq!(ids(snapshot.ready().unwrap()), vec![first.id]);

        store.delete_note(&first).await.unwrap();
        notes
            .wait_for(|s| s.ready().is_some_and(|v| v.is_empty()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_is_live() {
        let store = Store::open_in_memory().unwrap();
        let mut results = store.search_notes("work");
        assert!(results.next_ready().await.unwrap().is_empty());

        let mut note = store.insert_note(&Note::new("errands")).await.unwrap();
        note.category = "Work".to_string();
        store.update_note(&note).await.unwrap();

        let snapshot = results
            .wait_for(|s| s.ready().is_some_and(|v| !v.is_empty()))
            .await
            .unwrap();
        assert_eq!(ids(snapshot.ready().unwrap()), vec![note.id]);
    }

    #[tokio::test]
    async fn test_tag_changes_do_not_refresh_plain_notes() {
        let store = Store::open_in_memory().unwrap();
        store.insert_note(&Note::new("n")).await.unwrap();
        let mut notes = store.get_all_notes();
        notes.next_ready().await.unwrap();

        store.insert_tag(&Tag::new("unrelated")).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(100), notes.next()).await;
        assert!(next.is_err(), "plain note query refreshed on a tag change");
    }

    #[tokio::test]
    async fn test_tag_delete_cascades_into_live_projection() {
        let store = Store::open_in_memory().unwrap();
        let tag = store.insert_tag(&Tag::new("work")).await.unwrap();
        let a = store.insert_note(&Note::new("a")).await.unwrap();
        let b = store.insert_note(&Note::new("b")).await.unwrap();
        for note in [&a, &b] {
            store
                .insert_note_tag_cross_ref(NoteTagCrossRef::new(note.id, tag.id))
                .await
                .unwrap();
        }

        let mut projection = store.get_all_notes_with_tags();
        projection
            .wait_for(|s| {
                s.ready()
                    .is_some_and(|v| v.len() == 2 && v.iter().all(|n| n.has_tag(tag.id)))
            })
            .await
            .unwrap();

        store.delete_tag(&tag).await.unwrap();

        projection
            .wait_for(|s| s.ready().is_some_and(|v| v.iter().all(|n| n.tags.is_empty())))
            .await
            .unwrap();
        let with_tags = store.get_note_with_tags(a.id).await.unwrap().unwrap();
        assert!(!with_tags.has_tag(tag.id));
    }

    #[tokio::test]
    async fn test_notes_with_tag_follows_link_and_unlink() {
        let store = Store::open_in_memory().unwrap();
        let note = store.insert_note(&Note::new("A")).await.unwrap();
        let tag = store.insert_tag(&Tag::new("T")).await.unwrap();
        let link = NoteTagCrossRef::new(note.id, tag.id);

        let mut tagged = store.get_notes_with_tag(tag.id);
        assert!(tagged.next_ready().await.unwrap().is_empty());

        assert!(store.insert_note_tag_cross_ref(link).await.unwrap());
        let snapshot = tagged
            .wait_for(|s| s.ready().is_some_and(|v| !v.is_empty()))
            .await
            .unwrap();
        assert_eq!(ids(snapshot.ready().unwrap()), vec![note.id]);

        assert!(store.delete_note_tag_cross_ref(link).await.unwrap());
        tagged
            .wait_for(|s| s.ready().is_some_and(|v| v.is_empty()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_link_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let note = store.insert_note(&Note::new("A")).await.unwrap();

        let err = store
            .insert_note_tag_cross_ref(NoteTagCrossRef::new(note.id, 404))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAssociation { .. }));
        assert!(store.get_tags_for_note(note.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_lookups_and_counts() {
        let store = Store::open_in_memory().unwrap();
        let tag = store.insert_tag(&Tag::new("idea")).await.unwrap();
        let note = store.insert_note(&Note::new("n")).await.unwrap();
        store
            .insert_note_tag_cross_ref(NoteTagCrossRef::new(note.id, tag.id))
            .await
            .unwrap();

        assert_eq!(store.get_tag_by_name("idea").await.unwrap(), Some(tag.clone()));
        assert_eq!(store.get_tag_by_id(tag.id).await.unwrap(), Some(tag.clone()));
        assert_eq!(store.tag_count().await.unwrap(), 1);
        assert_eq!(store.get_tags_with_counts().await.unwrap(), vec![(tag, 1)]);

        let mut all = store.get_all_tags();
        assert_eq!(all.next_ready().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_category_query_is_live() {
        let store = Store::open_in_memory().unwrap();
        let mut work = store.get_notes_in_category("Work");
        assert!(work.next_ready().await.unwrap().is_empty());

        store
            .insert_note(&Note::with_fields("report", "", "Work"))
            .await
            .unwrap();
        work.wait_for(|s| s.ready().is_some_and(|v| v.len() == 1))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_instance_is_created_once() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let config = config.clone();
                tokio::spawn(async move { Store::instance(&config).await })
            })
            .collect();
        let mut stores = Vec::new();
        for handle in handles {
            stores.push(handle.await.unwrap().unwrap());
        }
        let first = stores[0];
        assert!(stores.iter().all(|s| s.same_store(first)));

        let other = TempDir::new().unwrap();
        let later = Store::instance(&test_config(&other)).await.unwrap();
        assert!(first.same_store(later));
        assert_eq!(later.config().data_dir, temp_dir.path());
    }
}
