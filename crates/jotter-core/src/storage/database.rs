//! SQLite data access layer
//!
//! Typed queries over the notes, tags and note_tags tables. Every mutation
//! runs inside its own transaction. Lookups by id return `Ok(None)` when the
//! row does not exist.
//!
//! ## Ordering
//!
//! Note lists are ordered by `updated_at DESC, id DESC`; tag lists by
//! `name, id`.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::models::{
    normalize_title, Note, NoteId, NoteTagCrossRef, NoteWithTags, Tag, TagId, DEFAULT_TITLE,
};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::schema::{init_schema, needs_init};

const NOTE_COLUMNS: &str = "n.id, n.title, n.content, n.category, n.created_at, n.updated_at";

const NOTE_ORDER: &str = "ORDER BY n.updated_at DESC, n.id DESC";

/// Synchronous handle on the note database
pub struct Database {
    conn: Connection,
    default_title: String,
}

impl Database {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn,
            default_title: DEFAULT_TITLE.to_string(),
        })
    }

    /// Use `title` in place of blank note titles
    ///
    /// A blank `title` keeps the built-in placeholder.
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.trim().is_empty() {
            self.default_title = title;
        }
        self
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==================== Note Mutations ====================

    /// Insert a note and return it as stored
    ///
    /// A note with `UNSAVED_ID` gets a fresh id. Both timestamps are set to
    /// the current time regardless of the values on `note`.
    pub fn insert_note(&mut self, note: &Note) -> StoreResult<Note> {
        let title = normalize_title(&note.title, &self.default_title);
        let now = Utc::now().timestamp_millis();
        let explicit_id = note.is_saved().then_some(note.id);

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO notes (id, title, content, category, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![explicit_id, title, note.content, note.category, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(note_id = id, "inserted note");
        self.get_note_by_id(id)?.ok_or(StoreError::NoteNotFound(id))
    }

    /// Update an existing note's editable fields and return it as stored
    ///
    /// `created_at` is never written. `updated_at` becomes the current time,
    /// or stays put if the clock moved backwards.
    pub fn update_note(&mut self, note: &Note) -> StoreResult<Note> {
        let title = normalize_title(&note.title, &self.default_title);
        let now = Utc::now().timestamp_millis();

        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            r#"
            UPDATE notes
            SET title = ?1, content = ?2, category = ?3, updated_at = MAX(?4, updated_at)
            WHERE id = ?5
            "#,
            params![title, note.content, note.category, now, note.id],
        )?;
        if changed == 0 {
            return Err(StoreError::NoteNotFound(note.id));
        }
        tx.commit()?;

        debug!(note_id = note.id, "updated note");
        self.get_note_by_id(note.id)?
            .ok_or(StoreError::NoteNotFound(note.id))
    }

    /// Delete a note, returning whether a row was removed
    pub fn delete_note(&mut self, note: &Note) -> StoreResult<bool> {
        self.delete_note_by_id(note.id)
    }

    /// Delete a note by id, returning whether a row was removed
    ///
    /// Cross references to the note are removed by the foreign key cascade.
    pub fn delete_note_by_id(&mut self, id: NoteId) -> StoreResult<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM notes WHERE id = ?", params![id])?;
        tx.commit()?;

        debug!(note_id = id, removed, "deleted note");
        Ok(removed > 0)
    }

    // ==================== Note Queries ====================

    /// Get a note by id
    pub fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?");
        let note = self
            .conn
            .query_row(&sql, params![id], note_from_row)
            .optional()?;
        Ok(note)
    }

    /// Get all notes
    pub fn get_all_notes(&self) -> StoreResult<Vec<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n {NOTE_ORDER}");
        let mut stmt = self.conn.prepare(&sql)?;
        let notes = stmt
            .query_map([], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Search notes whose title, content or category contains `term`
    ///
    /// Matching ignores ASCII case. `%`, `_` and `\` in the term match
    /// literally. An empty term matches every note.
    pub fn search_notes(&self, term: &str) -> StoreResult<Vec<Note>> {
        let (pattern, escaped) = like_pattern(term);
        let filter = if escaped {
            r"title LIKE ?1 ESCAPE '\' OR content LIKE ?1 ESCAPE '\' OR category LIKE ?1 ESCAPE '\'"
        } else {
            "title LIKE ?1 OR content LIKE ?1 OR category LIKE ?1"
        };
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes n \
             WHERE n.id IN (SELECT rowid FROM notes_fts WHERE {filter}) {NOTE_ORDER}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params![pattern], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Get notes whose category equals `category` exactly
    pub fn get_notes_in_category(&self, category: &str) -> StoreResult<Vec<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.category = ? {NOTE_ORDER}");
        let mut stmt = self.conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params![category], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Get notes linked to a tag
    pub fn get_notes_with_tag(&self, tag_id: TagId) -> StoreResult<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes n \
             JOIN note_tags nt ON nt.note_id = n.id \
             WHERE nt.tag_id = ? {NOTE_ORDER}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params![tag_id], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Get a note with its tags
    pub fn get_note_with_tags(&self, id: NoteId) -> StoreResult<Option<NoteWithTags>> {
        match self.get_note_by_id(id)? {
            Some(note) => {
                let tags = self.get_tags_for_note(id)?;
                Ok(Some(NoteWithTags { note, tags }))
            }
            None => Ok(None),
        }
    }

    /// Get all notes with their tags
    pub fn get_all_notes_with_tags(&self) -> StoreResult<Vec<NoteWithTags>> {
        let notes = self.get_all_notes()?;
        self.attach_tags(notes)
    }

    /// Search notes and attach their tags
    pub fn search_notes_with_tags(&self, term: &str) -> StoreResult<Vec<NoteWithTags>> {
        let notes = self.search_notes(term)?;
        self.attach_tags(notes)
    }

    /// Get note count
    pub fn note_count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
    }

    // ==================== Tag Mutations ====================

    /// Insert a tag and return it as stored
    ///
    /// Tag names are unique; inserting a duplicate name is a constraint error.
    pub fn insert_tag(&mut self, tag: &Tag) -> StoreResult<Tag> {
        let explicit_id = (tag.id != crate::models::UNSAVED_ID).then_some(tag.id);

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tags (id, name, color) VALUES (?1, ?2, ?3)",
            params![explicit_id, tag.name.trim(), tag.color],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(tag_id = id, "inserted tag");
        self.get_tag_by_id(id)?.ok_or(StoreError::TagNotFound(id))
    }

    /// Update a tag's name and color
    pub fn update_tag(&mut self, tag: &Tag) -> StoreResult<Tag> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
            params![tag.name.trim(), tag.color, tag.id],
        )?;
        if changed == 0 {
            return Err(StoreError::TagNotFound(tag.id));
        }
        tx.commit()?;

        debug!(tag_id = tag.id, "updated tag");
        self.get_tag_by_id(tag.id)?
            .ok_or(StoreError::TagNotFound(tag.id))
    }

    /// Delete a tag, returning whether a row was removed
    pub fn delete_tag(&mut self, tag: &Tag) -> StoreResult<bool> {
        self.delete_tag_by_id(tag.id)
    }

    /// Delete a tag by id; its cross references cascade
    pub fn delete_tag_by_id(&mut self, id: TagId) -> StoreResult<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM tags WHERE id = ?", params![id])?;
        tx.commit()?;

        debug!(tag_id = id, removed, "deleted tag");
        Ok(removed > 0)
    }

    // ==================== Tag Queries ====================

    /// Get a tag by id
    pub fn get_tag_by_id(&self, id: TagId) -> StoreResult<Option<Tag>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, color FROM tags WHERE id = ?",
                params![id],
                tag_from_row,
            )
            .optional()?)
    }

    /// Get a tag by exact name
    pub fn get_tag_by_name(&self, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, color FROM tags WHERE name = ?",
                params![name.trim()],
                tag_from_row,
            )
            .optional()?)
    }

    /// Get all tags
    pub fn get_all_tags(&self) -> StoreResult<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM tags ORDER BY name, id")?;
        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Get the tags linked to a note
    pub fn get_tags_for_note(&self, note_id: NoteId) -> StoreResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.name, t.color FROM tags t
            JOIN note_tags nt ON t.id = nt.tag_id
            WHERE nt.note_id = ?
            ORDER BY t.name, t.id
            "#,
        )?;
        let tags = stmt
            .query_map(params![note_id], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Get tags with the number of notes linked to each
    pub fn get_tags_with_counts(&self) -> StoreResult<Vec<(Tag, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.name, t.color, COUNT(nt.note_id) as count
            FROM tags t
            LEFT JOIN note_tags nt ON t.id = nt.tag_id
            GROUP BY t.id
            ORDER BY count DESC, t.name
            "#,
        )?;
        let tags = stmt
            .query_map([], |row| Ok((tag_from_row(row)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Get tag count
    pub fn tag_count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?)
    }

    // ==================== Cross References ====================

    /// Link a note to a tag
    ///
    /// Returns `false` when the link already existed. Fails with
    /// `InvalidAssociation` if either side is missing.
    pub fn insert_note_tag_cross_ref(&mut self, cross_ref: NoteTagCrossRef) -> StoreResult<bool> {
        let NoteTagCrossRef { note_id, tag_id } = cross_ref;

        let tx = self.conn.transaction()?;
        let note_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?)",
            params![note_id],
            |row| row.get(0),
        )?;
        let tag_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?)",
            params![tag_id],
            |row| row.get(0),
        )?;
        if !note_exists || !tag_exists {
            return Err(StoreError::InvalidAssociation { note_id, tag_id });
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)",
            params![note_id, tag_id],
        )?;
        tx.commit()?;

        debug!(note_id, tag_id, inserted, "linked tag");
        Ok(inserted > 0)
    }

    /// Unlink a note from a tag, returning whether a link was removed
    pub fn delete_note_tag_cross_ref(&mut self, cross_ref: NoteTagCrossRef) -> StoreResult<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM note_tags WHERE note_id = ? AND tag_id = ?",
            params![cross_ref.note_id, cross_ref.tag_id],
        )?;
        tx.commit()?;

        debug!(
            note_id = cross_ref.note_id,
            tag_id = cross_ref.tag_id,
            removed,
            "unlinked tag"
        );
        Ok(removed > 0)
    }

    // ==================== Private helpers ====================

    /// Pair each note with its tags, preserving note order
    fn attach_tags(&self, notes: Vec<Note>) -> StoreResult<Vec<NoteWithTags>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT nt.note_id, t.id, t.name, t.color
            FROM note_tags nt
            JOIN tags t ON t.id = nt.tag_id
            ORDER BY t.name, t.id
            "#,
        )?;

        let mut by_note: HashMap<NoteId, Vec<Tag>> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            let note_id: NoteId = row.get(0)?;
            let tag = Tag {
                id: row.get(1)?,
                name: row.get(2)?,
                color: row.get(3)?,
            };
            Ok((note_id, tag))
        })?;
        for row in rows {
            let (note_id, tag) = row?;
            by_note.entry(note_id).or_default().push(tag);
        }

        Ok(notes
            .into_iter()
            .map(|note| {
                let tags = by_note.remove(&note.id).unwrap_or_default();
                NoteWithTags { note, tags }
            })
            .collect())
    }
}

/// Build a LIKE pattern for a substring match
///
/// Returns the pattern and whether it needs `ESCAPE '\'`.
fn like_pattern(term: &str) -> (String, bool) {
    let needs_escape = term.contains(['%', '_', '\\']);
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if needs_escape && matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    (pattern, needs_escape)
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        created_at: from_millis(row.get(4)?),
        updated_at: from_millis(row.get(5)?),
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
