//! Data models for Jotter
//!
//! Defines the core data structures: Note, Tag, the note-tag cross
//! reference, and the NoteWithTags read projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row identifier assigned by the database
pub type NoteId = i64;

/// Row identifier assigned by the database
pub type TagId = i64;

/// Id carried by a note that has not been stored yet
pub const UNSAVED_ID: i64 = 0;

/// Title stored in place of a blank one
pub const DEFAULT_TITLE: &str = "Untitled";

/// A text note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    /// Row id, `UNSAVED_ID` until inserted
    pub id: NoteId,
    /// Note title
    pub title: String,
    /// Note body content
    pub content: String,
    /// Free-form category label
    pub category: String,
    /// When this note was created
    pub created_at: DateTime<Utc>,
    /// When this note was last updated
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a new, unsaved note with the given title
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            title: title.into(),
            content: String::new(),
            category: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an unsaved note with every editable field set
    pub fn with_fields(
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let mut note = Self::new(title);
        note.content = content.into();
        note.category = category.into();
        note
    }

    /// Whether this note has been assigned a row id
    pub fn is_saved(&self) -> bool {
        self.id != UNSAVED_ID
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Update the content
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = Utc::now();
    }

    /// Update the category
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
        self.updated_at = Utc::now();
    }

    /// Whether the title, content or category contains `term`, ignoring ASCII case
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.to_ascii_lowercase();
        [&self.title, &self.content, &self.category]
            .iter()
            .any(|field| field.to_ascii_lowercase().contains(&needle))
    }
}

/// Replace a blank title with `placeholder`
pub fn normalize_title(title: &str, placeholder: &str) -> String {
    if title.trim().is_empty() {
        placeholder.to_string()
    } else {
        title.to_string()
    }
}

/// A tag for organizing notes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Row id, `UNSAVED_ID` until inserted
    pub id: TagId,
    /// Display name, unique across tags
    pub name: String,
    /// Optional display color (e.g. "#ff8800")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Tag {
    /// Create a new, unsaved tag
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            name: name.into(),
            color: None,
        }
    }

    /// Set the display color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Association row linking a note to a tag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NoteTagCrossRef {
    pub note_id: NoteId,
    pub tag_id: TagId,
}

impl NoteTagCrossRef {
    pub fn new(note_id: NoteId, tag_id: TagId) -> Self {
        Self { note_id, tag_id }
    }
}

/// A note together with the tags currently linked to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteWithTags {
    #[serde(flatten)]
    pub note: Note,
    pub tags: Vec<Tag>,
}

impl NoteWithTags {
    /// Whether a tag with the given id is linked
    pub fn has_tag(&self, tag_id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    /// Tag names in display order
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}
