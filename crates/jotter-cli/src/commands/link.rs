//! Link command handlers
//!
//! Attach tags to notes and detach them again.

use anyhow::{Context, Result};

use jotter_core::{NoteActions, NoteId, Store};

use crate::commands::tag::{find_or_create_tag, require_tag};
use crate::output::Output;

/// Add a tag to a note
pub async fn link(
    store: &Store,
    actions: &NoteActions,
    note_id: NoteId,
    tag_name: String,
    create: bool,
    output: &Output,
) -> Result<()> {
    let tag = if create {
        find_or_create_tag(store, actions, &tag_name).await?
    } else {
        require_tag(store, &tag_name).await?
    };

    let added = actions
        .link_tag(note_id, tag.id)
        .wait()
        .await
        .with_context(|| format!("Failed to tag note {} with '{}'", note_id, tag.name))?;

    if added {
        output.success(&format!("Tagged note {} with {}", note_id, tag.name));
    } else {
        output.message(&format!("Note {} already has tag {}", note_id, tag.name));
    }
    Ok(())
}

/// Remove a tag from a note
pub async fn unlink(
    store: &Store,
    actions: &NoteActions,
    note_id: NoteId,
    tag_name: String,
    output: &Output,
) -> Result<()> {
    let tag = require_tag(store, &tag_name).await?;

    let removed = actions
        .unlink_tag(note_id, tag.id)
        .wait()
        .await
        .context("Failed to remove tag")?;

    if removed {
        output.success(&format!("Removed tag {} from note {}", tag.name, note_id));
    } else {
        output.message(&format!("Note {} doesn't have tag {}", note_id, tag.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use jotter_core::Note;

    #[tokio::test]
    async fn test_link_then_unlink() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let output = Output::new(OutputFormat::Quiet);
        let note = store.insert_note(&Note::new("A")).await.unwrap();

        link(&store, &actions, note.id, "T".to_string(), true, &output)
            .await
            .unwrap();
        let tags = store.get_tags_for_note(note.id).await.unwrap();
        assert_eq!(tags.len(), 1);

        unlink(&store, &actions, note.id, "T".to_string(), &output)
            .await
            .unwrap();
        assert!(store.get_tags_for_note(note.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_unknown_tag_without_create_fails() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let output = Output::new(OutputFormat::Quiet);
        let note = store.insert_note(&Note::new("A")).await.unwrap();

        let result = link(&store, &actions, note.id, "missing".to_string(), false, &output).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_link_missing_note_fails() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let output = Output::new(OutputFormat::Quiet);

        let result = link(&store, &actions, 404, "T".to_string(), true, &output).await;
        assert!(result.is_err());
    }
}
