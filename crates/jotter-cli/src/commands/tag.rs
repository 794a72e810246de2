//! Tag command handlers

use anyhow::{Context, Result};

use jotter_core::{NoteActions, Store, Tag};

use crate::editor::confirm;
use crate::output::Output;

/// Create a tag
pub async fn add(
    actions: &NoteActions,
    name: String,
    color: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut tag = Tag::new(name);
    tag.color = color;

    let saved = actions
        .insert_tag(tag)
        .wait()
        .await
        .context("Failed to create tag")?;

    output.success(&format!("Created tag: {}", saved.name));
    Ok(())
}

/// List all tags with usage counts
pub async fn list(store: &Store, output: &Output) -> Result<()> {
    let tags = store.get_tags_with_counts().await?;
    output.print_tags(&tags);
    Ok(())
}

/// Rename a tag
pub async fn rename(
    store: &Store,
    actions: &NoteActions,
    name: String,
    new_name: String,
    output: &Output,
) -> Result<()> {
    let mut tag = require_tag(store, &name).await?;
    tag.name = new_name;

    let saved = actions
        .update_tag(tag)
        .wait()
        .await
        .context("Failed to rename tag")?;

    output.success(&format!("Renamed tag {} to {}", name, saved.name));
    Ok(())
}

/// Delete a tag, removing it from every note
pub async fn delete(
    store: &Store,
    actions: &NoteActions,
    name: String,
    output: &Output,
) -> Result<()> {
    let tag = require_tag(store, &name).await?;

    if output.should_prompt() {
        let count = store.get_notes_with_tag(tag.id).next_ready().await?.len();
        println!("Delete tag: {} (used by {} note(s))", tag.name, count);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    actions
        .delete_tag(tag)
        .wait()
        .await
        .context("Failed to delete tag")?;

    output.success(&format!("Deleted tag: {}", name));
    Ok(())
}

/// List notes carrying a tag
pub async fn tagged(store: &Store, name: String, output: &Output) -> Result<()> {
    let tag = require_tag(store, &name).await?;
    let notes = store.get_notes_with_tag(tag.id).next_ready().await?;
    output.print_notes(&notes);
    Ok(())
}

/// Look up a tag by name, failing when it doesn't exist
pub async fn require_tag(store: &Store, name: &str) -> Result<Tag> {
    store
        .get_tag_by_name(name.trim())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Tag not found: {}", name))
}

/// Look up a tag by name, creating it if needed
pub async fn find_or_create_tag(store: &Store, actions: &NoteActions, name: &str) -> Result<Tag> {
    if let Some(tag) = store.get_tag_by_name(name.trim()).await? {
        return Ok(tag);
    }
    actions
        .insert_tag(Tag::new(name))
        .wait()
        .await
        .with_context(|| format!("Failed to create tag '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use jotter_core::Note;

    #[tokio::test]
    async fn test_find_or_create_reuses_existing() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());

        let first = find_or_create_tag(&store, &actions, "idea").await.unwrap();
        let second = find_or_create_tag(&store, &actions, " idea ").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.tag_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let output = Output::new(OutputFormat::Quiet);

        add(&actions, "old".to_string(), None, &output).await.unwrap();
        rename(&store, &actions, "old".to_string(), "new".to_string(), &output)
            .await
            .unwrap();
        assert!(require_tag(&store, "old").await.is_err());

        let tag = require_tag(&store, "new").await.unwrap();
        let note = store.insert_note(&Note::new("n")).await.unwrap();
        actions.link_tag(note.id, tag.id).wait().await.unwrap();

        delete(&store, &actions, "new".to_string(), &output)
            .await
            .unwrap();
        assert!(store.get_tags_for_note(note.id).await.unwrap().is_empty());
    }
}
