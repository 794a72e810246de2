//! Note command handlers

use anyhow::{bail, Context, Result};

use jotter_core::{Note, NoteActions, NoteId, SearchController, Store};

use crate::commands::tag::{find_or_create_tag, require_tag};
use crate::editor::{confirm, edit_note_content, is_interactive};
use crate::output::Output;

/// Create a new note
pub async fn add(
    store: &Store,
    actions: &NoteActions,
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    let title = title.unwrap_or_default();

    let content = match content {
        Some(c) => c,
        None if is_interactive() => edit_note_content(&title, "")?,
        None => String::new(),
    };

    let note = Note::with_fields(title, content, category.unwrap_or_default());
    let saved = actions
        .save_note(note)
        .wait()
        .await
        .context("Failed to save note")?;

    for name in &tags {
        let tag = find_or_create_tag(store, actions, name).await?;
        actions
            .link_tag(saved.id, tag.id)
            .wait()
            .await
            .with_context(|| format!("Failed to tag note with '{}'", name))?;
    }

    output.success(&format!("Added note {}: {}", saved.id, saved.title));

    Ok(())
}

/// List notes, optionally filtered by category or tag
pub async fn list(
    store: &Store,
    category: Option<String>,
    tag: Option<String>,
    output: &Output,
) -> Result<()> {
    if let Some(name) = tag {
        let tag = require_tag(store, &name).await?;
        let notes = store.get_notes_with_tag(tag.id).next_ready().await?;
        output.print_notes(&notes);
    } else if let Some(category) = category {
        let notes = store.get_notes_in_category(&category).next_ready().await?;
        output.print_notes(&notes);
    } else {
        let notes = store.get_all_notes_with_tags().next_ready().await?;
        output.print_notes_with_tags(&notes);
    }
    Ok(())
}

/// Show a single note
pub async fn show(store: &Store, id: NoteId, output: &Output) -> Result<()> {
    let note = store
        .get_note_with_tags(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Note not found: {}", id))?;

    output.print_note(&note);
    Ok(())
}

/// Edit a note's fields, or its content in the editor when no field is given
pub async fn edit(
    store: &Store,
    actions: &NoteActions,
    id: NoteId,
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut note = require_note(store, id).await?;

    if title.is_none() && content.is_none() && category.is_none() {
        if !is_interactive() {
            bail!("Nothing to change. Pass --title, --content or --category.");
        }
        let edited = edit_note_content(&note.title, &note.content)?;
        if edited == note.content {
            output.message("No changes made.");
            return Ok(());
        }
        note.set_content(edited);
    } else {
        if let Some(title) = title {
            note.set_title(title);
        }
        if let Some(content) = content {
            note.set_content(content);
        }
        if let Some(category) = category {
            note.set_category(category);
        }
    }

    let saved = actions
        .save_note(note)
        .wait()
        .await
        .context("Failed to update note")?;

    output.success(&format!("Updated note {}: {}", saved.id, saved.title));

    Ok(())
}

/// Delete a note
pub async fn delete(store: &Store, actions: &NoteActions, id: NoteId, output: &Output) -> Result<()> {
    let note = require_note(store, id).await?;

    // Confirm deletion
    if output.should_prompt() {
        println!("Delete note: {} - {}", note.id, note.title);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    actions
        .delete_note(note)
        .wait()
        .await
        .context("Failed to delete note")?;

    output.success(&format!("Deleted note: {}", id));

    Ok(())
}

/// Search notes
///
/// A blank term lists nothing rather than every note.
pub async fn search(store: &Store, term: String, output: &Output) -> Result<()> {
    let controller = SearchController::new(store.clone());
    controller.set_search_term(term);

    let notes = controller.search_results_with_tags().next_ready().await?;
    output.print_notes_with_tags(&notes);
    Ok(())
}

/// Look up a note, failing when it doesn't exist
async fn require_note(store: &Store, id: NoteId) -> Result<Note> {
    store
        .get_note_by_id(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Note not found: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[tokio::test]
    async fn test_add_with_tags_creates_and_links() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());

        add(
            &store,
            &actions,
            Some(String::new()),
            Some("body".to_string()),
            Some("Work".to_string()),
            vec!["todo".to_string()],
            &quiet(),
        )
        .await
        .unwrap();

        let notes = store.get_all_notes_with_tags().next_ready().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note.title, "Untitled");
        assert_eq!(notes[0].tag_names(), vec!["todo"]);
    }

    #[tokio::test]
    async fn test_edit_updates_given_fields_only() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let note = store
            .insert_note(&Note::with_fields("Plan", "draft", "Work"))
            .await
            .unwrap();

        edit(
            &store,
            &actions,
            note.id,
            None,
            Some("final".to_string()),
            None,
            &quiet(),
        )
        .await
        .unwrap();

        let stored = store.get_note_by_id(note.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Plan");
        assert_eq!(stored.content, "final");
        assert_eq!(stored.category, "Work");
    }

    #[tokio::test]
    async fn test_missing_note_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());

        assert!(show(&store, 42, &quiet()).await.is_err());
        assert!(delete(&store, &actions, 42, &quiet()).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_without_prompt_in_quiet_mode() {
        let store = Store::open_in_memory().unwrap();
        let actions = NoteActions::new(store.clone());
        let note = store.insert_note(&Note::new("gone")).await.unwrap();

        delete(&store, &actions, note.id, &quiet()).await.unwrap();
        assert!(store.get_note_by_id(note.id).await.unwrap().is_none());
    }
}
