//! Watch command handler
//!
//! Prints the note list every time it changes. Each line typed on stdin
//! replaces the search term; an empty line clears it.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use jotter_core::{NoteWithTags, QueryState, SearchController, SearchSnapshot, Store};

use crate::output::Output;

/// Follow the notes until Ctrl-C or until the store goes away
pub async fn run(store: &Store, search: Option<String>, output: &Output) -> Result<()> {
    let controller = SearchController::new(store.clone());
    if let Some(term) = search {
        controller.set_search_term(term);
    }
    let mut notes = controller.notes_with_tags_snapshots();

    output.message("Watching notes. Type a search term and press Enter (empty line clears). Ctrl-C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => controller.set_search_term(line.trim()),
                None => stdin_open = false,
            },
            state = notes.next() => match state {
                Some(QueryState::Ready(snapshot)) => print_snapshot(&snapshot, output),
                Some(QueryState::Failed(e)) => warn!(error = %e, "note query failed"),
                Some(QueryState::Loading) => {}
                None => break,
            },
        }
    }

    Ok(())
}

/// Print a list under the term it was fetched for
fn print_snapshot(snapshot: &SearchSnapshot<Vec<NoteWithTags>>, output: &Output) {
    output.message(&snapshot_header(snapshot));
    output.print_notes_with_tags(&snapshot.items);
}

fn snapshot_header(snapshot: &SearchSnapshot<Vec<NoteWithTags>>) -> String {
    if snapshot.is_search() {
        format!("\n── Search: {} ──", snapshot.term)
    } else {
        "\n── All notes ──".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jotter_core::Note;

    fn snapshot(term: &str) -> SearchSnapshot<Vec<NoteWithTags>> {
        SearchSnapshot {
            term: term.to_string(),
            items: vec![NoteWithTags {
                note: Note::new("n"),
                tags: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_header_uses_snapshot_term() {
        assert_eq!(snapshot_header(&snapshot("milk")), "\n── Search: milk ──");
        assert_eq!(snapshot_header(&snapshot("")), "\n── All notes ──");
        assert_eq!(snapshot_header(&snapshot("  ")), "\n── All notes ──");
    }

    #[tokio::test]
    async fn test_header_follows_result_not_current_term() {
        let store = Store::open_in_memory().unwrap();
        store.insert_note(&Note::new("milk run")).await.unwrap();
        let controller = SearchController::new(store);
        controller.set_search_term("milk");
        let mut notes = controller.notes_with_tags_snapshots();

        let shown = notes.next_ready().await.unwrap();
        controller.set_search_term("bread");

        assert_eq!(snapshot_header(&shown), "\n── Search: milk ──");
        assert_eq!(shown.items.len(), 1);
    }
}
