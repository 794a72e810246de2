//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use jotter_core::{Note, NoteWithTags, Tag};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single note with its tags
    pub fn print_note(&self, note: &NoteWithTags) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", note.note.id);
                println!("Title:    {}", note.note.title);
                if !note.note.category.is_empty() {
                    println!("Category: {}", note.note.category);
                }
                if !note.tags.is_empty() {
                    println!("Tags:     {}", note.tag_names().join(", "));
                }
                println!("Created:  {}", local_time(&note.note.created_at));
                println!("Updated:  {}", local_time(&note.note.updated_at));
                if !note.note.content.is_empty() {
                    println!();
                    println!("{}", note.note.content);
                }
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => {
                println!("{}", note.note.id);
            }
        }
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[Note]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    println!("{}", note_row(note, ""));
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
    }

    /// Print a list of notes with their tags
    pub fn print_notes_with_tags(&self, notes: &[NoteWithTags]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for entry in notes {
                    let tags = if entry.tags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", entry.tag_names().join(", "))
                    };
                    println!("{}", note_row(&entry.note, &tags));
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(notes),
            OutputFormat::Quiet => {
                for entry in notes {
                    println!("{}", entry.note.id);
                }
            }
        }
    }

    /// Print a list of tags with usage counts
    pub fn print_tags(&self, tags: &[(Tag, i64)]) {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return;
                }
                for (tag, count) in tags {
                    match tag.color {
                        Some(ref color) => println!("{} ({}) {}", tag.name, count, color),
                        None => println!("{} ({})", tag.name, count),
                    }
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => {
                let json_tags: Vec<_> = tags
                    .iter()
                    .map(|(tag, count)| {
                        serde_json::json!({
                            "id": tag.id,
                            "name": tag.name,
                            "color": tag.color,
                            "count": count
                        })
                    })
                    .collect();
                print_json(&json_tags);
            }
            OutputFormat::Quiet => {
                for (tag, _) in tags {
                    println!("{}", tag.name);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Print a value as pretty JSON
fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Format a stored timestamp in the local timezone
fn local_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// One-line summary of a note
fn note_row(note: &Note, suffix: &str) -> String {
    let category = if note.category.is_empty() {
        String::new()
    } else {
        format!(" ({})", truncate(&note.category, 15))
    };
    format!(
        "{:>5} | {}{}{} | {}",
        note.id,
        truncate(&note.title, 35),
        category,
        suffix,
        truncate_line(&note.content, 40)
    )
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
