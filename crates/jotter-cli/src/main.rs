//! Jotter CLI
//!
//! Command-line interface for Jotter - notes and tags management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jotter_core::{Config, NoteActions, Store};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

/// Log level used when neither RUST_LOG nor the config sets one
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "jotter")]
#[command(about = "Jotter - notes and tags from the terminal")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Add a tag to a note
    Link {
        /// Note ID
        note_id: i64,
        /// Tag name
        tag: String,
        /// Create the tag if it doesn't exist
        #[arg(long)]
        create: bool,
    },
    /// Remove a tag from a note
    Unlink {
        /// Note ID
        note_id: i64,
        /// Tag name
        tag: String,
    },
    /// List notes with a tag
    Tagged {
        /// Tag name
        tag: String,
    },
    /// Follow the note list as it changes
    Watch {
        /// Initial search term
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Create a new note
    #[command(alias = "create")]
    Add {
        /// Note title (blank becomes the default title)
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Note content (opens editor if not provided)
        #[arg(short, long)]
        content: Option<String>,
        /// Category
        #[arg(short = 'C', long)]
        category: Option<String>,
        /// Tags to add
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// List notes
    #[command(alias = "ls")]
    List {
        /// Only notes in this category
        #[arg(short = 'C', long, conflicts_with = "tag")]
        category: Option<String>,
        /// Only notes with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show a note with its tags
    Show {
        /// Note ID
        id: i64,
    },
    /// Edit a note
    Edit {
        /// Note ID
        id: i64,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New content (opens editor if no field is given)
        #[arg(short, long)]
        content: Option<String>,
        /// New category
        #[arg(short = 'C', long)]
        category: Option<String>,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID
        id: i64,
    },
    /// Search notes by title, content or category
    Search {
        /// Search term
        term: String,
    },
}

#[derive(Subcommand)]
enum TagCommands {
    /// Create a tag
    #[command(alias = "create")]
    Add {
        /// Tag name
        name: String,
        /// Display color (e.g. "#ff8800")
        #[arg(long)]
        color: Option<String>,
    },
    /// List tags with usage counts
    #[command(alias = "ls")]
    List,
    /// Rename a tag
    Rename {
        /// Current name
        name: String,
        /// New name
        new_name: String,
    },
    /// Delete a tag and remove it from every note
    #[command(alias = "rm")]
    Delete {
        /// Tag name
        name: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, default_title, log_level)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(config.log_level.as_deref());

    let store = Store::instance(&config)
        .await
        .context("Failed to open note database")?;
    debug!(path = %config.sqlite_path().display(), "store ready");
    let actions = NoteActions::new(store.clone());

    match cli.command {
        Commands::Note { command } => handle_note_command(command, store, &actions, &output).await,
        Commands::Tag { command } => handle_tag_command(command, store, &actions, &output).await,
        Commands::Link {
            note_id,
            tag,
            create,
        } => commands::link::link(store, &actions, note_id, tag, create, &output).await,
        Commands::Unlink { note_id, tag } => {
            commands::link::unlink(store, &actions, note_id, tag, &output).await
        }
        Commands::Tagged { tag } => commands::tag::tagged(store, tag, &output).await,
        Commands::Watch { search } => commands::watch::run(store, search, &output).await,
        Commands::Config { .. } => Ok(()), // Handled above
    }
}

async fn handle_note_command(
    command: NoteCommands,
    store: &Store,
    actions: &NoteActions,
    output: &Output,
) -> Result<()> {
    match command {
        NoteCommands::Add {
            title,
            content,
            category,
            tag,
        } => commands::note::add(store, actions, title, content, category, tag, output).await,
        NoteCommands::List { category, tag } => {
            commands::note::list(store, category, tag, output).await
        }
        NoteCommands::Show { id } => commands::note::show(store, id, output).await,
        NoteCommands::Edit {
            id,
            title,
            content,
            category,
        } => commands::note::edit(store, actions, id, title, content, category, output).await,
        NoteCommands::Delete { id } => commands::note::delete(store, actions, id, output).await,
        NoteCommands::Search { term } => commands::note::search(store, term, output).await,
    }
}

async fn handle_tag_command(
    command: TagCommands,
    store: &Store,
    actions: &NoteActions,
    output: &Output,
) -> Result<()> {
    match command {
        TagCommands::Add { name, color } => commands::tag::add(actions, name, color, output).await,
        TagCommands::List => commands::tag::list(store, output).await,
        TagCommands::Rename { name, new_name } => {
            commands::tag::rename(store, actions, name, new_name, output).await
        }
        TagCommands::Delete { name } => commands::tag::delete(store, actions, name, output).await,
    }
}

/// Install the stderr log subscriber
///
/// RUST_LOG wins over the configured level.
fn init_logging(config_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config_level.unwrap_or(DEFAULT_LOG_LEVEL);
        EnvFilter::new(format!("jotter_core={},jotter_cli={}", level, level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
