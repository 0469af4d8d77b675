//! # Daybook CLI (`daybook`)
//!
//! Command-line access to a daybook store: inspect and annotate sessions,
//! search them, attach screenshots, and run maintenance.
//!
//! ## Usage
//!
//! ```bash
//! daybook --config ./config/daybook.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `daybook init` | Create both databases and the files directory |
//! | `daybook sessions` | List sessions, most recent first |
//! | `daybook get <date>` | Print one session with its blocks |
//! | `daybook search "<term>"` | Keyword or semantic search |
//! | `daybook note <date>` | Set a session's title, summary, notes or tags |
//! | `daybook screenshot <date> <app> <path>` | Store a screenshot |
//! | `daybook delete <date>` | Delete a session everywhere |
//! | `daybook reindex [date]` | Rebuild the full-text index |
//! | `daybook embed pending` | Backfill missing or stale embeddings |
//! | `daybook summarize pending` | Summarize blocks without a summary |
//! | `daybook bench` | Run the storage benchmark |
//! | `daybook stats` | Print storage footprint |
//! | `daybook maintain` | Run the background workers until Ctrl-C |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use daybook::config;
use daybook::embed_cmd;
use daybook::engine::StorageEngine;
use daybook::get;
use daybook::migrate;
use daybook::models::SessionPatch;
use daybook::search::{self, SearchArgs};
use daybook::stats;

/// Daybook CLI: local storage for captured screen activity.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/daybook.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "daybook",
    about = "Daybook: local storage and search for captured screen activity",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/daybook.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the databases and the files directory. Safe to run repeatedly.
    Init,

    /// List sessions, most recent first.
    Sessions {
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        page_size: Option<i64>,
    },

    /// Print one session (YYYY-MM-DD) with all of its blocks.
    Get { date: String },

    /// Search sessions.
    ///
    /// `keyword` matches whole words across titles, notes, tags, OCR text
    /// and summaries. `semantic` ranks individual blocks by embedding
    /// similarity and needs an embedding provider.
    Search {
        term: String,

        #[arg(long, default_value = "keyword")]
        mode: String,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        page_size: Option<i64>,

        /// Maximum semantic results.
        #[arg(long)]
        top_k: Option<i64>,

        /// Semantic only: restrict to one app.
        #[arg(long)]
        app: Option<String>,

        /// Semantic only: earliest date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Semantic only: latest date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,
    },

    /// Edit a session's user-provided fields. An empty title or summary clears it.
    Note {
        date: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Replace the tag set (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Store an image file as a screenshot for `app` on `date`.
    Screenshot {
        date: String,
        app: String,
        path: PathBuf,
        /// Stored filename (defaults to the file's own name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a session with its index entries, vectors and screenshots.
    Delete { date: String },

    /// Re-derive full-text entries for one date, or rebuild the whole index.
    Reindex { date: Option<String> },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: PendingAction,
    },

    /// Manage block summaries.
    Summarize {
        #[command(subcommand)]
        action: PendingAction,
    },

    /// Seed synthetic sessions and time the core operations.
    Bench {
        #[arg(long, default_value_t = 100)]
        count: i64,
    },

    /// Print on-disk footprint and counts.
    Stats,

    /// Run reconciliation, embedding and summarization workers until Ctrl-C.
    Maintain,
}

#[derive(Subcommand)]
enum PendingAction {
    /// Process blocks that are missing or stale.
    Pending {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Initialized daybook store at {}", cfg.storage.root.display());
        }
        Commands::Maintain => {
            cfg.workers.enabled = true;
            let engine = StorageEngine::open(cfg).await?;
            info!("Workers running; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            engine.close().await?;
        }
        command => {
            cfg.workers.enabled = false;
            let engine = StorageEngine::open(cfg).await?;
            let outcome = run_command(&engine, command).await;
            engine.close().await?;
            outcome?;
        }
    }

    Ok(())
}

async fn run_command(engine: &Arc<StorageEngine>, command: Commands) -> Result<()> {
    match command {
        Commands::Sessions { page, page_size } => get::run_list(engine, page, page_size).await,
        Commands::Get { date } => get::run_get(engine, &date).await,
        Commands::Search {
            term,
            mode,
            page,
            page_size,
            top_k,
            app,
            since,
            until,
        } => {
            let args = SearchArgs {
                mode,
                page,
                page_size,
                top_k,
                app,
                since,
                until,
            };
            search::run_search(engine, &term, &args).await
        }
        Commands::Note {
            date,
            title,
            summary,
            notes,
            tags,
        } => {
            let patch = SessionPatch {
                custom_title: title,
                custom_summary: summary,
                manual_notes: notes,
                tags: if tags.is_empty() { None } else { Some(tags) },
            };
            let session = engine.upsert_session(&date, &patch).await?;
            println!("Updated session {}", session.date);
            Ok(())
        }
        Commands::Screenshot {
            date,
            app,
            path,
            name,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("screenshot path has no usable file name")?
                    .to_string(),
            };
            let reference = engine.save_screenshot(&date, &app, &filename, &bytes).await?;
            println!("Saved {} ({} bytes)", reference, bytes.len());
            Ok(())
        }
        Commands::Delete { date } => {
            engine.delete_session(&date).await?;
            println!("Deleted session {}", date);
            Ok(())
        }
        Commands::Reindex { date: Some(date) } => {
            let changed = engine.reindex(&date).await?;
            println!(
                "reindex {}: {}",
                date,
                if changed { "updated" } else { "already current" }
            );
            Ok(())
        }
        Commands::Reindex { date: None } => {
            let report = engine.reconcile().await?;
            let indexed = engine.rebuild_indexes().await?;
            println!("reindex");
            println!("  sessions indexed: {}", indexed);
            println!("  orphaned index rows removed: {}", report.fts_removed);
            println!("  orphaned vectors removed: {}", report.vectors_removed);
            println!("  orphaned asset dirs removed: {}", report.asset_dirs_removed);
            Ok(())
        }
        Commands::Embed {
            action: PendingAction::Pending { limit },
        } => embed_cmd::run_embed_pending(engine, limit).await,
        Commands::Summarize {
            action: PendingAction::Pending { limit },
        } => embed_cmd::run_summarize_pending(engine, limit).await,
        Commands::Bench { count } => stats::run_bench(engine, count).await,
        Commands::Stats => stats::run_stats(engine).await,
        Commands::Init | Commands::Maintain => Ok(()),
    }
}
