//! # Daybook
//!
//! Local storage and retrieval for captured screen and clipboard activity.
//!
//! Each calendar date is a [`models::Session`] holding append-only
//! [`models::ContentBlock`]s (one app's activity over a time range, with its
//! OCR text and an optional generated summary). Sessions can be listed,
//! searched by keyword or by meaning, annotated, and deleted; screenshots
//! are stored alongside them on disk.
//!
//! ## Architecture
//!
//! ```text
//!   capture / CLI / HTTP callers
//!               │
//!               ▼
//!      ┌─────────────────┐      ┌───────────────┐
//!      │  StorageEngine  │─────▶│ worker (index,│
//!      │    (facade)     │◀─────│ embed, summ.) │
//!      └───┬───┬───┬───┬─┘      └───────────────┘
//!          │   │   │   │
//!          ▼   ▼   ▼   ▼
//!   sessions  fts  vectors  files/
//!   └─ metadata.sqlite ─┘  vectors.sqlite  <date>/<app>/<file>
//! ```
//!
//! The session store is the source of truth. The full-text and vector
//! indexes are derived from it and can always be rebuilt.
//!
//! ## Quick Start
//!
//! ```bash
//! daybook init
//! daybook screenshot 2025-01-01 Notes ./shot1.png
//! daybook search "Notes"
//! daybook embed pending
//! daybook search "what was I reading" --mode semantic
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Storage error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | SQLite connections |
//! | [`migrate`] | Schema migrations |
//! | [`session_store`] | Sessions and content blocks |
//! | [`fulltext`] | FTS5 keyword index |
//! | [`vector_index`] | Embedding storage and cosine ranking |
//! | [`blob_store`] | Screenshot files |
//! | [`embedding`] | Embedding providers |
//! | [`summarize`] | Block summarization |
//! | [`blocklist`] | Apps excluded from capture |
//! | [`worker`] | Periodic background jobs |
//! | [`engine`] | The storage facade |
//! | [`monitor`] | Benchmarks and storage metrics |
//! | [`embed_cmd`], [`get`], [`search`], [`stats`] | CLI commands |

pub mod blob_store;
pub mod blocklist;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fulltext;
pub mod get;
pub mod migrate;
pub mod models;
pub mod monitor;
pub mod search;
pub mod session_store;
pub mod stats;
pub mod summarize;
pub mod vector_index;
pub mod worker;
