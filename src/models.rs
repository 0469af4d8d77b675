//! Core data models shared by the stores, the engine, and the CLI.
//!
//! A [`Session`] is one calendar date of captured activity; its
//! [`ContentBlock`]s are time-bounded slices of one app's activity.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Date format used for session keys and blob directories.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse and validate a session date (`YYYY-MM-DD`).
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| Error::validation(format!("invalid date '{}': expected YYYY-MM-DD", date)))
}

/// Validate a session date, returning its canonical string form.
pub fn canonical_date(date: &str) -> Result<String> {
    Ok(parse_date(date)?.format(DATE_FORMAT).to_string())
}

pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// One record per calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub date: String,
    pub custom_title: Option<String>,
    pub custom_summary: Option<String>,
    pub manual_notes: String,
    pub tags: Vec<String>,
    /// Ordered by start time, then app.
    pub blocks: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Distinct app names, in first-seen order.
    pub fn apps(&self) -> Vec<&str> {
        let mut apps: Vec<&str> = Vec::new();
        for block in &self.blocks {
            if !apps.contains(&block.app.as_str()) {
                apps.push(&block.app);
            }
        }
        apps
    }

    pub fn blocks_for_app<'a>(&'a self, app: &'a str) -> impl Iterator<Item = &'a ContentBlock> {
        self.blocks.iter().filter(move |b| b.app == app)
    }
}

/// A time-bounded slice of one app's captured activity. Immutable once
/// written; `summary` is attached later by the summarizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    pub date: String,
    pub app: String,
    /// Start instant in Unix milliseconds, as a decimal string.
    pub block_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ocr_text: String,
    pub summary: Option<String>,
    /// Asset references (`<date>/<app>/<filename>`), never the bytes.
    pub screenshots: Vec<String>,
}

impl ContentBlock {
    pub fn key(&self) -> BlockKey {
        BlockKey {
            date: self.date.clone(),
            app: self.app.clone(),
            block_id: self.block_id.clone(),
        }
    }

    /// Text used to embed this block: the summary once one exists, the raw
    /// OCR text before that.
    pub fn embedding_text(&self) -> String {
        match &self.summary {
            Some(s) if !s.trim().is_empty() => s.clone(),
            _ => format!("{}: {}", self.app, self.ocr_text),
        }
    }
}

/// A block produced by the capture pipeline, before it is assigned an id.
#[derive(Debug, Clone, Default)]
pub struct NewBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ocr_text: String,
    pub screenshots: Vec<String>,
}

impl NewBlock {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, ocr_text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            ocr_text: ocr_text.into(),
            screenshots: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(Error::validation(format!(
                "block end {} is before start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }

    pub fn block_id(&self) -> String {
        self.start.timestamp_millis().to_string()
    }
}

/// Identity of a block across the metadata, full-text, and vector regions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub date: String,
    pub app: String,
    pub block_id: String,
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.app, self.block_id)
    }
}

/// Fields a user edit may override. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub custom_title: Option<String>,
    pub custom_summary: Option<String>,
    pub manual_notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// One page of sessions plus the total across all pages.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub items: Vec<Session>,
    pub total: i64,
}

/// A search hit. Full-text hits are per session; semantic hits are per block.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub date: String,
    pub app: Option<String>,
    pub block_id: Option<String>,
    /// Match count for full-text results, cosine similarity for semantic ones.
    pub score: f64,
    pub snippet: String,
}

/// A page of full-text results plus the number of matching sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total: i64,
}

/// Candidate restriction for semantic search, applied before ranking.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub app: Option<String>,
}
