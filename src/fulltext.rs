//! Full-text index over session and block text (SQLite FTS5).
//!
//! One FTS row is stored per non-empty text field: the session's title,
//! summary, notes and each tag, plus every block's app name, OCR text and
//! summary. Matching is whole-token and case-insensitive (`unicode61`,
//! diacritics folded); a multi-word term is matched as a phrase.
//!
//! A session's score is the number of its fields that match. Results are
//! ordered by score, then most recent date.
//!
//! Rows are derived entirely from [`Session`] content, so
//! [`FullTextIndex::index_session`] can be called any number of times and
//! only writes when the derived rows differ from what is stored.

use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{SearchPage, SearchResult, Session};

/// A single derived FTS row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub app: String,
    pub block_id: String,
    pub field: String,
    pub text: String,
}

/// Derive the FTS rows for a session.
pub fn index_entries(session: &Session) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    let mut push = |app: &str, block_id: &str, field: &str, text: &str| {
        if !text.trim().is_empty() {
            entries.push(IndexEntry {
                app: app.to_string(),
                block_id: block_id.to_string(),
                field: field.to_string(),
                text: text.to_string(),
            });
        }
    };

    if let Some(title) = &session.custom_title {
        push("", "", "title", title);
    }
    if let Some(summary) = &session.custom_summary {
        push("", "", "summary", summary);
    }
    push("", "", "notes", &session.manual_notes);
    for tag in &session.tags {
        push("", "", "tag", tag);
    }

    for block in &session.blocks {
        push(&block.app, &block.block_id, "app", &block.app);
        push(&block.app, &block.block_id, "ocr", &block.ocr_text);
        if let Some(summary) = &block.summary {
            push(&block.app, &block.block_id, "block_summary", summary);
        }
    }

    entries.sort();
    entries
}

/// Quote a user term as an FTS5 phrase so it is never parsed as query syntax.
pub fn fts_phrase(term: &str) -> String {
    format!("\"{}\"", term.trim().replace('"', "\"\""))
}

pub struct FullTextIndex {
    pool: SqlitePool,
}

impl FullTextIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bring the rows for `session.date` in line with its content.
    ///
    /// Returns `false` without writing when the stored rows already match.
    pub async fn index_session(&self, session: &Session) -> Result<bool> {
        self.write_session(session).await.map_err(unreadable_index)
    }

    async fn write_session(&self, session: &Session) -> Result<bool> {
        let wanted = index_entries(session);

        let rows = sqlx::query(
            "SELECT app, block_id, field, text FROM session_fts WHERE date = ?",
        )
        .bind(&session.date)
        .fetch_all(&self.pool)
        .await?;
        let mut existing: Vec<IndexEntry> = rows
            .iter()
            .map(|row| IndexEntry {
                app: row.get("app"),
                block_id: row.get("block_id"),
                field: row.get("field"),
                text: row.get("text"),
            })
            .collect();
        existing.sort();

        if existing == wanted {
            return Ok(false);
        }

        // Callers serialize writes per date, so the rows read above are
        // still current; the transaction opens with a write.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session_fts WHERE date = ?")
            .bind(&session.date)
            .execute(&mut *tx)
            .await?;

        for entry in &wanted {
            sqlx::query(
                "INSERT INTO session_fts (date, app, block_id, field, text) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&session.date)
            .bind(&entry.app)
            .bind(&entry.block_id)
            .bind(&entry.field)
            .bind(&entry.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Drop every row for `date`. Returns the number of rows removed.
    pub async fn remove(&self, date: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM session_fts WHERE date = ?")
            .bind(date)
            .execute(&self.pool)
            .await
            .map_err(|e| unreadable_index(e.into()))?;
        Ok(result.rows_affected())
    }

    /// Drop and recreate the FTS table. Used when the index is unreadable.
    pub async fn reset(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS session_fts")
            .execute(&self.pool)
            .await?;
        migrate::migrate_metadata(&self.pool).await
    }

    /// Distinct dates present in the index.
    pub async fn indexed_dates(&self) -> Result<Vec<String>> {
        Ok(
            sqlx::query_scalar("SELECT DISTINCT date FROM session_fts ORDER BY date DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| unreadable_index(e.into()))?,
        )
    }

    pub async fn entry_count(&self, date: &str) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM session_fts WHERE date = ?")
                .bind(date)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| unreadable_index(e.into()))?,
        )
    }

    /// Paginated term search. `page` is 1-indexed.
    pub async fn search(&self, term: &str, page: i64, page_size: i64) -> Result<SearchPage> {
        self.run_search(term, page, page_size)
            .await
            .map_err(unreadable_index)
    }

    async fn run_search(&self, term: &str, page: i64, page_size: i64) -> Result<SearchPage> {
        if term.trim().is_empty() {
            return Err(Error::validation("search term must not be empty"));
        }
        if page <= 0 || page_size <= 0 {
            return Err(Error::validation(format!(
                "page and page_size must be >= 1, got {} and {}",
                page, page_size
            )));
        }
        let phrase = fts_phrase(term);
        let offset = (page - 1).saturating_mul(page_size);

        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT date) FROM session_fts WHERE session_fts MATCH ?",
        )
        .bind(&phrase)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT date, COUNT(*) AS hits
            FROM session_fts
            WHERE session_fts MATCH ?
            GROUP BY date
            ORDER BY hits DESC, date DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&phrase)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let date: String = row.get("date");
            let hits: i64 = row.get("hits");

            let snippet: Option<String> = sqlx::query_scalar(
                r#"
                SELECT snippet(session_fts, 4, '>>>', '<<<', '...', 16)
                FROM session_fts
                WHERE session_fts MATCH ? AND date = ?
                ORDER BY rank, rowid
                LIMIT 1
                "#,
            )
            .bind(&phrase)
            .bind(&date)
            .fetch_optional(&mut *tx)
            .await?;

            results.push(SearchResult {
                date,
                app: None,
                block_id: None,
                score: hits as f64,
                snippet: snippet.unwrap_or_default(),
            });
        }
        tx.commit().await?;

        Ok(SearchPage { results, total })
    }
}

/// A missing or malformed FTS table can only be fixed by recreating it, so
/// schema errors from this index are reported as corruption.
fn unreadable_index(err: Error) -> Error {
    match err {
        Error::Io(msg) if is_schema_error(&msg) => Error::Corruption(msg),
        other => other,
    }
}

fn is_schema_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("no such table") || lower.contains("no such column")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{ms_to_datetime, ContentBlock};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn test_index() -> (TempDir, FullTextIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("metadata.sqlite"), 2)
            .await
            .unwrap();
        migrate::migrate_metadata(&pool).await.unwrap();
        (tmp, FullTextIndex::new(pool))
    }

    fn session(date: &str, blocks: &[(&str, &str)]) -> Session {
        Session {
            date: date.to_string(),
            custom_title: None,
            custom_summary: None,
            manual_notes: String::new(),
            tags: Vec::new(),
            blocks: blocks
                .iter()
                .enumerate()
                .map(|(i, (app, text))| ContentBlock {
                    date: date.to_string(),
                    app: app.to_string(),
                    block_id: (i as i64 * 1000).to_string(),
                    start: ms_to_datetime(i as i64 * 1000),
                    end: ms_to_datetime(i as i64 * 1000 + 500),
                    ocr_text: text.to_string(),
                    summary: None,
                    screenshots: vec![],
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fts_phrase_escapes_quotes() {
        assert_eq!(fts_phrase("waddle"), "\"waddle\"");
        assert_eq!(fts_phrase(" say \"hi\" "), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_index_entries_skip_empty_fields() {
        let mut s = session("2025-01-01", &[("Notes", "")]);
        s.tags = vec!["work".into()];
        let entries = index_entries(&s);
        let fields: Vec<&str> = entries.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&"app"));
        assert!(fields.contains(&"tag"));
    }

    #[tokio::test]
    async fn test_search_ranks_by_match_count_then_date() {
        let (_tmp, index) = test_index().await;
        index
            .index_session(&session("2025-01-01", &[("Editor", "the penguin waddle")]))
            .await
            .unwrap();
        index
            .index_session(&session(
                "2025-01-02",
                &[("Editor", "waddle here"), ("Browser", "WADDLE there")],
            ))
            .await
            .unwrap();
        index
            .index_session(&session("2025-01-03", &[("Editor", "waddle once")]))
            .await
            .unwrap();
        index
            .index_session(&session("2025-01-04", &[("Editor", "nothing relevant")]))
            .await
            .unwrap();

        let page = index.search("waddle", 1, 10).await.unwrap();
        assert_eq!(page.total, 3);
        let dates: Vec<&str> = page.results.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-02", "2025-01-03", "2025-01-01"]);
        assert_eq!(page.results[0].score, 2.0);
        assert!(page.results[0].snippet.contains(">>>"));

        let again = index.search("waddle", 1, 10).await.unwrap();
        let again_dates: Vec<&str> = again.results.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, again_dates);

        let second = index.search("waddle", 2, 2).await.unwrap();
        assert_eq!(second.total, 3);
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].date, "2025-01-01");
    }

    #[tokio::test]
    async fn test_whole_token_policy() {
        let (_tmp, index) = test_index().await;
        index
            .index_session(&session("2025-01-01", &[("Editor", "waddlesome penguins")]))
            .await
            .unwrap();
        assert_eq!(index.search("waddle", 1, 10).await.unwrap().total, 0);
        assert_eq!(index.search("Penguins", 1, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_reindex_unchanged_is_noop() {
        let (_tmp, index) = test_index().await;
        let s = session("2025-01-01", &[("Editor", "alpha"), ("Notes", "beta")]);
        assert!(index.index_session(&s).await.unwrap());
        let count = index.entry_count("2025-01-01").await.unwrap();
        assert!(!index.index_session(&s).await.unwrap());
        assert_eq!(index.entry_count("2025-01-01").await.unwrap(), count);

        assert_eq!(index.remove("2025-01-01").await.unwrap(), count as u64);
        assert!(index.indexed_dates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_empties_index() {
        let (_tmp, index) = test_index().await;
        index
            .index_session(&session("2025-01-01", &[("Editor", "alpha")]))
            .await
            .unwrap();
        index.reset().await.unwrap();
        assert!(index.indexed_dates().await.unwrap().is_empty());
        assert_eq!(index.search("alpha", 1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_empty_term_and_bad_page_rejected() {
        let (_tmp, index) = test_index().await;
        assert!(matches!(
            index.search("   ", 1, 10).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            index.search("x", 0, 10).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_table_reported_as_corruption() {
        let (_tmp, index) = test_index().await;
        sqlx::query("DROP TABLE session_fts")
            .execute(&index.pool)
            .await
            .unwrap();

        let s = session("2025-01-01", &[("Editor", "alpha")]);
        assert!(matches!(
            index.index_session(&s).await,
            Err(Error::Corruption(_))
        ));
        assert!(matches!(
            index.search("alpha", 1, 10).await,
            Err(Error::Corruption(_))
        ));
        assert!(matches!(
            index.indexed_dates().await,
            Err(Error::Corruption(_))
        ));

        index.reset().await.unwrap();
        assert!(index.index_session(&s).await.unwrap());
        assert_eq!(index.search("alpha", 1, 10).await.unwrap().total, 1);
    }
}
