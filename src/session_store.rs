//! Structured session store: one row per date, append-only content blocks.
//!
//! This is the single source of truth. The full-text and vector indexes are
//! derived from what is stored here and can always be rebuilt from it.
//!
//! Every multi-statement operation runs inside one SQLite transaction, so a
//! reader sees either the state before a write or the state after it, never a
//! session with half of its blocks.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{
    canonical_date, ms_to_datetime, BlockKey, ContentBlock, NewBlock, Session, SessionPage,
    SessionPatch,
};

const BLOCK_COLUMNS: &str = r#"
    b.date, b.app, b.block_id, b.start_ms, b.end_ms, b.ocr_text, b.screenshots_json,
    s.summary AS summary
"#;

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch one session with all of its blocks.
    pub async fn get_session(&self, date: &str) -> Result<Session> {
        let date = canonical_date(date)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT date, custom_title, custom_summary, manual_notes, tags_json, created_at, updated_at FROM sessions WHERE date = ?",
        )
        .bind(&date)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("session {}", date)))?;

        let blocks = fetch_blocks(&mut tx, &date).await?;
        tx.commit().await?;

        row_to_session(&row, blocks)
    }

    /// Most-recent-first page of sessions. `page` is 1-indexed.
    pub async fn list_sessions(&self, page: i64, page_size: i64) -> Result<SessionPage> {
        if page <= 0 {
            return Err(Error::validation(format!("page must be >= 1, got {}", page)));
        }
        if page_size <= 0 {
            return Err(Error::validation(format!(
                "page_size must be >= 1, got {}",
                page_size
            )));
        }
        let offset = (page - 1).saturating_mul(page_size);

        // Count and page come from the same snapshot.
        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&mut *tx)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT date, custom_title, custom_summary, manual_notes, tags_json, created_at, updated_at
            FROM sessions
            ORDER BY date DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let date: String = row.get("date");
            let blocks = fetch_blocks(&mut tx, &date).await?;
            items.push(row_to_session(row, blocks)?);
        }
        tx.commit().await?;

        Ok(SessionPage { items, total })
    }

    /// Merge the provided fields into the session, creating a bare record if
    /// none exists. Blocks are never touched. An empty title or summary
    /// clears the override.
    pub async fn upsert_session(&self, date: &str, patch: &SessionPatch) -> Result<Session> {
        let date = canonical_date(date)?;
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        ensure_session_row(&mut tx, &date, now).await?;

        let row = sqlx::query(
            "SELECT custom_title, custom_summary, manual_notes, tags_json FROM sessions WHERE date = ?",
        )
        .bind(&date)
        .fetch_one(&mut *tx)
        .await?;

        let mut title: Option<String> = row.get("custom_title");
        let mut summary: Option<String> = row.get("custom_summary");
        let mut notes: String = row.get("manual_notes");
        let mut tags_json: String = row.get("tags_json");

        if let Some(t) = &patch.custom_title {
            title = non_empty(t);
        }
        if let Some(s) = &patch.custom_summary {
            summary = non_empty(s);
        }
        if let Some(n) = &patch.manual_notes {
            notes = n.clone();
        }
        if let Some(tags) = &patch.tags {
            let mut cleaned: Vec<String> = tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            cleaned.sort();
            cleaned.dedup();
            tags_json = serde_json::to_string(&cleaned)?;
        }

        sqlx::query(
            r#"
            UPDATE sessions
            SET custom_title = ?, custom_summary = ?, manual_notes = ?, tags_json = ?, updated_at = ?
            WHERE date = ?
            "#,
        )
        .bind(&title)
        .bind(&summary)
        .bind(&notes)
        .bind(&tags_json)
        .bind(now)
        .bind(&date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_session(&date).await
    }

    /// Append a block for `(date, app)`, creating the session if needed.
    ///
    /// Fails with `Validation` when the block's range overlaps an existing
    /// block of the same app on the same date. Ranges are half-open; two
    /// blocks sharing a start instant always conflict since the start
    /// instant is the block id.
    pub async fn append_content_block(
        &self,
        date: &str,
        app: &str,
        block: &NewBlock,
    ) -> Result<ContentBlock> {
        let date = canonical_date(date)?;
        let app = app.trim();
        if app.is_empty() {
            return Err(Error::validation("app name must not be empty"));
        }
        block.validate()?;

        let start_ms = block.start.timestamp_millis();
        let end_ms = block.end.timestamp_millis();
        let block_id = block.block_id();
        let now = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock before the
        // overlap check reads.
        ensure_session_row(&mut tx, &date, now).await?;

        let conflicts: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM content_blocks
            WHERE date = ? AND app = ?
              AND ((start_ms < ? AND ? < end_ms) OR start_ms = ?)
            "#,
        )
        .bind(&date)
        .bind(app)
        .bind(end_ms)
        .bind(start_ms)
        .bind(start_ms)
        .fetch_one(&mut *tx)
        .await?;

        if conflicts > 0 {
            return Err(Error::validation(format!(
                "block [{}, {}) for {} on {} overlaps an existing block",
                start_ms, end_ms, app, date
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO content_blocks
                (date, app, block_id, start_ms, end_ms, ocr_text, screenshots_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&date)
        .bind(app)
        .bind(&block_id)
        .bind(start_ms)
        .bind(end_ms)
        .bind(&block.ocr_text)
        .bind(serde_json::to_string(&block.screenshots)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE date = ?")
            .bind(now)
            .bind(&date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ContentBlock {
            date,
            app: app.to_string(),
            block_id,
            start: block.start,
            end: block.end,
            ocr_text: block.ocr_text.clone(),
            summary: None,
            screenshots: block.screenshots.clone(),
        })
    }

    /// Remove a session and all of its blocks and summaries.
    pub async fn delete_session(&self, date: &str) -> Result<()> {
        let date = canonical_date(date)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM block_summaries WHERE date = ?")
            .bind(&date)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM content_blocks WHERE date = ?")
            .bind(&date)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM sessions WHERE date = ?")
            .bind(&date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if deleted == 0 {
            return Err(Error::not_found(format!("session {}", date)));
        }
        Ok(())
    }

    pub async fn exists(&self, date: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT date FROM sessions WHERE date = ?")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?)
    }

    /// All session dates, most recent first.
    pub async fn session_dates(&self) -> Result<Vec<String>> {
        Ok(
            sqlx::query_scalar("SELECT date FROM sessions ORDER BY date DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn blocks_for(&self, date: &str) -> Result<Vec<ContentBlock>> {
        let mut conn = self.pool.acquire().await?;
        fetch_blocks(&mut conn, date).await
    }

    /// Every block in the store, most recent date first.
    pub async fn all_blocks(&self) -> Result<Vec<ContentBlock>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BLOCK_COLUMNS}
            FROM content_blocks b
            LEFT JOIN block_summaries s
                ON s.date = b.date AND s.app = b.app AND s.block_id = b.block_id
            ORDER BY b.date DESC, b.start_ms ASC, b.app ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_block).collect()
    }

    /// Latest end instant (ms) among blocks of `(date, app)`.
    pub async fn last_block_end(&self, date: &str, app: &str) -> Result<Option<i64>> {
        Ok(
            sqlx::query_scalar("SELECT MAX(end_ms) FROM content_blocks WHERE date = ? AND app = ?")
                .bind(date)
                .bind(app)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Attach (or replace) the generated summary of a block.
    pub async fn set_block_summary(&self, key: &BlockKey, summary: &str, model: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO block_summaries (date, app, block_id, summary, model, created_at)
            SELECT date, app, block_id, ?, ?, ?
            FROM content_blocks
            WHERE date = ? AND app = ? AND block_id = ?
            ON CONFLICT(date, app, block_id) DO UPDATE SET
                summary = excluded.summary,
                model = excluded.model,
                created_at = excluded.created_at
            "#,
        )
        .bind(summary)
        .bind(model)
        .bind(Utc::now().timestamp_millis())
        .bind(&key.date)
        .bind(&key.app)
        .bind(&key.block_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("block {}", key)));
        }
        Ok(())
    }

    /// Blocks with OCR text but no summary yet, oldest first.
    pub async fn blocks_missing_summary(&self, limit: i64) -> Result<Vec<ContentBlock>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BLOCK_COLUMNS}
            FROM content_blocks b
            LEFT JOIN block_summaries s
                ON s.date = b.date AND s.app = b.app AND s.block_id = b.block_id
            WHERE s.summary IS NULL AND length(trim(b.ocr_text)) > 0
            ORDER BY b.date ASC, b.start_ms ASC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_block).collect()
    }
}

async fn ensure_session_row(
    conn: &mut sqlx::SqliteConnection,
    date: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (date, created_at, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(date) DO NOTHING
        "#,
    )
    .bind(date)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_blocks(conn: &mut sqlx::SqliteConnection, date: &str) -> Result<Vec<ContentBlock>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {BLOCK_COLUMNS}
        FROM content_blocks b
        LEFT JOIN block_summaries s
            ON s.date = b.date AND s.app = b.app AND s.block_id = b.block_id
        WHERE b.date = ?
        ORDER BY b.start_ms ASC, b.app ASC
        "#
    ))
    .bind(date)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_block).collect()
}

fn row_to_block(row: &SqliteRow) -> Result<ContentBlock> {
    let screenshots_json: String = row.get("screenshots_json");
    Ok(ContentBlock {
        date: row.get("date"),
        app: row.get("app"),
        block_id: row.get("block_id"),
        start: ms_to_datetime(row.get("start_ms")),
        end: ms_to_datetime(row.get("end_ms")),
        ocr_text: row.get("ocr_text"),
        summary: row.get("summary"),
        screenshots: serde_json::from_str(&screenshots_json)?,
    })
}

fn row_to_session(row: &SqliteRow, blocks: Vec<ContentBlock>) -> Result<Session> {
    let tags_json: String = row.get("tags_json");
    Ok(Session {
        date: row.get("date"),
        custom_title: row.get("custom_title"),
        custom_summary: row.get("custom_summary"),
        manual_notes: row.get("manual_notes"),
        tags: serde_json::from_str(&tags_json)?,
        blocks,
        created_at: ms_to_datetime(row.get("created_at")),
        updated_at: ms_to_datetime(row.get("updated_at")),
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
