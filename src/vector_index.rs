//! Vector index: one embedding per content block, in its own database.
//!
//! Vectors are stored as little-endian f32 BLOBs and ranked in process by
//! cosine similarity. Candidates are narrowed in SQL first (date range, app,
//! model) so the filter applies before ranking, never after truncation.
//!
//! Each row records the SHA-256 of the text that was embedded. A block whose
//! embedding text has since changed (for example, a summary arrived) shows up
//! as stale in [`VectorIndex::hashes`] and is re-embedded.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::Result;
use crate::models::{ContentBlock, SearchFilter, SearchResult, DATE_FORMAT};

/// Maximum characters of embedding text kept as a result snippet.
const SNIPPET_CHARS: usize = 240;

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace the embedding for `block`.
    pub async fn upsert(
        &self,
        block: &ContentBlock,
        vector: &[f32],
        model: &str,
        content_hash: &str,
        text: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO block_vectors
                (block_key, date, app, start_ms, model, dims, content_hash, snippet, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(block_key) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                snippet = excluded.snippet,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(block.key().to_string())
        .bind(&block.date)
        .bind(&block.app)
        .bind(block.start.timestamp_millis())
        .bind(model)
        .bind(vector.len() as i64)
        .bind(content_hash)
        .bind(snippet(text))
        .bind(vec_to_blob(vector))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop every vector for `date`.
    pub async fn remove_date(&self, date: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM block_vectors WHERE date = ?")
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn remove_keys(&self, keys: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            removed += sqlx::query("DELETE FROM block_vectors WHERE block_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// `block_key -> content_hash` for vectors produced by `model`.
    pub async fn hashes(&self, model: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT block_key, content_hash FROM block_vectors WHERE model = ?")
            .bind(model)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("block_key"), row.get("content_hash")))
            .collect())
    }

    /// `(block_key, date)` of every stored vector, any model.
    pub async fn keys(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT block_key, date FROM block_vectors ORDER BY block_key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("block_key"), row.get("date")))
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM block_vectors")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Rank stored vectors of `model` against `query`, best first.
    ///
    /// Ties are broken by date (most recent first), then block key, so
    /// repeated queries return identical orderings.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
        model: &str,
    ) -> Result<Vec<SearchResult>> {
        let since = filter.since.map(|d| d.format(DATE_FORMAT).to_string());
        let until = filter.until.map(|d| d.format(DATE_FORMAT).to_string());

        let rows = sqlx::query(
            r#"
            SELECT block_key, date, app, start_ms, snippet, embedding
            FROM block_vectors
            WHERE model = ?
              AND (? IS NULL OR date >= ?)
              AND (? IS NULL OR date <= ?)
              AND (? IS NULL OR app = ?)
            "#,
        )
        .bind(model)
        .bind(&since)
        .bind(&since)
        .bind(&until)
        .bind(&until)
        .bind(&filter.app)
        .bind(&filter.app)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, String, SearchResult)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            let similarity = cosine_similarity(query, &stored);
            let start_ms: i64 = row.get("start_ms");
            scored.push((
                similarity,
                row.get("block_key"),
                SearchResult {
                    date: row.get("date"),
                    app: Some(row.get("app")),
                    block_id: Some(start_ms.to_string()),
                    score: similarity as f64,
                    snippet: row.get("snippet"),
                },
            ));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.date.cmp(&a.2.date))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, _, result)| result).collect())
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::ms_to_datetime;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn test_index() -> (TempDir, VectorIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("vectors.sqlite"), 2)
            .await
            .unwrap();
        migrate::migrate_vectors(&pool).await.unwrap();
        (tmp, VectorIndex::new(pool))
    }

    fn block(date: &str, app: &str, start_ms: i64) -> ContentBlock {
        ContentBlock {
            date: date.to_string(),
            app: app.to_string(),
            block_id: start_ms.to_string(),
            start: ms_to_datetime(start_ms),
            end: ms_to_datetime(start_ms + 1000),
            ocr_text: String::new(),
            summary: None,
            screenshots: vec![],
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity_and_breaks_ties() {
        let (_tmp, index) = test_index().await;
        index
            .upsert(&block("2025-01-01", "A", 1), &[1.0, 0.0], "m", "h1", "first")
            .await
            .unwrap();
        index
            .upsert(&block("2025-01-02", "A", 2), &[1.0, 0.0], "m", "h2", "second")
            .await
            .unwrap();
        index
            .upsert(&block("2025-01-03", "B", 3), &[0.0, 1.0], "m", "h3", "third")
            .await
            .unwrap();

        let results = index
            .search(&[1.0, 0.0], 10, &SearchFilter::default(), "m")
            .await
            .unwrap();
        let dates: Vec<&str> = results.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-02", "2025-01-01", "2025-01-03"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[0].block_id.as_deref(), Some("2"));
        assert_eq!(results[0].snippet, "second");

        let top1 = index
            .search(&[1.0, 0.0], 1, &SearchFilter::default(), "m")
            .await
            .unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_applies_before_truncation() {
        let (_tmp, index) = test_index().await;
        for (i, date) in ["2025-01-01", "2025-01-02", "2025-01-03"].iter().enumerate() {
            index
                .upsert(&block(date, "A", i as i64), &[1.0, 0.0], "m", "h", "x")
                .await
                .unwrap();
        }
        index
            .upsert(&block("2025-01-01", "B", 9), &[0.2, 1.0], "m", "h", "x")
            .await
            .unwrap();

        let filter = SearchFilter {
            app: Some("B".into()),
            ..Default::default()
        };
        let results = index.search(&[1.0, 0.0], 1, &filter, "m").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].app.as_deref(), Some("B"));

        let filter = SearchFilter {
            since: NaiveDate::from_ymd_opt(2025, 1, 2),
            until: NaiveDate::from_ymd_opt(2025, 1, 2),
            app: None,
        };
        let results = index.search(&[1.0, 0.0], 10, &filter, "m").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].date, "2025-01-02");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_model_isolates() {
        let (_tmp, index) = test_index().await;
        let b = block("2025-01-01", "A", 1);
        index.upsert(&b, &[1.0], "m", "old", "x").await.unwrap();
        index.upsert(&b, &[1.0], "m", "new", "x").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.hashes("m").await.unwrap()[&b.key().to_string()], "new");
        assert!(index.hashes("other").await.unwrap().is_empty());
        assert!(index
            .search(&[1.0], 5, &SearchFilter::default(), "other")
            .await
            .unwrap()
            .is_empty());

        assert_eq!(index.remove_date("2025-01-01").await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(SNIPPET_CHARS + 10);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert_eq!(snippet("  short  "), "short");
    }
}
