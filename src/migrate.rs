//! Schema migrations for the metadata and vector databases.
//!
//! All statements are idempotent; running them against an existing database
//! is a no-op. The engine runs them on every `initialize()`.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

/// Create the session tables and the full-text index in the metadata database.
pub async fn migrate_metadata(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            date TEXT PRIMARY KEY,
            custom_title TEXT,
            custom_summary TEXT,
            manual_notes TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_blocks (
            date TEXT NOT NULL,
            app TEXT NOT NULL,
            block_id TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            ocr_text TEXT NOT NULL DEFAULT '',
            screenshots_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (date, app, block_id),
            FOREIGN KEY (date) REFERENCES sessions(date) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Summaries arrive later from the summarizer; keeping them out of
    // content_blocks leaves block rows append-only.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS block_summaries (
            date TEXT NOT NULL,
            app TEXT NOT NULL,
            block_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (date, app, block_id),
            FOREIGN KEY (date, app, block_id)
                REFERENCES content_blocks(date, app, block_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='session_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE session_fts USING fts5(
                date UNINDEXED,
                app UNINDEXED,
                block_id UNINDEXED,
                field UNINDEXED,
                text,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_blocks_date_app_start ON content_blocks(date, app, start_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the embedding table in the vector database.
pub async fn migrate_vectors(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS block_vectors (
            block_key TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            app TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            snippet TEXT NOT NULL DEFAULT '',
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_block_vectors_date ON block_vectors(date DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_block_vectors_app ON block_vectors(app)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create both databases and the blob directory (`daybook init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let meta = db::connect(&config.storage.metadata_db_path(), 1).await?;
    migrate_metadata(&meta).await?;
    meta.close().await;

    let vectors = db::connect(&config.storage.vector_db_path(), 1).await?;
    migrate_vectors(&vectors).await?;
    vectors.close().await;

    std::fs::create_dir_all(config.storage.files_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::for_root(tmp.path());
        run_migrations(&cfg).await.unwrap();
        run_migrations(&cfg).await.unwrap();

        let pool = db::connect(&cfg.storage.metadata_db_path(), 1).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('sessions', 'content_blocks', 'block_summaries', 'session_fts')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);
        pool.close().await;
        assert!(cfg.storage.files_dir().is_dir());
    }
}
