//! SQLite connection management.
//!
//! Both the metadata database and the vector database are opened through
//! [`connect`]: WAL journal mode so readers never wait on the writer, a busy
//! timeout so concurrent writers on different dates queue instead of failing,
//! and parent directories created on demand.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// Open (creating if missing) the SQLite database at `db_path`.
pub async fn connect(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// On-disk footprint of a SQLite database: the main file plus its `-wal`
/// and `-shm` companions. Missing files count as zero.
pub fn footprint(db_path: &Path) -> u64 {
    let mut total = 0;
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        total += std::fs::metadata(PathBuf::from(name))
            .map(|m| m.len())
            .unwrap_or(0);
    }
    total
}
