//! App blocklist for capture.
//!
//! Activity from a blocked app is dropped before it reaches storage. The
//! list is the union of `blocklist.apps` and, if configured, a file with one
//! app name per line (`#` starts a comment). The file is re-read once it is
//! older than `refresh_secs`; if the read fails the previous list is kept.

use log::{debug, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BlocklistConfig;

pub struct Blocklist {
    fixed: HashSet<String>,
    path: Option<PathBuf>,
    refresh: Duration,
    cached: Mutex<Cached>,
    refreshing: tokio::sync::Mutex<()>,
}

struct Cached {
    apps: HashSet<String>,
    loaded_at: Option<Instant>,
}

impl Blocklist {
    pub fn new(config: &BlocklistConfig) -> Self {
        Self {
            fixed: config.apps.iter().map(|a| normalize(a)).collect(),
            path: config.path.clone(),
            refresh: Duration::from_secs(config.refresh_secs),
            cached: Mutex::new(Cached {
                apps: HashSet::new(),
                loaded_at: None,
            }),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    /// A blocklist that blocks nothing.
    pub fn empty() -> Self {
        Self::new(&BlocklistConfig::default())
    }

    /// Case-insensitive check against the configured apps.
    pub async fn is_blocked(&self, app: &str) -> bool {
        let app = normalize(app);
        if self.fixed.contains(&app) {
            return true;
        }
        let Some(path) = &self.path else {
            return false;
        };

        if self.is_stale() {
            let _refreshing = self.refreshing.lock().await;
            // Another caller may have refreshed while we waited.
            if self.is_stale() {
                let loaded = tokio::fs::read_to_string(path).await;
                let mut cached = self.cache();
                match loaded {
                    Ok(content) => {
                        cached.apps = parse_list(&content);
                        debug!(
                            "Loaded {} blocked apps from {}",
                            cached.apps.len(),
                            path.display()
                        );
                    }
                    Err(e) => warn!(
                        "Failed to read blocklist {}: {} (keeping previous list)",
                        path.display(),
                        e
                    ),
                }
                cached.loaded_at = Some(Instant::now());
            }
        }
        self.cache().apps.contains(&app)
    }

    fn is_stale(&self) -> bool {
        self.cache()
            .loaded_at
            .map(|t| t.elapsed() >= self.refresh)
            .unwrap_or(true)
    }

    fn cache(&self) -> MutexGuard<'_, Cached> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(app: &str) -> String {
    app.trim().to_lowercase()
}

fn parse_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(normalize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fixed_apps_case_insensitive() {
        let bl = Blocklist::new(&BlocklistConfig {
            apps: vec!["1Password".into()],
            ..Default::default()
        });
        assert!(bl.is_blocked("1password").await);
        assert!(bl.is_blocked(" 1PASSWORD ").await);
        assert!(!bl.is_blocked("Browser").await);
        assert!(!Blocklist::empty().is_blocked("anything").await);
    }

    #[tokio::test]
    async fn test_file_list_refresh_and_failed_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked.txt");
        std::fs::write(&path, "# private\nBanking\n\nChat  # work chat\n").unwrap();

        let bl = Blocklist::new(&BlocklistConfig {
            apps: vec![],
            path: Some(path.clone()),
            refresh_secs: 0,
        });
        assert!(bl.is_blocked("banking").await);
        assert!(bl.is_blocked("Chat").await);

        std::fs::write(&path, "Mail\n").unwrap();
        assert!(bl.is_blocked("Mail").await);
        assert!(!bl.is_blocked("Banking").await);

        std::fs::remove_file(&path).unwrap();
        assert!(bl.is_blocked("Mail").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_share_one_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blocked.txt");
        std::fs::write(&path, "Banking\n").unwrap();

        let bl = std::sync::Arc::new(Blocklist::new(&BlocklistConfig {
            apps: vec![],
            path: Some(path),
            refresh_secs: 300,
        }));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let bl = bl.clone();
                tokio::spawn(async move {
                    let app = if i % 2 == 0 { "Banking" } else { "Editor" };
                    (i, bl.is_blocked(app).await)
                })
            })
            .collect();
        for handle in handles {
            let (i, blocked) = handle.await.unwrap();
            assert_eq!(blocked, i % 2 == 0);
        }
        let first_load = bl.cache().loaded_at;
        assert!(first_load.is_some());
        assert!(bl.is_blocked("banking").await);
        assert_eq!(bl.cache().loaded_at, first_load);
    }
}
