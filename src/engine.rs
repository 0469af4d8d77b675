//! The storage engine: one facade over the session store, the full-text and
//! vector indexes, and the blob store.
//!
//! # Write path
//!
//! The session store is the durability anchor. A failed session write fails
//! the call and nothing else is attempted. Once it succeeds, the full-text
//! index is updated in line; if that fails the call still succeeds, the
//! failure is logged, and the date is queued for the index worker. Vectors
//! are produced later by [`StorageEngine::embed_pending`] (or the embed
//! worker), so a fresh block is briefly absent from semantic results.
//!
//! # Concurrency
//!
//! Writes are serialized per date by an async mutex keyed on the date;
//! writes to different dates run in parallel. Reads never take these locks.
//! Every store operation is a single SQLite transaction, so readers see
//! whole records.
//!
//! # Deletion
//!
//! `delete_session` removes secondary entries (vectors, then full-text
//! rows) before the session itself, then the screenshot files. A crash
//! between steps leaves either an unindexed session, which reconciliation
//! re-indexes, or orphaned assets, which reconciliation removes. Secondary
//! entries never outlive their session.

use chrono::{NaiveTime, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::blob_store::BlobStore;
use crate::blocklist::Blocklist;
use crate::config::Config;
use crate::db;
use crate::embed_cmd::{find_pending, BackfillReport};
use crate::embedding::{create_provider, embed_query, Embedder};
use crate::error::{Error, Result};
use crate::fulltext::FullTextIndex;
use crate::migrate;
use crate::models::{
    canonical_date, ms_to_datetime, parse_date, ContentBlock, NewBlock, SearchFilter, SearchPage,
    SearchResult, Session, SessionPage, SessionPatch,
};
use crate::monitor::StorageMetrics;
use crate::session_store::SessionStore;
use crate::summarize::{create_summarizer, Summarizer};
use crate::vector_index::VectorIndex;
use crate::worker::{Job, Worker};

/// Blocks handled per background embed/summarize tick.
const JOB_BATCH_LIMIT: usize = 256;
/// The index worker runs a full reconciliation on its first tick and then
/// every this many ticks; other ticks only drain the reindex queue.
const RECONCILE_EVERY: u64 = 20;

struct Stores {
    sessions: SessionStore,
    fulltext: FullTextIndex,
    vectors: VectorIndex,
    blobs: BlobStore,
}

#[derive(Default)]
struct DateLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DateLocks {
    async fn lock(&self, date: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(date.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// What a reconciliation pass repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub fts_removed: u64,
    pub vectors_removed: u64,
    pub asset_dirs_removed: u64,
    pub reindexed: usize,
}

pub struct StorageEngine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    summarizer: Option<Arc<dyn Summarizer>>,
    blocklist: Arc<Blocklist>,
    state: RwLock<Option<Arc<Stores>>>,
    workers: Mutex<Vec<Worker>>,
    locks: DateLocks,
    dirty: std::sync::Mutex<BTreeSet<String>>,
    needs_rebuild: AtomicBool,
}

impl StorageEngine {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        summarizer: Option<Arc<dyn Summarizer>>,
        blocklist: Arc<Blocklist>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            embedder,
            summarizer,
            blocklist,
            state: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
            locks: DateLocks::default(),
            dirty: std::sync::Mutex::new(BTreeSet::new()),
            needs_rebuild: AtomicBool::new(false),
        })
    }

    /// Build an engine with the providers named in `config`. Not yet initialized.
    pub fn from_config(config: Config) -> anyhow::Result<Arc<Self>> {
        let embedder = create_provider(&config.embedding)?;
        let summarizer = create_summarizer(&config.summarizer)?;
        let blocklist = Arc::new(Blocklist::new(&config.blocklist));
        Ok(Self::new(config, embedder, summarizer, blocklist))
    }

    /// [`StorageEngine::from_config`] followed by [`StorageEngine::initialize`].
    pub async fn open(config: Config) -> anyhow::Result<Arc<Self>> {
        let engine = Self::from_config(config)?;
        engine.initialize().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Open both databases, run migrations, create the blob directory and
    /// start the background workers. Calling it again is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let storage = &self.config.storage;
        let meta = db::connect(&storage.metadata_db_path(), storage.max_connections).await?;
        migrate::migrate_metadata(&meta).await?;
        let vectors = db::connect(&storage.vector_db_path(), storage.max_connections).await?;
        migrate::migrate_vectors(&vectors).await?;
        tokio::fs::create_dir_all(storage.files_dir()).await?;

        *state = Some(Arc::new(Stores {
            sessions: SessionStore::new(meta.clone()),
            fulltext: FullTextIndex::new(meta),
            vectors: VectorIndex::new(vectors),
            blobs: BlobStore::new(storage.files_dir()),
        }));
        drop(state);

        info!(
            "Storage engine initialized at {} (embedder: {})",
            storage.root.display(),
            self.embedder.model_name()
        );

        if self.config.workers.enabled {
            self.start_workers().await;
        }
        Ok(())
    }

    /// Stop the workers, then release both databases. In-flight worker runs
    /// are abandoned; their open transactions roll back.
    pub async fn close(&self) -> Result<()> {
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            let name = worker.name().to_string();
            if let Err(e) = worker.stop().await {
                warn!("Worker {} did not stop cleanly: {:#}", name, e);
            }
        }

        let stores = self.state.write().await.take();
        if let Some(stores) = stores {
            stores.sessions.pool().close().await;
            stores.vectors.pool().close().await;
            info!("Storage engine closed");
        }
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn stores(&self) -> Result<Arc<Stores>> {
        self.state
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(Error::NotInitialized)
    }

    // ============ Reads ============

    pub async fn get_session(&self, date: &str) -> Result<Session> {
        let stores = self.stores().await?;
        stores.sessions.get_session(date).await
    }

    pub async fn session_exists(&self, date: &str) -> Result<bool> {
        let stores = self.stores().await?;
        stores.sessions.exists(&canonical_date(date)?).await
    }

    pub async fn list_sessions(&self, page: i64, page_size: i64) -> Result<SessionPage> {
        let stores = self.stores().await?;
        self.check_page_size(page_size)?;
        stores.sessions.list_sessions(page, page_size).await
    }

    pub async fn full_text_search(&self, term: &str, page: i64, page_size: i64) -> Result<SearchPage> {
        let stores = self.stores().await?;
        self.check_page_size(page_size)?;
        stores.fulltext.search(term, page, page_size).await.map_err(|e| {
            if e.is_corruption() {
                warn!("Full-text index is corrupt, scheduling rebuild: {}", e);
                self.needs_rebuild.store(true, Ordering::SeqCst);
            }
            e
        })
    }

    /// Embed `term` and rank stored block vectors against it.
    ///
    /// Fails with `ServiceUnavailable` when the provider is disabled, errors,
    /// or does not answer within `embedding.query_timeout_ms`.
    pub async fn semantic_search(
        &self,
        term: &str,
        top_k: i64,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>> {
        let stores = self.stores().await?;
        if top_k <= 0 {
            return Err(Error::validation(format!("top_k must be >= 1, got {}", top_k)));
        }
        if term.trim().is_empty() {
            return Err(Error::validation("search term must not be empty"));
        }
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Err(Error::validation(format!(
                    "filter since {} is after until {}",
                    since, until
                )));
            }
        }
        if !self.embedder.is_enabled() {
            return Err(Error::unavailable("embedding provider is disabled"));
        }

        let timeout = self.config.embedding.query_timeout();
        let embedded = tokio::time::timeout(timeout, embed_query(self.embedder.as_ref(), term)).await;
        let query = match embedded {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!("Query embedding failed: {:#}", e);
                return Err(Error::unavailable(format!("embedding provider failed: {}", e)));
            }
            Err(_) => {
                warn!("Query embedding timed out after {}ms", timeout.as_millis());
                return Err(Error::unavailable(format!(
                    "embedding provider did not answer within {}ms",
                    timeout.as_millis()
                )));
            }
        };

        stores
            .vectors
            .search(&query, top_k as usize, filter, self.embedder.model_name())
            .await
    }

    pub async fn read_screenshot(&self, date: &str, app: &str, filename: &str) -> Result<Vec<u8>> {
        let stores = self.stores().await?;
        stores.blobs.read(date, app, filename).await
    }

    pub async fn list_assets(&self, date: &str) -> Result<Vec<String>> {
        let stores = self.stores().await?;
        stores.blobs.list_assets(date).await
    }

    pub async fn vector_count(&self) -> Result<i64> {
        let stores = self.stores().await?;
        stores.vectors.count().await
    }

    /// Dates whose full-text rows are known to be behind, oldest first.
    pub fn pending_reindex(&self) -> Vec<String> {
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn check_page_size(&self, page_size: i64) -> Result<()> {
        let max = self.config.retrieval.max_page_size;
        if page_size > max {
            return Err(Error::validation(format!(
                "page_size must be <= {}, got {}",
                max, page_size
            )));
        }
        Ok(())
    }

    // ============ Writes ============

    pub async fn upsert_session(&self, date: &str, patch: &SessionPatch) -> Result<Session> {
        let stores = self.stores().await?;
        let date = canonical_date(date)?;
        let _guard = self.locks.lock(&date).await;

        let session = stores.sessions.upsert_session(&date, patch).await?;
        if let Err(e) = stores.fulltext.index_session(&session).await {
            self.index_failed(&date, &e);
        }
        Ok(session)
    }

    pub async fn append_content_block(
        &self,
        date: &str,
        app: &str,
        block: &NewBlock,
    ) -> Result<ContentBlock> {
        let stores = self.stores().await?;
        let date = canonical_date(date)?;
        let _guard = self.locks.lock(&date).await;

        let written = stores.sessions.append_content_block(&date, app, block).await?;
        self.refresh_fulltext(&stores, &date).await;
        Ok(written)
    }

    /// Capture pipeline entry point. Activity from a blocklisted app is
    /// dropped and `Ok(None)` returned.
    pub async fn record_activity(
        &self,
        date: &str,
        app: &str,
        block: &NewBlock,
    ) -> Result<Option<ContentBlock>> {
        if self.blocklist.is_blocked(app).await {
            debug!("Dropping activity from blocklisted app {}", app);
            return Ok(None);
        }
        self.append_content_block(date, app, block).await.map(Some)
    }

    /// Store a screenshot and record it as a zero-length block for `app`.
    ///
    /// The asset is written first; a failed asset write fails the call
    /// before anything references it. Saving over an existing screenshot
    /// replaces the file and keeps the block that already references it.
    pub async fn save_screenshot(
        &self,
        date: &str,
        app: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<String> {
        let stores = self.stores().await?;
        let day = parse_date(date)?;
        let date = canonical_date(date)?;
        let app = app.trim();
        let _guard = self.locks.lock(&date).await;

        let reference = stores.blobs.save(&date, app, filename, data).await?;

        let referenced = stores
            .sessions
            .blocks_for(&date)
            .await?
            .iter()
            .any(|b| b.app == app && b.screenshots.contains(&reference));
        if referenced {
            debug!("Replaced screenshot {} ({} bytes)", reference, data.len());
            return Ok(reference);
        }

        let now = Utc::now();
        let base = if now.date_naive() == day {
            now.timestamp_millis()
        } else {
            day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
        };
        let start_ms = match stores.sessions.last_block_end(&date, app).await? {
            Some(end) => base.max(end + 1),
            None => base,
        };
        let at = ms_to_datetime(start_ms);
        let block = NewBlock {
            start: at,
            end: at,
            ocr_text: String::new(),
            screenshots: vec![reference.clone()],
        };
        stores.sessions.append_content_block(&date, app, &block).await?;
        self.refresh_fulltext(&stores, &date).await;

        debug!("Saved screenshot {} ({} bytes)", reference, data.len());
        Ok(reference)
    }

    /// Remove a session from every store. Fails with `NotFound` if there was
    /// no session; stray index rows and assets for the date are removed
    /// either way.
    pub async fn delete_session(&self, date: &str) -> Result<()> {
        let stores = self.stores().await?;
        let date = canonical_date(date)?;
        let _guard = self.locks.lock(&date).await;

        if let Err(e) = stores.vectors.remove_date(&date).await {
            warn!("Failed to remove vectors for {} (reconcile will retry): {}", date, e);
        }
        if let Err(e) = stores.fulltext.remove(&date).await {
            warn!("Failed to remove full-text rows for {} (reconcile will retry): {}", date, e);
            if e.is_corruption() {
                self.needs_rebuild.store(true, Ordering::SeqCst);
            }
        }

        let removed = stores.sessions.delete_session(&date).await;
        if matches!(&removed, Err(e) if !e.is_not_found()) {
            // Index rows are already gone for a session that still exists.
            self.mark_dirty(&date);
            return removed;
        }

        stores.blobs.delete_assets_for(&date).await?;
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&date);

        if removed.is_ok() {
            info!("Deleted session {}", date);
        }
        removed
    }

    // ============ Index maintenance ============

    /// Bring the full-text rows of one date in line with the session store.
    /// Returns whether anything was rewritten.
    pub async fn reindex(&self, date: &str) -> Result<bool> {
        let stores = self.stores().await?;
        let date = canonical_date(date)?;
        let _guard = self.locks.lock(&date).await;
        self.reindex_locked(&stores, &date).await.map_err(|e| {
            self.index_failed(&date, &e);
            e
        })
    }

    /// Recreate the full-text index from scratch. Returns the number of
    /// sessions indexed.
    pub async fn rebuild_indexes(&self) -> Result<usize> {
        let stores = self.stores().await?;
        self.needs_rebuild.store(false, Ordering::SeqCst);
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let rebuilt = self.rebuild_all(&stores).await;
        if rebuilt.is_err() {
            self.needs_rebuild.store(true, Ordering::SeqCst);
        }
        rebuilt
    }

    async fn rebuild_all(&self, stores: &Stores) -> Result<usize> {
        stores.fulltext.reset().await?;
        let dates = stores.sessions.session_dates().await?;
        for date in &dates {
            let _guard = self.locks.lock(date).await;
            self.reindex_locked(stores, date).await?;
        }
        info!("Rebuilt full-text index for {} sessions", dates.len());
        Ok(dates.len())
    }

    /// Reindex queued dates, or rebuild everything if corruption was seen.
    pub async fn catch_up(&self) -> Result<usize> {
        if self.needs_rebuild.load(Ordering::SeqCst) {
            return self.rebuild_indexes().await;
        }

        let stores = self.stores().await?;
        let queued = std::mem::take(&mut *self.dirty.lock().unwrap_or_else(PoisonError::into_inner));
        let mut reindexed = 0;
        for date in queued {
            let _guard = self.locks.lock(&date).await;
            match self.reindex_locked(&stores, &date).await {
                Ok(_) => reindexed += 1,
                Err(e) => {
                    warn!("Reindex of {} failed, will retry: {}", date, e);
                    self.index_failed(&date, &e);
                }
            }
        }

        if self.needs_rebuild.load(Ordering::SeqCst) {
            return self.rebuild_indexes().await;
        }
        Ok(reindexed)
    }

    /// Repair every derived region against the session store: drop
    /// full-text rows, vectors and asset directories whose session is gone,
    /// index live sessions the full-text index is missing, and drain the
    /// reindex queue.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let stores = self.stores().await?;
        let mut report = ReconcileReport::default();

        let live: HashSet<String> = stores.sessions.session_dates().await?.into_iter().collect();
        match stores.fulltext.indexed_dates().await {
            Ok(indexed) => {
                let indexed: HashSet<String> = indexed.into_iter().collect();
                for date in indexed.difference(&live) {
                    let _guard = self.locks.lock(date).await;
                    if !stores.sessions.exists(date).await? {
                        report.fts_removed += stores.fulltext.remove(date).await?;
                    }
                }
                for date in live.difference(&indexed) {
                    self.mark_dirty(date);
                }
            }
            Err(e) => {
                // The catch-up below rebuilds a corrupt index.
                warn!("Cannot read full-text index during reconcile: {}", e);
                if e.is_corruption() {
                    self.needs_rebuild.store(true, Ordering::SeqCst);
                } else {
                    return Err(e);
                }
            }
        }

        let live_keys: HashSet<String> = stores
            .sessions
            .all_blocks()
            .await?
            .iter()
            .map(|b| b.key().to_string())
            .collect();
        let orphans: Vec<String> = stores
            .vectors
            .keys()
            .await?
            .into_iter()
            .filter(|(key, _)| !live_keys.contains(key))
            .map(|(key, _)| key)
            .collect();
        if !orphans.is_empty() {
            report.vectors_removed = stores.vectors.remove_keys(&orphans).await?;
        }

        for date in stores.blobs.dates().await? {
            if live.contains(&date) {
                continue;
            }
            let _guard = self.locks.lock(&date).await;
            if !stores.sessions.exists(&date).await? {
                stores.blobs.delete_assets_for(&date).await?;
                report.asset_dirs_removed += 1;
            }
        }

        report.reindexed = self.catch_up().await?;

        if report != ReconcileReport::default() {
            info!(
                "Reconciled: {} fts rows removed, {} vectors removed, {} asset dirs removed, {} dates reindexed",
                report.fts_removed, report.vectors_removed, report.asset_dirs_removed, report.reindexed
            );
        }
        Ok(report)
    }

    /// Embed blocks whose vector is missing or stale, in
    /// `embedding.batch_size` batches. A failed batch is logged and skipped.
    pub async fn embed_pending(&self, limit: Option<usize>) -> Result<BackfillReport> {
        self.embed_where(limit, |_| true).await
    }

    /// Like [`embed_pending`](Self::embed_pending), restricted to `dates`.
    pub async fn embed_pending_for(&self, dates: &[String]) -> Result<BackfillReport> {
        let dates: HashSet<&str> = dates.iter().map(String::as_str).collect();
        self.embed_where(None, |block| dates.contains(block.date.as_str()))
            .await
    }

    async fn embed_where(
        &self,
        limit: Option<usize>,
        keep: impl Fn(&ContentBlock) -> bool,
    ) -> Result<BackfillReport> {
        let stores = self.stores().await?;
        if !self.embedder.is_enabled() {
            return Err(Error::unavailable("embedding provider is disabled"));
        }
        let model = self.embedder.model_name().to_string();
        let pending = find_pending(&stores.sessions, &stores.vectors, &model, limit, keep).await?;

        let mut report = BackfillReport {
            pending: pending.len() as u64,
            ..Default::default()
        };

        for batch in pending.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(v) if v.len() == batch.len() => v,
                Ok(v) => {
                    warn!(
                        "Embedding batch returned {} vectors for {} texts",
                        v.len(),
                        batch.len()
                    );
                    report.failed += batch.len() as u64;
                    continue;
                }
                Err(e) => {
                    warn!("Embedding batch failed: {:#}", e);
                    report.failed += batch.len() as u64;
                    continue;
                }
            };

            for (item, vector) in batch.iter().zip(vectors.iter()) {
                let _guard = self.locks.lock(&item.block.date).await;
                // Deleted while the batch was in flight.
                if !stores.sessions.exists(&item.block.date).await? {
                    continue;
                }
                match stores
                    .vectors
                    .upsert(&item.block, vector, &model, &item.text_hash, &item.text)
                    .await
                {
                    Ok(()) => report.done += 1,
                    Err(e) => {
                        warn!("Failed to store embedding for {}: {}", item.block.key(), e);
                        report.failed += 1;
                    }
                }
            }
        }

        if report.pending > 0 {
            info!(
                "Embedded {} of {} pending blocks ({} failed)",
                report.done, report.pending, report.failed
            );
        }
        Ok(report)
    }

    /// Summarize blocks that have text but no summary yet.
    pub async fn summarize_pending(&self, limit: Option<usize>) -> Result<BackfillReport> {
        let stores = self.stores().await?;
        let Some(summarizer) = &self.summarizer else {
            return Err(Error::unavailable("summarizer is disabled"));
        };

        let limit = limit.map(|l| l as i64).unwrap_or(i64::MAX);
        let blocks = stores.sessions.blocks_missing_summary(limit).await?;
        let mut report = BackfillReport {
            pending: blocks.len() as u64,
            ..Default::default()
        };
        let mut touched = BTreeSet::new();

        for block in &blocks {
            let summary = match summarizer.summarize(block).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("Summarizing {} failed: {:#}", block.key(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let _guard = self.locks.lock(&block.date).await;
            match stores
                .sessions
                .set_block_summary(&block.key(), &summary, summarizer.model_name())
                .await
            {
                Ok(()) => {
                    report.done += 1;
                    touched.insert(block.date.clone());
                }
                Err(e) if e.is_not_found() => {
                    debug!("Block {} was deleted before its summary arrived", block.key())
                }
                Err(e) => return Err(e),
            }
        }

        for date in &touched {
            let _guard = self.locks.lock(date).await;
            self.refresh_fulltext(&stores, date).await;
        }
        Ok(report)
    }

    /// On-disk footprint of every region, computed now.
    pub async fn storage_metrics(&self) -> Result<StorageMetrics> {
        let stores = self.stores().await?;
        let db_size = db::footprint(&self.config.storage.metadata_db_path());
        let vector_db_size = db::footprint(&self.config.storage.vector_db_path());
        let files = stores.blobs.footprint().await?;
        let session_count = stores.sessions.count().await?;

        Ok(StorageMetrics {
            db_size,
            vector_db_size,
            files_size: files.bytes,
            total_size: db_size + vector_db_size + files.bytes,
            session_count,
            total_files: files.files,
            timestamp: Utc::now(),
        })
    }

    // ============ Internals ============

    async fn reindex_locked(&self, stores: &Stores, date: &str) -> Result<bool> {
        match stores.sessions.get_session(date).await {
            Ok(session) => stores.fulltext.index_session(&session).await,
            Err(e) if e.is_not_found() => Ok(stores.fulltext.remove(date).await? > 0),
            Err(e) => Err(e),
        }
    }

    /// Re-derive one date's full-text rows after a successful primary write.
    /// Failures are queued, never returned.
    async fn refresh_fulltext(&self, stores: &Stores, date: &str) {
        if let Err(e) = self.reindex_locked(stores, date).await {
            self.index_failed(date, &e);
        }
    }

    fn index_failed(&self, date: &str, err: &Error) {
        warn!("Full-text update for {} failed, queued for reindex: {}", date, err);
        self.mark_dirty(date);
        if err.is_corruption() {
            self.needs_rebuild.store(true, Ordering::SeqCst);
        }
    }

    fn mark_dirty(&self, date: &str) {
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(date.to_string());
    }

    async fn start_workers(self: &Arc<Self>) {
        let cfg = &self.config.workers;
        let tick_timeout = Duration::from_secs(cfg.tick_timeout_secs);
        let engine = Arc::downgrade(self);
        let mut workers = self.workers.lock().await;

        workers.push(Worker::spawn(
            Arc::new(IndexJob {
                engine: engine.clone(),
                ticks: AtomicU64::new(0),
            }),
            Duration::from_secs(cfg.index_interval_secs),
            tick_timeout,
        ));
        if self.embedder.is_enabled() {
            workers.push(Worker::spawn(
                Arc::new(EmbedJob {
                    engine: engine.clone(),
                }),
                Duration::from_secs(cfg.embed_interval_secs),
                tick_timeout,
            ));
        }
        if self.summarizer.is_some() {
            workers.push(Worker::spawn(
                Arc::new(SummarizeJob { engine }),
                Duration::from_secs(cfg.summarize_interval_secs),
                tick_timeout,
            ));
        }
    }
}

struct IndexJob {
    engine: Weak<StorageEngine>,
    ticks: AtomicU64,
}

#[async_trait::async_trait]
impl Job for IndexJob {
    fn name(&self) -> &str {
        "index"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        if tick % RECONCILE_EVERY == 0 {
            engine.reconcile().await?;
        } else {
            engine.catch_up().await?;
        }
        Ok(())
    }
}

struct EmbedJob {
    engine: Weak<StorageEngine>,
}

#[async_trait::async_trait]
impl Job for EmbedJob {
    fn name(&self) -> &str {
        "embed"
    }

    async fn run(&self) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.upgrade() {
            engine.embed_pending(Some(JOB_BATCH_LIMIT)).await?;
        }
        Ok(())
    }
}

struct SummarizeJob {
    engine: Weak<StorageEngine>,
}

#[async_trait::async_trait]
impl Job for SummarizeJob {
    fn name(&self) -> &str {
        "summarize"
    }

    async fn run(&self) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.upgrade() {
            engine.summarize_pending(Some(JOB_BATCH_LIMIT)).await?;
        }
        Ok(())
    }
}
