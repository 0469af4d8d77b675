//! TOML configuration parsing and validation.
//!
//! Every section except `[storage]` is optional and falls back to the
//! defaults below. [`load_config`] rejects values that would make the engine
//! misbehave (zero page sizes, unknown providers, missing dims).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding `metadata.sqlite`, `vectors.sqlite` and `files/`.
    pub root: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl StorageConfig {
    pub fn metadata_db_path(&self) -> PathBuf {
        self.root.join("metadata.sqlite")
    }

    pub fn vector_db_path(&self) -> PathBuf {
        self.root.join("vectors.sqlite")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    #[serde(default = "default_top_k")]
    pub default_top_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_top_k: default_top_k(),
        }
    }
}

fn default_page_size() -> i64 {
    20
}
fn default_max_page_size() -> i64 {
    200
}
fn default_top_k() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_query_timeout_ms() -> u64 {
    2000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            timeout_secs: default_summarizer_timeout_secs(),
        }
    }
}

fn default_summarizer_timeout_secs() -> u64 {
    60
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_index_interval")]
    pub index_interval_secs: u64,
    #[serde(default = "default_embed_interval")]
    pub embed_interval_secs: u64,
    #[serde(default = "default_summarize_interval")]
    pub summarize_interval_secs: u64,
    #[serde(default = "default_tick_timeout")]
    pub tick_timeout_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_interval_secs: default_index_interval(),
            embed_interval_secs: default_embed_interval(),
            summarize_interval_secs: default_summarize_interval(),
            tick_timeout_secs: default_tick_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_index_interval() -> u64 {
    30
}
fn default_embed_interval() -> u64 {
    60
}
fn default_summarize_interval() -> u64 {
    300
}
fn default_tick_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlocklistConfig {
    #[serde(default)]
    pub apps: Vec<String>,
    /// Optional file with one app name per line, re-read every `refresh_secs`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_blocklist_refresh")]
    pub refresh_secs: u64,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            apps: Vec::new(),
            path: None,
            refresh_secs: default_blocklist_refresh(),
        }
    }
}

fn default_blocklist_refresh() -> u64 {
    300
}

impl Config {
    /// Default configuration rooted at `root`, with the offline `hash`
    /// embedder and background workers disabled.
    pub fn for_root(root: &Path) -> Self {
        Self {
            storage: StorageConfig {
                root: root.to_path_buf(),
                max_connections: default_max_connections(),
            },
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                provider: "hash".to_string(),
                model: Some("hash-256".to_string()),
                dims: Some(256),
                ..EmbeddingConfig::default()
            },
            summarizer: SummarizerConfig::default(),
            workers: WorkersConfig {
                enabled: false,
                ..WorkersConfig::default()
            },
            blocklist: BlocklistConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.max_connections == 0 {
            bail!("storage.max_connections must be >= 1");
        }

        if self.retrieval.default_page_size < 1 {
            bail!("retrieval.default_page_size must be >= 1");
        }
        if self.retrieval.max_page_size < self.retrieval.default_page_size {
            bail!("retrieval.max_page_size must be >= retrieval.default_page_size");
        }
        if self.retrieval.default_top_k < 1 {
            bail!("retrieval.default_top_k must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "hash" | "ollama" | "openai" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, hash, ollama, openai, or local.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.query_timeout_ms == 0 {
            bail!("embedding.query_timeout_ms must be > 0");
        }
        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.summarizer.provider.as_str() {
            "disabled" | "ollama" => {}
            other => bail!(
                "Unknown summarizer provider: '{}'. Must be disabled or ollama.",
                other
            ),
        }

        if self.workers.enabled {
            if self.workers.index_interval_secs == 0
                || self.workers.embed_interval_secs == 0
                || self.workers.summarize_interval_secs == 0
            {
                bail!("workers.*_interval_secs must be > 0");
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
