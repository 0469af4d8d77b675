use anyhow::Result;
use std::sync::Arc;

use crate::embedding::content_hash;
use crate::engine::StorageEngine;
use crate::error;
use crate::models::ContentBlock;
use crate::session_store::SessionStore;
use crate::vector_index::VectorIndex;

/// A block whose vector is missing or was computed from different text.
pub struct PendingBlock {
    pub block: ContentBlock,
    pub text: String,
    pub text_hash: String,
}

/// Outcome of one embedding or summarization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub pending: u64,
    pub done: u64,
    pub failed: u64,
}

/// Blocks accepted by `keep` that need (re-)embedding under `model`, most
/// recent date first.
pub async fn find_pending(
    sessions: &SessionStore,
    vectors: &VectorIndex,
    model: &str,
    limit: Option<usize>,
    keep: impl Fn(&ContentBlock) -> bool,
) -> error::Result<Vec<PendingBlock>> {
    let stored = vectors.hashes(model).await?;
    let limit = limit.unwrap_or(usize::MAX);

    let pending = sessions
        .all_blocks()
        .await?
        .into_iter()
        .filter(|block| keep(block))
        .filter_map(|block| {
            let text = block.embedding_text();
            let text_hash = content_hash(&text);
            match stored.get(&block.key().to_string()) {
                Some(existing) if *existing == text_hash => None,
                _ => Some(PendingBlock {
                    block,
                    text,
                    text_hash,
                }),
            }
        })
        .take(limit)
        .collect();

    Ok(pending)
}

/// `daybook embed pending`
pub async fn run_embed_pending(engine: &Arc<StorageEngine>, limit: Option<usize>) -> Result<()> {
    let report = engine.embed_pending(limit).await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all blocks up to date");
        return Ok(());
    }
    println!("  total pending: {}", report.pending);
    println!("  embedded: {}", report.done);
    println!("  failed: {}", report.failed);
    Ok(())
}

/// `daybook summarize pending`
pub async fn run_summarize_pending(
    engine: &Arc<StorageEngine>,
    limit: Option<usize>,
) -> Result<()> {
    let report = engine.summarize_pending(limit).await?;

    println!("summarize pending");
    if report.pending == 0 {
        println!("  all blocks summarized");
        return Ok(());
    }
    println!("  total pending: {}", report.pending);
    println!("  summarized: {}", report.done);
    println!("  failed: {}", report.failed);
    Ok(())
}
