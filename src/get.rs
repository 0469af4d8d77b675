//! `daybook get` and `daybook sessions`: session printers.

use anyhow::Result;
use std::sync::Arc;

use crate::engine::StorageEngine;
use crate::models::Session;

/// Longest OCR excerpt printed per block.
const EXCERPT_CHARS: usize = 200;

pub async fn run_get(engine: &Arc<StorageEngine>, date: &str) -> Result<()> {
    let session = engine.get_session(date).await?;

    println!("--- Session {} ---", session.date);
    println!(
        "title:        {}",
        session.custom_title.as_deref().unwrap_or("(none)")
    );
    if let Some(summary) = &session.custom_summary {
        println!("summary:      {}", summary);
    }
    if !session.tags.is_empty() {
        println!("tags:         {}", session.tags.join(", "));
    }
    println!("apps:         {}", session.apps().join(", "));
    println!("created_at:   {}", session.created_at.to_rfc3339());
    println!("updated_at:   {}", session.updated_at.to_rfc3339());
    println!();

    if !session.manual_notes.is_empty() {
        println!("--- Notes ---");
        println!("{}", session.manual_notes);
        println!();
    }

    println!("--- Blocks ({}) ---", session.blocks.len());
    for block in &session.blocks {
        println!(
            "[{} - {}] {}",
            block.start.format("%H:%M:%S"),
            block.end.format("%H:%M:%S"),
            block.app
        );
        if let Some(summary) = &block.summary {
            println!("  summary: {}", summary);
        }
        if !block.ocr_text.trim().is_empty() {
            println!("  text: {}", excerpt(&block.ocr_text));
        }
        for shot in &block.screenshots {
            println!("  screenshot: {}", shot);
        }
    }
    Ok(())
}

pub async fn run_list(
    engine: &Arc<StorageEngine>,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<()> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(engine.config().retrieval.default_page_size);
    let listed = engine.list_sessions(page, page_size).await?;

    if listed.items.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!(
        "{} sessions (page {}, {} per page)",
        listed.total, page, page_size
    );
    println!();
    for session in &listed.items {
        println!("  {}", describe(session));
    }
    Ok(())
}

fn describe(session: &Session) -> String {
    let title = session.custom_title.as_deref().unwrap_or("(untitled)");
    format!(
        "{}  {:<32}  {} blocks, {} apps",
        session.date,
        title,
        session.blocks.len(),
        session.apps().len()
    )
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat.to_string(),
    }
}
