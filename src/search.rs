//! `daybook search`: keyword and semantic search printers.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::engine::StorageEngine;
use crate::models::{parse_date, SearchFilter, SearchResult};

/// Options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub mode: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub top_k: Option<i64>,
    pub app: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

/// Build a semantic-search filter from CLI strings.
pub fn parse_filter(
    app: Option<&str>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<SearchFilter> {
    Ok(SearchFilter {
        since: since.map(parse_date).transpose()?,
        until: until.map(parse_date).transpose()?,
        app: app.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
    })
}

pub async fn run_search(engine: &Arc<StorageEngine>, term: &str, args: &SearchArgs) -> Result<()> {
    let retrieval = &engine.config().retrieval;

    match args.mode.as_str() {
        "keyword" => {
            if args.app.is_some() || args.since.is_some() || args.until.is_some() {
                bail!("--app, --since and --until apply to --mode semantic only");
            }
            let page = args.page.unwrap_or(1);
            let page_size = args.page_size.unwrap_or(retrieval.default_page_size);
            let found = engine.full_text_search(term, page, page_size).await?;

            if found.results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            println!(
                "{} matching sessions (page {}, {} per page)",
                found.total, page, page_size
            );
            println!();
            let offset = ((page - 1) * page_size) as usize;
            print_results(&found.results, offset);
        }
        "semantic" => {
            let filter = parse_filter(
                args.app.as_deref(),
                args.since.as_deref(),
                args.until.as_deref(),
            )?;
            let top_k = args.top_k.unwrap_or(retrieval.default_top_k);
            let results = engine.semantic_search(term, top_k, &filter).await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            print_results(&results, 0);
        }
        other => bail!("Unknown search mode: '{}'. Use keyword or semantic.", other),
    }
    Ok(())
}

fn print_results(results: &[SearchResult], offset: usize) {
    for (i, result) in results.iter().enumerate() {
        match (&result.app, &result.block_id) {
            (Some(app), Some(block_id)) => println!(
                "{}. [{:.2}] {} / {} @ {}",
                offset + i + 1,
                result.score,
                result.date,
                app,
                block_id
            ),
            _ => println!("{}. [{:.0}] {}", offset + i + 1, result.score, result.date),
        }
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }
}
