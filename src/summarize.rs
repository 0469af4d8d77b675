//! Block summarization via a local language model.
//!
//! Summaries are optional enrichment: they are indexed for full-text search
//! and, once present, replace the raw OCR text as a block's embedding input.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::embedding::post_json_with_retry;
use crate::models::ContentBlock;

/// Longest OCR excerpt sent to the model.
const MAX_PROMPT_CHARS: usize = 6000;

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn summarize(&self, block: &ContentBlock) -> Result<String>;
}

/// Build the configured summarizer, or `None` when summarization is disabled.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Option<Arc<dyn Summarizer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "ollama" => Ok(Some(Arc::new(OllamaSummarizer::new(config)?))),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}

/// Calls `POST /api/generate` on a local Ollama instance.
pub struct OllamaSummarizer {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("summarizer.model required for Ollama summarizer"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { model, url, client })
    }
}

pub fn build_prompt(block: &ContentBlock) -> String {
    let text: String = block.ocr_text.chars().take(MAX_PROMPT_CHARS).collect();
    format!(
        "The following text was captured from the application \"{}\" between {} and {}.\n\
         Summarize what the user was doing in one or two sentences. \
         Reply with the summary only.\n\n{}",
        block.app,
        block.start.format("%H:%M"),
        block.end.format("%H:%M"),
        text
    )
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, block: &ContentBlock) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(block),
            "stream": false,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            None,
            &body,
            1,
            "Ollama",
        )
        .await?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))?
        .trim();
    if text.is_empty() {
        bail!("Ollama returned an empty summary");
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ms_to_datetime;

    #[test]
    fn test_parse_generate_response() {
        let ok = serde_json::json!({"response": "  Edited a report. \n"});
        assert_eq!(parse_generate_response(&ok).unwrap(), "Edited a report.");
        assert!(parse_generate_response(&serde_json::json!({"response": " "})).is_err());
        assert!(parse_generate_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_prompt_truncates_ocr() {
        let block = ContentBlock {
            date: "2025-01-01".into(),
            app: "Editor".into(),
            block_id: "0".into(),
            start: ms_to_datetime(0),
            end: ms_to_datetime(60_000),
            ocr_text: "x".repeat(MAX_PROMPT_CHARS * 2),
            summary: None,
            screenshots: vec![],
        };
        let prompt = build_prompt(&block);
        assert!(prompt.contains("\"Editor\""));
        assert!(prompt.len() < MAX_PROMPT_CHARS + 400);
    }

    #[test]
    fn test_disabled_summarizer_is_none() {
        assert!(create_summarizer(&SummarizerConfig::default())
            .unwrap()
            .is_none());
    }
}
