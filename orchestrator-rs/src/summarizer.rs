// orchestrator-rs/src/summarizer.rs

use std::sync::Arc;
use std::time::Duration;

use error_handling::truncate_for_display;
use llm_client::{summary_prompt, LanguageModel};

use crate::presentation::messages;

const FALLBACK_OUTPUT_CHARS: usize = 500;

/// Explains captured command output in plain language.
#[derive(Clone)]
pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    os_distro: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, os_distro: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model,
            os_distro: os_distro.into(),
            timeout,
        }
    }

    /// Never fails: a model error or timeout falls back to the raw output,
    /// truncated, or a generic success text when there is none.
    pub async fn summarize(&self, request_text: &str, command_line: &str, output: &str) -> String {
        let prompt = summary_prompt(request_text, command_line, output, &self.os_distro);

        match tokio::time::timeout(self.timeout, self.model.complete(&prompt)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(Ok(_)) => {
                tracing::warn!("Summarization returned empty text, using raw output");
                fallback(output)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Summarization failed, using raw output");
                fallback(output)
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Summarization timed out, using raw output");
                fallback(output)
            }
        }
    }
}

fn fallback(output: &str) -> String {
    if output.trim().is_empty() {
        messages::EXECUTED.to_string()
    } else {
        truncate_for_display(output, FALLBACK_OUTPUT_CHARS)
    }
}
