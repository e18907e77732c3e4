use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::prompts;
use crate::llm::{invoke, CompletionService, InferenceConfig, Message};

/// The example structure shown to the converter, read from disk on first use.
pub struct CanonicalExample {
    path: PathBuf,
    rendered: OnceCell<String>,
}

impl CanonicalExample {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rendered: OnceCell::new(),
        }
    }

    /// Pretty-printed example document, memoised after the first load.
    pub async fn get(&self) -> Result<&str> {
        let rendered = self
            .rendered
            .get_or_try_init(|| async {
                let raw = tokio::fs::read_to_string(&self.path)
                    .await
                    .with_context(|| format!("Failed to read {}", self.path.display()))?;
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not valid JSON", self.path.display()))?;
                info!(path = %self.path.display(), "Canonical example loaded");
                serde_json::to_string_pretty(&value).context("serialize canonical example")
            })
            .await?;
        Ok(rendered.as_str())
    }
}

/// Converts spreadsheet dumps into briefing JSON text.
pub struct BriefingConverter<'a, S> {
    service: &'a S,
    model_id: &'a str,
    inference: InferenceConfig,
    example: CanonicalExample,
}

impl<'a, S: CompletionService> BriefingConverter<'a, S> {
    pub fn new(
        service: &'a S,
        model_id: &'a str,
        inference: InferenceConfig,
        example: CanonicalExample,
    ) -> Self {
        Self {
            service,
            model_id,
            inference,
            example,
        }
    }

    /// Send one single-turn conversion request and return the trimmed reply.
    /// A service failure is returned as-is; it is fatal for the run.
    pub async fn convert(&self, sheet_dump: &str) -> Result<String> {
        let example = self.example.get().await?;
        let conversation = [Message::user(prompts::conversion_request(sheet_dump, example))];

        let converted = invoke(self.service, self.model_id, &conversation, &self.inference).await?;
        debug!(
            input_len = sheet_dump.len(),
            output_len = converted.len(),
            "Briefing converted"
        );
        Ok(converted)
    }
}
