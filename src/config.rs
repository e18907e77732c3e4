use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;

use crate::docs::sheet::CellRef;
use crate::llm::{InferenceConfig, RetryPolicy};
use crate::matching::DEFAULT_THRESHOLD;

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";

/// Settings for one audit run, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub reference_dir: PathBuf,
    pub briefing_dir: PathBuf,
    pub examples_dir: PathBuf,
    /// File name, inside `examples_dir`, of the structure shown to the converter.
    pub canonical_example: String,
    pub description_cell: CellRef,
    pub match_threshold: f64,
    pub model_id: String,
    pub conversion: InferenceConfig,
    pub comparison: InferenceConfig,
    pub retry: RetryPolicy,
    pub log_level: Level,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from("reports/jsons"),
            briefing_dir: PathBuf::from("reports/briefing"),
            examples_dir: PathBuf::from("reports/Shots"),
            canonical_example: "example_json_1.json".to_string(),
            description_cell: CellRef { row: 6, col: 7 },
            match_threshold: DEFAULT_THRESHOLD,
            model_id: DEFAULT_MODEL_ID.to_string(),
            conversion: InferenceConfig::conversion(),
            comparison: InferenceConfig::comparison(),
            retry: RetryPolicy::default(),
            log_level: Level::INFO,
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("AUDIT_REFERENCE_DIR") {
            config.reference_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AUDIT_BRIEFING_DIR") {
            config.briefing_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AUDIT_EXAMPLES_DIR") {
            config.examples_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("AUDIT_CANONICAL_EXAMPLE") {
            config.canonical_example = name;
        }
        if let Some(cell) = lookup("AUDIT_DESCRIPTION_CELL") {
            config.description_cell = cell.parse()?;
        }
        if let Some(raw) = lookup("AUDIT_MATCH_THRESHOLD") {
            config.match_threshold = parse_var("AUDIT_MATCH_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("AUDIT_MAX_RETRIES") {
            config.retry.max_retries = parse_var("AUDIT_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("AUDIT_LOG_LEVEL") {
            config.log_level = parse_var("AUDIT_LOG_LEVEL", &raw)?;
        }
        if let Some(model) = lookup("BEDROCK_MODEL_ID") {
            config.model_id = model;
        }
        if let Some(raw) = lookup("BEDROCK_TOP_P") {
            let top_p: f32 = parse_var("BEDROCK_TOP_P", &raw)?;
            config.conversion = config.conversion.with_top_p(Some(top_p));
            config.comparison = config.comparison.with_top_p(Some(top_p));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            bail!(
                "AUDIT_MATCH_THRESHOLD must lie in [0, 1], got {}",
                self.match_threshold
            );
        }
        for top_p in [self.conversion.top_p, self.comparison.top_p].into_iter().flatten() {
            if !(0.0..=1.0).contains(&top_p) {
                bail!("BEDROCK_TOP_P must lie in [0, 1], got {}", top_p);
            }
        }
        if self.retry.initial_delay > self.retry.max_delay {
            bail!("retry initial delay exceeds its cap");
        }
        Ok(())
    }

    pub fn canonical_example_path(&self) -> PathBuf {
        self.examples_dir.join(&self.canonical_example)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{} has an invalid value '{}'", key, raw))
}
