use anyhow::Result;
use tracing::debug;

use super::fewshot::FewShotConversation;
use super::prompts::{self, NO_DIFF};
use crate::llm::{invoke, CompletionService, InferenceConfig, Message};

const BLOCKING_ICON: char = '🔴';
const ADVISORY_ICON: char = '🟠';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Blocking,
    Advisory,
}

/// One bullet of a discrepancy report, read best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Option<Severity>,
    /// JSON path of the field, when the bullet names one between backticks.
    pub field: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    NoDifferences,
    /// Parsed bullets. May be empty when the reply drifted from the bullet format.
    Discrepancies(Vec<Finding>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonReport {
    pub raw: String,
    pub verdict: Verdict,
}

impl ComparisonReport {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let verdict = if raw.trim() == NO_DIFF {
            Verdict::NoDifferences
        } else {
            Verdict::Discrepancies(parse_findings(&raw))
        };
        Self { raw, verdict }
    }

    pub fn has_differences(&self) -> bool {
        !matches!(self.verdict, Verdict::NoDifferences)
    }

    pub fn findings(&self) -> &[Finding] {
        match &self.verdict {
            Verdict::NoDifferences => &[],
            Verdict::Discrepancies(findings) => findings,
        }
    }

    pub fn blocking_count(&self) -> usize {
        self.findings()
            .iter()
            .filter(|f| f.severity == Some(Severity::Blocking))
            .count()
    }
}

fn parse_findings(raw: &str) -> Vec<Finding> {
    let mut findings: Vec<Finding> = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let bullet = ["- ", "* ", "• "]
            .iter()
            .find_map(|marker| trimmed.strip_prefix(marker));
        match bullet {
            Some(body) => findings.push(parse_bullet(body.trim())),
            None => {
                // indented continuation of the previous bullet
                if line.starts_with(char::is_whitespace) {
                    if let Some(last) = findings.last_mut() {
                        last.detail.push(' ');
                        last.detail.push_str(trimmed);
                    }
                }
            }
        }
    }
    findings
}

fn parse_bullet(body: &str) -> Finding {
    let (severity, rest) = if let Some(rest) = body.strip_prefix(BLOCKING_ICON) {
        (Some(Severity::Blocking), rest.trim_start())
    } else if let Some(rest) = body.strip_prefix(ADVISORY_ICON) {
        (Some(Severity::Advisory), rest.trim_start())
    } else {
        (None, body)
    };

    if let Some(after_tick) = rest.strip_prefix('`') {
        if let Some(end) = after_tick.find('`') {
            let field = after_tick[..end].to_string();
            let detail = after_tick[end + 1..]
                .trim_start_matches(':')
                .trim()
                .to_string();
            return Finding {
                severity,
                field: Some(field),
                detail,
            };
        }
    }

    Finding {
        severity,
        field: None,
        detail: rest.to_string(),
    }
}

/// Sends one comparison per matched pair on top of the few-shot conversation.
pub struct DiscrepancyChecker<'a, S> {
    service: &'a S,
    model_id: &'a str,
    inference: InferenceConfig,
}

impl<'a, S: CompletionService> DiscrepancyChecker<'a, S> {
    pub fn new(service: &'a S, model_id: &'a str, inference: InferenceConfig) -> Self {
        Self {
            service,
            model_id,
            inference,
        }
    }

    pub async fn compare(
        &self,
        context: &FewShotConversation,
        briefing: &str,
        reference: &str,
    ) -> Result<ComparisonReport> {
        let request = Message::user(prompts::fill(prompts::COMPARISON_REQUEST, reference, briefing));
        let conversation = context.with_request(request);

        let reply = invoke(self.service, self.model_id, &conversation, &self.inference).await?;
        let report = ComparisonReport::parse(reply);
        debug!(
            turns = conversation.len(),
            differences = report.has_differences(),
            "Comparison complete"
        );
        Ok(report)
    }
}
