pub mod compare;
pub mod convert;
pub mod fewshot;
pub mod prompts;

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::AuditConfig;
use crate::docs::sheet::SheetGrid;
use crate::docs::types::RecordId;
use crate::docs::{self, ReferenceDoc};
use crate::llm::CompletionService;
use crate::matching::describe::{self, Description};
use crate::matching::{match_descriptions, MatchedPair};

use compare::{ComparisonReport, DiscrepancyChecker, Verdict};
use convert::{BriefingConverter, CanonicalExample};
use fewshot::{ExampleSource, FewShotConversation, WorkedExample, EXAMPLE_COUNT};

const CHECK_BANNER: &str = "############################ CHECK ############################";

/// Everything one run reads from disk.
pub struct AuditInputs {
    pub references: Vec<ReferenceDoc>,
    pub briefings: BTreeMap<RecordId, SheetGrid>,
}

/// Report for one matched pair.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub pair: MatchedPair,
    pub report: ComparisonReport,
}

#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub references: usize,
    pub briefings: usize,
    pub matches: usize,
    pub reports: Vec<PairReport>,
}

/// Runs the whole reconciliation: describe, match, convert, compare.
pub struct AuditEngine<'a, S> {
    service: &'a S,
    config: &'a AuditConfig,
    examples: Option<[ExampleSource; EXAMPLE_COUNT]>,
}

impl<'a, S: CompletionService> AuditEngine<'a, S> {
    pub fn new(service: &'a S, config: &'a AuditConfig) -> Self {
        Self {
            service,
            config,
            examples: None,
        }
    }

    /// Use these worked examples instead of reading them from the examples directory.
    pub fn with_examples(mut self, examples: [ExampleSource; EXAMPLE_COUNT]) -> Self {
        self.examples = Some(examples);
        self
    }

    /// Load inputs from the configured directories and audit them.
    pub async fn run(&self, out: &mut impl Write) -> Result<AuditSummary> {
        let references = docs::load_references(&self.config.reference_dir).await?;
        let briefings = docs::load_briefings(&self.config.briefing_dir).await?;
        self.audit(
            AuditInputs {
                references,
                briefings,
            },
            out,
        )
        .await
    }

    /// Audit already-loaded inputs, writing the human-readable report to `out`
    /// as each pair completes. The first service failure aborts the run.
    pub async fn audit(&self, inputs: AuditInputs, out: &mut impl Write) -> Result<AuditSummary> {
        let briefing_descriptions: BTreeMap<RecordId, Description> = inputs
            .briefings
            .iter()
            .map(|(id, grid)| {
                (
                    id.clone(),
                    describe::from_briefing(grid, self.config.description_cell),
                )
            })
            .collect();
        writeln!(out, "{} briefing files gathered", briefing_descriptions.len())?;

        let reference_descriptions: BTreeMap<RecordId, Description> = inputs
            .references
            .iter()
            .map(|doc| (doc.id.clone(), describe::from_record(doc.record.as_ref())))
            .collect();
        writeln!(out, "{} json files gathered", reference_descriptions.len())?;

        log_invalid("briefing", &briefing_descriptions);
        log_invalid("reference", &reference_descriptions);

        let matches = match_descriptions(
            &reference_descriptions,
            &briefing_descriptions,
            self.config.match_threshold,
        );
        writeln!(out, "{} description matches:", matches.len())?;
        for pair in &matches {
            writeln!(
                out,
                "JSON: {} vs Excel: {}",
                pair.reference_description, pair.briefing_description
            )?;
        }
        info!(
            references = reference_descriptions.len(),
            briefings = briefing_descriptions.len(),
            matches = matches.len(),
            "Matching complete"
        );

        let mut summary = AuditSummary {
            references: reference_descriptions.len(),
            briefings: briefing_descriptions.len(),
            matches: matches.len(),
            reports: Vec::with_capacity(matches.len()),
        };
        if matches.is_empty() {
            return Ok(summary);
        }

        let converter = BriefingConverter::new(
            self.service,
            &self.config.model_id,
            self.config.conversion,
            CanonicalExample::from_path(self.config.canonical_example_path()),
        );
        let checker =
            DiscrepancyChecker::new(self.service, &self.config.model_id, self.config.comparison);

        let sources = match &self.examples {
            Some(examples) => examples.clone(),
            None => fewshot::load_example_sources(&self.config.examples_dir).await?,
        };
        let context = prepare_context(&converter, &sources).await?;

        let references: BTreeMap<&RecordId, &ReferenceDoc> =
            inputs.references.iter().map(|doc| (&doc.id, doc)).collect();

        for pair in matches {
            let grid = inputs
                .briefings
                .get(&pair.briefing_id)
                .with_context(|| format!("briefing {} is no longer loaded", pair.briefing_id))?;
            let reference = references
                .get(&pair.reference_id)
                .with_context(|| format!("reference {} is no longer loaded", pair.reference_id))?;

            info!(reference = %pair.reference_id, briefing = %pair.briefing_id, "Checking pair");
            if let Some(record) = &reference.record {
                let activity = record.commercial_activity.as_ref();
                debug!(
                    start = ?activity.and_then(|a| a.start_date.as_ref()),
                    end = ?activity.and_then(|a| a.end_date.as_ref()),
                    metrics = ?record.metric_names(),
                    criteria = record.criteria().len(),
                    segmented = record.is_segmented(),
                    "Reference shape"
                );
            }
            let converted = converter.convert(&grid.render()).await?;
            let report = checker.compare(&context, &converted, &reference.text).await?;

            write_report(out, &pair, &report)?;
            summary.reports.push(PairReport { pair, report });
        }

        Ok(summary)
    }
}

/// Convert each example briefing and assemble the shared conversation.
async fn prepare_context<S: CompletionService>(
    converter: &BriefingConverter<'_, S>,
    sources: &[ExampleSource; EXAMPLE_COUNT],
) -> Result<FewShotConversation> {
    let mut examples = Vec::with_capacity(EXAMPLE_COUNT);
    for (idx, source) in sources.iter().enumerate() {
        let briefing = converter.convert(&source.briefing.render()).await?;
        debug!(example = idx + 1, "Worked example converted");
        examples.push(WorkedExample {
            reference: source.reference.clone(),
            briefing,
        });
    }
    let examples: [WorkedExample; EXAMPLE_COUNT] = examples
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} worked examples", EXAMPLE_COUNT))?;

    Ok(FewShotConversation::assemble(
        prompts::RULES,
        &prompts::SHOTS,
        &examples,
    ))
}

fn log_invalid(kind: &str, descriptions: &BTreeMap<RecordId, Description>) {
    for (id, desc) in descriptions {
        if *desc == Description::Invalid {
            warn!(kind, file = %id, "No usable description, record will not be matched");
        }
    }
}

fn write_report(out: &mut impl Write, pair: &MatchedPair, report: &ComparisonReport) -> Result<()> {
    writeln!(out, "{}", CHECK_BANNER)?;
    writeln!(
        out,
        "Discrepancies for {} and {}:",
        pair.reference_id.file_name(),
        pair.briefing_id.file_name()
    )?;
    match report.verdict {
        Verdict::NoDifferences => writeln!(out, "No discrepancies found.")?,
        Verdict::Discrepancies(_) => writeln!(out, "{}", report.raw)?,
    }
    out.flush()?;
    Ok(())
}
