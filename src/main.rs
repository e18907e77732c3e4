mod audit;
mod config;
mod docs;
mod llm;
mod matching;

use std::io;

use tracing::{error, info, warn};

use audit::AuditEngine;
use config::AuditConfig;
use llm::{BedrockClient, Retrying};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenv::dotenv();

    let config = match AuditConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(&config).await {
        error!(model = %config.model_id, "Audit aborted: {:#}", e);
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: &AuditConfig) -> anyhow::Result<()> {
    let client = Retrying::new(BedrockClient::from_env()?, config.retry);
    info!(
        model = %config.model_id,
        references = %config.reference_dir.display(),
        briefings = %config.briefing_dir.display(),
        threshold = config.match_threshold,
        "Starting campaign audit"
    );

    let engine = AuditEngine::new(&client, config);
    let mut stdout = io::stdout().lock();
    let summary = engine.run(&mut stdout).await?;

    let mut flagged = 0;
    for r in summary.reports.iter().filter(|r| r.report.has_differences()) {
        flagged += 1;
        warn!(
            reference = %r.pair.reference_id,
            briefing = %r.pair.briefing_id,
            findings = r.report.findings().len(),
            blocking = r.report.blocking_count(),
            "Discrepancies reported"
        );
    }
    info!(
        references = summary.references,
        briefings = summary.briefings,
        matches = summary.matches,
        checked = summary.reports.len(),
        flagged,
        "Audit complete"
    );
    Ok(())
}
