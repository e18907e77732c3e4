use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::prompts::{self, Shot};
use crate::docs::read_briefing;
use crate::docs::sheet::SheetGrid;
use crate::llm::Message;

pub const EXAMPLE_COUNT: usize = 3;

/// Raw inputs of one worked example: the reference document text and the
/// spreadsheet that was briefed for it.
#[derive(Debug, Clone)]
pub struct ExampleSource {
    pub reference: String,
    pub briefing: SheetGrid,
}

/// A worked example ready for the prompt: reference text and converted briefing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkedExample {
    pub reference: String,
    pub briefing: String,
}

/// Load `example_json_{n}.json` and `example_brf_{n}.xlsx` for n = 1..=3.
pub async fn load_example_sources(dir: &Path) -> Result<[ExampleSource; EXAMPLE_COUNT]> {
    let mut sources = Vec::with_capacity(EXAMPLE_COUNT);
    for n in 1..=EXAMPLE_COUNT {
        let json_path = dir.join(format!("example_json_{}.json", n));
        let reference = tokio::fs::read_to_string(&json_path)
            .await
            .with_context(|| format!("Failed to read worked example {}", json_path.display()))?;
        let briefing = read_briefing(&dir.join(format!("example_brf_{}.xlsx", n))).await?;
        sources.push(ExampleSource {
            reference,
            briefing,
        });
    }
    info!(dir = %dir.display(), count = sources.len(), "Worked examples loaded");

    sources
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} worked examples", EXAMPLE_COUNT))
}

/// The rules turn followed by the worked examples, each as a user request
/// and the expected assistant reply.
///
/// Built once per run and never modified; every comparison sends a copy
/// extended with its own request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewShotConversation {
    turns: Vec<Message>,
}

impl FewShotConversation {
    pub fn assemble(
        rules: &str,
        shots: &[Shot; EXAMPLE_COUNT],
        examples: &[WorkedExample; EXAMPLE_COUNT],
    ) -> Self {
        let mut turns = Vec::with_capacity(1 + 2 * EXAMPLE_COUNT);
        turns.push(Message::user(rules));
        for (shot, example) in shots.iter().zip(examples) {
            turns.push(Message::user(prompts::fill(
                shot.request,
                &example.reference,
                &example.briefing,
            )));
            turns.push(Message::assistant(shot.expected));
            debug!(outcome = ?shot.outcome, "Worked example added");
        }
        Self { turns }
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    /// A fresh conversation: these turns followed by `request`.
    pub fn with_request(&self, request: Message) -> Vec<Message> {
        let mut conversation = Vec::with_capacity(self.turns.len() + 1);
        conversation.extend_from_slice(&self.turns);
        conversation.push(request);
        conversation
    }
}
