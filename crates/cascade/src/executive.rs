//! Executive tier: one final synthesis over everything below it.

use crate::context::RunContext;
use crate::provider::GenerationSettings;
use crate::runner::Runner;
use cascade_core::events::{
    EventPayload, ExecutiveCompletedPayload, ExecutiveFailedPayload, ExecutiveStartedPayload,
};
use cascade_core::prompt::{executive_prompt_from_syntheses, executive_prompt_from_workers};
use cascade_core::{
    ExecutiveResult, FailureReason, Prompt, SynthesisResult, Task, Tier, UnitStatus, Usage,
    WorkerResult,
};

/// What the executive reads.
#[derive(Debug, Clone, Copy)]
pub enum ExecutiveInput<'a> {
    /// Synthesis outputs; failed groups contribute their members' raw text.
    Syntheses {
        syntheses: &'a [SynthesisResult],
        workers: &'a [WorkerResult],
    },
    /// Raw worker outputs, when there is no synthesis tier.
    Workers(&'a [WorkerResult]),
}

impl ExecutiveInput<'_> {
    /// Number of non-empty inputs the executive would see.
    pub fn source_count(&self) -> usize {
        match self {
            Self::Syntheses { .. } => self.synthesis_texts().len(),
            Self::Workers(workers) => workers.iter().filter(|w| w.succeeded()).count(),
        }
    }

    fn synthesis_texts(&self) -> Vec<(usize, String)> {
        match self {
            Self::Syntheses { syntheses, workers } => syntheses
                .iter()
                .map(|s| (s.group_index, s.text_or_fallback(workers)))
                .filter(|(_, text)| !text.trim().is_empty())
                .collect(),
            Self::Workers(_) => Vec::new(),
        }
    }

    /// Prompt for the executive, or `None` when there is nothing to read.
    fn prompt(&self, task: &Task) -> Option<Prompt> {
        match self {
            Self::Syntheses { .. } => {
                let texts = self.synthesis_texts();
                (!texts.is_empty()).then(|| executive_prompt_from_syntheses(task, &texts))
            }
            Self::Workers(workers) => workers
                .iter()
                .any(WorkerResult::succeeded)
                .then(|| executive_prompt_from_workers(task, workers)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutiveTier {
    runner: Runner,
}

impl ExecutiveTier {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    pub fn for_context(ctx: &RunContext) -> Self {
        Self::new(Runner::for_tier(&ctx.config, Tier::Executive))
    }

    /// Run the executive once. Failure is reported on the result, never raised.
    pub async fn run(&self, ctx: &RunContext, input: ExecutiveInput<'_>) -> ExecutiveResult {
        let source_count = input.source_count();
        let Some(prompt) = input.prompt(&ctx.task) else {
            return fail(ctx, FailureReason::EmptyInput, source_count, 0, 0);
        };

        ctx.emit(EventPayload::ExecutiveStarted(ExecutiveStartedPayload {
            inputs: source_count,
        }));

        let settings =
            GenerationSettings::from_config(&ctx.config, ctx.config.executive_temperature);
        let outcome = self
            .runner
            .execute(ctx, Tier::Executive, 0, &prompt, &settings)
            .await;

        match outcome.result {
            Ok(generation) => {
                ctx.emit(EventPayload::ExecutiveCompleted(ExecutiveCompletedPayload {
                    duration_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    output_bytes: generation.text.len(),
                }));
                ExecutiveResult {
                    status: UnitStatus::Succeeded,
                    content: generation.text,
                    failure: None,
                    source_count,
                    elapsed_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    usage: generation.usage,
                }
            }
            Err(reason) => fail(
                ctx,
                reason,
                source_count,
                outcome.elapsed_ms,
                outcome.attempts,
            ),
        }
    }
}

fn fail(
    ctx: &RunContext,
    reason: FailureReason,
    source_count: usize,
    elapsed_ms: u64,
    attempts: u32,
) -> ExecutiveResult {
    ctx.emit(EventPayload::ExecutiveFailed(ExecutiveFailedPayload {
        duration_ms: elapsed_ms,
        reason: reason.clone(),
    }));
    ExecutiveResult {
        status: UnitStatus::Failed,
        content: String::new(),
        failure: Some(reason),
        source_count,
        elapsed_ms,
        attempts,
        usage: Usage::default(),
    }
}

/// Run the executive tier with the run's config.
pub async fn synthesize_executive(ctx: &RunContext, input: ExecutiveInput<'_>) -> ExecutiveResult {
    ExecutiveTier::for_context(ctx).run(ctx, input).await
}
