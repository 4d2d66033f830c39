//! Synthesis tier: condense contiguous groups of worker results.

use crate::context::RunContext;
use crate::pool::Admission;
use crate::provider::GenerationSettings;
use crate::runner::Runner;
use cascade_core::events::{
    EventPayload, GroupCompletedPayload, GroupFailedPayload, GroupStartedPayload,
};
use cascade_core::prompt::synthesis_prompt;
use cascade_core::{
    FailureReason, SynthesisGroup, SynthesisResult, Tier, UnitStatus, Usage, WorkerResult,
};
use futures::future::join_all;

/// Split `n` worker indices into contiguous groups of `group_size`.
///
/// The last group may be smaller; no group is empty. A `group_size` of 0 is
/// treated as 1.
pub fn partition(n: usize, group_size: usize) -> Vec<SynthesisGroup> {
    let size = group_size.max(1);
    (0..n)
        .step_by(size)
        .enumerate()
        .map(|(index, start)| SynthesisGroup {
            index,
            members: (start..(start + size).min(n)).collect(),
        })
        .collect()
}

/// Runs one synthesizer per group, concurrently under the admission cap.
#[derive(Debug, Clone)]
pub struct SynthesisTier {
    runner: Runner,
    admission: Admission,
}

impl SynthesisTier {
    pub fn new(runner: Runner, cap: usize) -> Self {
        Self {
            runner,
            admission: Admission::new(cap),
        }
    }

    pub fn for_context(ctx: &RunContext) -> Self {
        Self::new(
            Runner::for_tier(&ctx.config, Tier::Synthesis),
            ctx.config.concurrency_cap,
        )
    }

    /// One result per group, in group order.
    pub async fn run(
        &self,
        ctx: &RunContext,
        workers: &[WorkerResult],
        group_size: usize,
    ) -> Vec<SynthesisResult> {
        let groups = partition(workers.len(), group_size);
        join_all(groups.iter().map(|group| self.run_group(ctx, workers, group))).await
    }

    async fn run_group(
        &self,
        ctx: &RunContext,
        workers: &[WorkerResult],
        group: &SynthesisGroup,
    ) -> SynthesisResult {
        let members: Vec<&WorkerResult> = group
            .members
            .iter()
            .filter_map(|&i| workers.get(i))
            .collect();

        if !members.iter().any(|w| w.succeeded()) {
            return fail(ctx, group, FailureReason::EmptyInput, 0, 0);
        }

        let Some(_permit) = self.admission.acquire(&ctx.cancel).await else {
            return fail(ctx, group, FailureReason::Cancelled, 0, 0);
        };

        ctx.emit(EventPayload::GroupStarted(GroupStartedPayload {
            index: group.index,
            size: group.len(),
        }));

        let prompt = synthesis_prompt(&ctx.task, &members);
        let settings =
            GenerationSettings::from_config(&ctx.config, ctx.config.synthesis_temperature);
        let outcome = self
            .runner
            .execute(ctx, Tier::Synthesis, group.index, &prompt, &settings)
            .await;

        match outcome.result {
            Ok(generation) => {
                ctx.emit(EventPayload::GroupCompleted(GroupCompletedPayload {
                    index: group.index,
                    duration_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    output_bytes: generation.text.len(),
                }));
                SynthesisResult {
                    group_index: group.index,
                    source_indices: group.members.clone(),
                    status: UnitStatus::Succeeded,
                    content: generation.text,
                    failure: None,
                    elapsed_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    usage: generation.usage,
                }
            }
            Err(reason) => fail(ctx, group, reason, outcome.elapsed_ms, outcome.attempts),
        }
    }
}

fn fail(
    ctx: &RunContext,
    group: &SynthesisGroup,
    reason: FailureReason,
    elapsed_ms: u64,
    attempts: u32,
) -> SynthesisResult {
    ctx.emit(EventPayload::GroupFailed(GroupFailedPayload {
        index: group.index,
        duration_ms: elapsed_ms,
        reason: reason.clone(),
    }));
    SynthesisResult {
        group_index: group.index,
        source_indices: group.members.clone(),
        status: UnitStatus::Failed,
        content: String::new(),
        failure: Some(reason),
        elapsed_ms,
        attempts,
        usage: Usage::default(),
    }
}

/// Synthesize `workers` in groups of `group_size` using the run's config.
pub async fn synthesize_groups(
    ctx: &RunContext,
    workers: &[WorkerResult],
    group_size: usize,
) -> Vec<SynthesisResult> {
    SynthesisTier::for_context(ctx)
        .run(ctx, workers, group_size)
        .await
}
