//! Worker pool: fan a task's subtasks out to the provider under a concurrency cap.

use crate::context::RunContext;
use crate::provider::GenerationSettings;
use crate::runner::Runner;
use cascade_core::events::{
    EventPayload, SubtaskCompletedPayload, SubtaskFailedPayload, SubtaskStartedPayload,
};
use cascade_core::prompt::worker_prompt;
use cascade_core::{FailureReason, Subtask, Tier, UnitStatus, WorkerResult};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Admission gate bounding in-flight provider calls within one tier.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
}

impl Admission {
    pub fn new(cap: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(cap.max(1))),
        }
    }

    /// Wait for a slot; `None` if the run was cancelled first.
    ///
    /// The permit is released when dropped, whatever the unit's outcome.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Executes every subtask exactly once and returns results in subtask order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runner: Runner,
    admission: Admission,
}

impl WorkerPool {
    pub fn new(runner: Runner, cap: usize) -> Self {
        Self {
            runner,
            admission: Admission::new(cap),
        }
    }

    /// Pool configured from the run's config.
    pub fn for_context(ctx: &RunContext) -> Self {
        Self::new(
            Runner::for_tier(&ctx.config, Tier::Worker),
            ctx.config.concurrency_cap,
        )
    }

    /// One result per subtask, in input order, whatever happened to each.
    pub async fn execute_all(&self, ctx: &RunContext, subtasks: &[Subtask]) -> Vec<WorkerResult> {
        join_all(subtasks.iter().map(|subtask| self.execute_one(ctx, subtask))).await
    }

    async fn execute_one(&self, ctx: &RunContext, subtask: &Subtask) -> WorkerResult {
        let Some(_permit) = self.admission.acquire(&ctx.cancel).await else {
            return fail(ctx, subtask, FailureReason::Cancelled, 0, 0);
        };

        ctx.emit(EventPayload::SubtaskStarted(SubtaskStartedPayload {
            index: subtask.index,
            specialization: subtask.specialization.clone(),
        }));

        let prompt = worker_prompt(&ctx.task, subtask);
        let settings = GenerationSettings::from_config(&ctx.config, ctx.config.worker_temperature);
        let outcome = self
            .runner
            .execute(ctx, Tier::Worker, subtask.index, &prompt, &settings)
            .await;

        match outcome.result {
            Ok(generation) => {
                ctx.emit(EventPayload::SubtaskCompleted(SubtaskCompletedPayload {
                    index: subtask.index,
                    duration_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    output_bytes: generation.text.len(),
                }));
                WorkerResult {
                    subtask: subtask.clone(),
                    status: UnitStatus::Succeeded,
                    content: generation.text,
                    failure: None,
                    elapsed_ms: outcome.elapsed_ms,
                    attempts: outcome.attempts,
                    usage: generation.usage,
                }
            }
            Err(reason) => fail(ctx, subtask, reason, outcome.elapsed_ms, outcome.attempts),
        }
    }
}

fn fail(
    ctx: &RunContext,
    subtask: &Subtask,
    reason: FailureReason,
    elapsed_ms: u64,
    attempts: u32,
) -> WorkerResult {
    ctx.emit(EventPayload::SubtaskFailed(SubtaskFailedPayload {
        index: subtask.index,
        duration_ms: elapsed_ms,
        attempts,
        reason: reason.clone(),
    }));
    WorkerResult::failed(subtask.clone(), reason, elapsed_ms, attempts)
}
