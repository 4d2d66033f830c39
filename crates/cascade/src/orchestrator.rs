//! Orchestrator: decompose, fan out, fan in, and assemble the run outcome.
//!
//! Tiers run strictly in sequence (workers, synthesis, executive); units within
//! a tier run concurrently. Only a run with nothing to work on, or one where
//! every worker failed, is an error. Everything else degrades to the highest
//! tier that produced output.

use crate::context::RunContext;
use crate::decompose::{build_decomposer, normalize, DecomposeError, Decomposer};
use crate::executive::{synthesize_executive, ExecutiveInput};
use crate::observer::ProgressObserver;
use crate::pool::WorkerPool;
use crate::provider::Provider;
use crate::runner::millis;
use crate::synthesis::synthesize_groups;
use cascade_core::config::ConfigError;
use cascade_core::events::{
    DecompositionCompletePayload, EventPayload, RunCompletedPayload, RunFailedPayload,
    RunStartedPayload, TopologyResolvedPayload,
};
use cascade_core::prompt::{aggregate_worker_text, SYNTHESIS_SEPARATOR};
use cascade_core::topology::MIN_SYNTHESES_FOR_EXECUTIVE;
use cascade_core::{
    ExecutiveResult, FinalTier, OrchestratorConfig, RunOutcome, SynthesisResult, Task,
    TierFailures, Usage, WorkerResult,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("decomposition failed: {0}")]
    Decomposition(#[from] DecomposeError),

    #[error("decomposition produced no subtasks")]
    NoSubtasks,

    #[error("all {total} workers failed")]
    AllWorkersFailed { total: usize },

    #[error("run cancelled before any worker started")]
    Cancelled,
}

/// Cancels the run token when the overall timeout elapses; disarmed on drop.
struct TimeoutGuard(Option<JoinHandle<()>>);

impl TimeoutGuard {
    fn arm(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self(timeout.map(|timeout| {
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                info!(
                    timeout_ms = millis(timeout),
                    "overall timeout reached; cancelling run"
                );
                cancel.cancel();
            })
        }))
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Drives one task through every tier.
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    provider: Arc<dyn Provider>,
    decomposer: Arc<dyn Decomposer>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator with the decomposer selected by `config.decomposer`.
    pub fn new(config: OrchestratorConfig, provider: Arc<dyn Provider>) -> Self {
        let decomposer = build_decomposer(&config, Arc::clone(&provider));
        Self {
            config: Arc::new(config),
            provider,
            decomposer,
            observer: None,
        }
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn run(&self, task: Task) -> Result<RunOutcome, OrchestrationError> {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    /// Run `task`; cancelling `cancel` abandons in-flight work the same way the
    /// overall timeout does.
    pub async fn run_with_cancel(
        &self,
        task: Task,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, OrchestrationError> {
        self.config.validate()?;

        let started = Instant::now();
        let mut ctx = RunContext::new(
            task,
            Arc::clone(&self.config),
            Arc::clone(&self.provider),
        )
        .with_cancel(cancel.child_token());
        if let Some(observer) = &self.observer {
            ctx = ctx.with_observer(Arc::clone(observer));
        }
        let _timeout = TimeoutGuard::arm(ctx.cancel.clone(), self.config.overall_timeout());

        let result = self.drive(&ctx, started).await;
        if let Err(err) = &result {
            ctx.emit(EventPayload::RunFailed(RunFailedPayload {
                reason: err.to_string(),
            }));
        }
        result
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        started: Instant,
    ) -> Result<RunOutcome, OrchestrationError> {
        let config = &self.config;
        ctx.emit(EventPayload::RunStarted(RunStartedPayload {
            task: ctx.task.description.clone(),
            worker_count: config.worker_count,
            concurrency_cap: config.concurrency_cap,
            provider: self.provider.name().to_string(),
        }));

        // Decomposition
        let raw = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            raw = self.decomposer.decompose(&ctx.task, config.worker_count) => raw?,
        };
        let normalized = normalize(raw, &ctx.task.description, config.worker_count);
        if normalized.decomposed == 0 {
            return Err(OrchestrationError::NoSubtasks);
        }
        ctx.emit(EventPayload::DecompositionComplete(
            DecompositionCompletePayload {
                decomposed: normalized.decomposed,
                subtask_count: normalized.subtasks.len(),
                padded: normalized.padded,
                truncated: normalized.truncated,
            },
        ));
        let subtasks = normalized.subtasks;

        // Topology
        let topology = config.topology_for(subtasks.len());
        ctx.emit(EventPayload::TopologyResolved(TopologyResolvedPayload {
            workers: topology.workers,
            synthesizers: topology.synthesizers,
            executive: topology.executive,
            group_size: topology.group_size(),
        }));

        // Workers
        let workers = WorkerPool::for_context(ctx)
            .execute_all(ctx, &subtasks)
            .await;
        if !workers.iter().any(WorkerResult::succeeded) {
            return Err(OrchestrationError::AllWorkersFailed {
                total: workers.len(),
            });
        }

        // Synthesis
        let syntheses = if topology.synthesizers > 0 {
            synthesize_groups(ctx, &workers, topology.group_size()).await
        } else {
            Vec::new()
        };

        // Executive
        let executive = if topology.executive && syntheses.len() >= MIN_SYNTHESES_FOR_EXECUTIVE {
            Some(
                synthesize_executive(
                    ctx,
                    ExecutiveInput::Syntheses {
                        syntheses: &syntheses,
                        workers: &workers,
                    },
                )
                .await,
            )
        } else {
            debug!(
                run_id = %ctx.run_id,
                groups = syntheses.len(),
                "executive tier skipped"
            );
            None
        };

        let (final_tier, content) = final_content(&workers, &syntheses, executive.as_ref());
        let failures = TierFailures::from_results(&workers, &syntheses, executive.as_ref());
        let total_usage: Usage = workers
            .iter()
            .map(|w| w.usage)
            .chain(syntheses.iter().map(|s| s.usage))
            .chain(executive.iter().map(|e| e.usage))
            .sum();
        let cancelled = ctx.cancel.is_cancelled();
        let elapsed_ms = millis(started.elapsed());

        ctx.emit(EventPayload::RunCompleted(RunCompletedPayload {
            final_tier,
            workers_failed: failures.workers_failed,
            groups_failed: failures.groups_failed,
            executive_failed: failures.executive_failed,
            cancelled,
            duration_ms: elapsed_ms,
            cost_usd: total_usage.cost_usd,
        }));

        Ok(RunOutcome {
            run_id: ctx.run_id.clone(),
            task: ctx.task.clone(),
            topology,
            final_tier,
            content,
            workers,
            syntheses,
            executive,
            failures,
            total_usage,
            elapsed_ms,
            cancelled,
        })
    }
}

/// Pick the highest tier that produced usable output.
fn final_content(
    workers: &[WorkerResult],
    syntheses: &[SynthesisResult],
    executive: Option<&ExecutiveResult>,
) -> (FinalTier, String) {
    if let Some(executive) = executive.filter(|e| e.succeeded()) {
        return (FinalTier::Executive, executive.content.clone());
    }

    if syntheses.iter().any(SynthesisResult::succeeded) {
        let text = syntheses
            .iter()
            .map(|s| s.text_or_fallback(workers))
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join(SYNTHESIS_SEPARATOR);
        return (FinalTier::Synthesis, text);
    }

    (FinalTier::Workers, aggregate_worker_text(workers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{FailureReason, Subtask, UnitStatus};

    fn worker(index: usize, content: &str) -> WorkerResult {
        WorkerResult {
            subtask: Subtask::new(index, format!("angle {index}")),
            status: UnitStatus::Succeeded,
            content: content.to_string(),
            failure: None,
            elapsed_ms: 1,
            attempts: 1,
            usage: Usage::default(),
        }
    }

    fn synthesis(group_index: usize, sources: Vec<usize>, content: Option<&str>) -> SynthesisResult {
        SynthesisResult {
            group_index,
            source_indices: sources,
            status: if content.is_some() {
                UnitStatus::Succeeded
            } else {
                UnitStatus::Failed
            },
            content: content.unwrap_or_default().to_string(),
            failure: content.is_none().then_some(FailureReason::Cancelled),
            elapsed_ms: 1,
            attempts: 1,
            usage: Usage::default(),
        }
    }

    fn failed_executive() -> ExecutiveResult {
        ExecutiveResult {
            status: UnitStatus::Failed,
            content: String::new(),
            failure: Some(FailureReason::Timeout { after_ms: 5 }),
            source_count: 2,
            elapsed_ms: 5,
            attempts: 1,
            usage: Usage::default(),
        }
    }

    #[test]
    fn executive_failure_degrades_to_syntheses_with_fallback() {
        let workers = vec![worker(0, "a"), worker(1, "b"), worker(2, "c")];
        let syntheses = vec![
            synthesis(0, vec![0, 1], Some("summary ab")),
            synthesis(1, vec![2], None),
        ];
        let (tier, content) = final_content(&workers, &syntheses, Some(&failed_executive()));
        assert_eq!(tier, FinalTier::Synthesis);
        assert_eq!(content, format!("summary ab{SYNTHESIS_SEPARATOR}c"));
    }

    #[test]
    fn all_groups_failed_degrades_to_workers() {
        let workers = vec![worker(0, "a"), worker(1, "b")];
        let syntheses = vec![synthesis(0, vec![0, 1], None)];
        let (tier, content) = final_content(&workers, &syntheses, None);
        assert_eq!(tier, FinalTier::Workers);
        assert_eq!(content, aggregate_worker_text(&workers));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_running() {
        let mut config = OrchestratorConfig::default();
        config.worker_count = 0;
        let orchestrator = Orchestrator::new(config, Arc::new(crate::provider::EchoProvider::default()));
        let err = orchestrator.run(Task::new("anything")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[tokio::test]
    async fn timeout_guard_cancels_after_deadline() {
        let cancel = CancellationToken::new();
        let _guard = TimeoutGuard::arm(cancel.clone(), Some(Duration::from_millis(5)));
        tokio::time::timeout(Duration::from_secs(2), cancel.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_timeout_guard_never_fires() {
        let cancel = CancellationToken::new();
        drop(TimeoutGuard::arm(cancel.clone(), Some(Duration::from_millis(5))));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cancel.is_cancelled());
    }
}
