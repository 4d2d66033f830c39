//! Runner for single provider calls with retries and timeouts.
//!
//! Every unit of work (a worker subtask, a synthesis group, the executive)
//! goes through [`Runner::execute`]:
//! - one timeout covering all attempts
//! - exponential backoff between retries of transient errors
//! - permanent errors fail immediately
//! - cancellation is observed while waiting and while in flight

use crate::context::RunContext;
use crate::provider::{Generation, GenerationSettings};
use cascade_core::events::{EventPayload, UnitRetryingPayload};
use cascade_core::{FailureReason, OrchestratorConfig, Prompt, Tier};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runner configuration for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Budget for all attempts of one unit.
    pub timeout: Duration,
    /// Retries after the first attempt (0 = single attempt).
    pub retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
    pub backoff_max: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::for_tier(&OrchestratorConfig::default(), Tier::Worker)
    }
}

impl RunnerConfig {
    pub fn for_tier(config: &OrchestratorConfig, tier: Tier) -> Self {
        let timeout = match tier {
            Tier::Worker => config.worker_timeout(),
            Tier::Synthesis => config.synthesis_timeout(),
            Tier::Executive => config.executive_timeout(),
        };
        Self {
            timeout,
            retries: config.retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            backoff_max: Duration::from_millis(config.retry_backoff_max_ms),
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Result of one unit after retries, timeout and cancellation.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub result: Result<Generation, FailureReason>,
    /// Provider calls made (0 when cancelled before the first call).
    pub attempts: u32,
    pub elapsed_ms: u64,
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runner for provider calls.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn for_tier(config: &OrchestratorConfig, tier: Tier) -> Self {
        Self::new(RunnerConfig::for_tier(config, tier))
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Execute one unit: `index` is the subtask or group index (0 for the executive).
    pub async fn execute(
        &self,
        ctx: &RunContext,
        tier: Tier,
        index: usize,
        prompt: &Prompt,
        settings: &GenerationSettings,
    ) -> UnitOutcome {
        let started = Instant::now();
        let mut attempts = 0;

        let result = {
            let attempt_loop = self.attempt_loop(ctx, tier, index, prompt, settings, &mut attempts);
            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    debug!(run_id = %ctx.run_id, tier = %tier, index, "unit cancelled");
                    Err(FailureReason::Cancelled)
                }
                outcome = tokio::time::timeout(self.config.timeout, attempt_loop) => {
                    outcome.unwrap_or_else(|_| {
                        warn!(
                            run_id = %ctx.run_id,
                            tier = %tier,
                            index,
                            timeout_ms = millis(self.config.timeout),
                            "unit timed out"
                        );
                        Err(FailureReason::Timeout {
                            after_ms: millis(self.config.timeout),
                        })
                    })
                }
            }
        };

        UnitOutcome {
            result,
            attempts,
            elapsed_ms: millis(started.elapsed()),
        }
    }

    async fn attempt_loop(
        &self,
        ctx: &RunContext,
        tier: Tier,
        index: usize,
        prompt: &Prompt,
        settings: &GenerationSettings,
        attempts: &mut u32,
    ) -> Result<Generation, FailureReason> {
        let max_attempts = self.config.retries.saturating_add(1);

        loop {
            *attempts += 1;
            let attempt = *attempts;
            debug!(
                run_id = %ctx.run_id,
                tier = %tier,
                index,
                attempt,
                max_attempts,
                prompt_bytes = prompt.len(),
                "calling provider"
            );

            let err = match ctx.provider.generate(prompt, settings).await {
                Ok(generation) => return Ok(generation),
                Err(err) => err,
            };

            if !err.is_transient() {
                warn!(
                    run_id = %ctx.run_id,
                    tier = %tier,
                    index,
                    attempt,
                    error = %err,
                    "provider call failed permanently"
                );
                return Err(FailureReason::Provider {
                    message: err.to_string(),
                });
            }

            if attempt >= max_attempts {
                warn!(
                    run_id = %ctx.run_id,
                    tier = %tier,
                    index,
                    attempts = attempt,
                    error = %err,
                    "retries exhausted"
                );
                return Err(FailureReason::RetriesExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let backoff = self.config.backoff_for(attempt);
            ctx.emit(EventPayload::UnitRetrying(UnitRetryingPayload {
                tier,
                index,
                attempt,
                backoff_ms: millis(backoff),
                error: err.to_string(),
            }));
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::testing::{context, Recorder, Reply, ScriptedProvider};
    use cascade_core::EventType;
    use std::sync::Arc;

    fn fast_config(retries: u32) -> RunnerConfig {
        RunnerConfig {
            timeout: Duration::from_millis(500),
            retries,
            backoff: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: None,
            temperature: 0.7,
            max_tokens: 64,
        }
    }

    fn prompt() -> Prompt {
        Prompt::new("sys", "user")
    }

    #[test]
    fn runner_config_from_orchestrator_config() {
        let mut config = OrchestratorConfig::default();
        config.retries = 4;
        config.retry_backoff_ms = 250;
        config.synthesis_timeout_sec = 12;

        let rc = RunnerConfig::for_tier(&config, Tier::Synthesis);
        assert_eq!(rc.timeout, Duration::from_secs(12));
        assert_eq!(rc.retries, 4);
        assert_eq!(rc.backoff, Duration::from_millis(250));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let rc = RunnerConfig {
            timeout: Duration::from_secs(1),
            retries: 10,
            backoff: Duration::from_millis(100),
            backoff_max: Duration::from_millis(500),
        };
        assert_eq!(rc.backoff_for(1), Duration::from_millis(100));
        assert_eq!(rc.backoff_for(2), Duration::from_millis(200));
        assert_eq!(rc.backoff_for(3), Duration::from_millis(400));
        assert_eq!(rc.backoff_for(4), Duration::from_millis(500));
        assert_eq!(rc.backoff_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn execute_succeeds_on_first_attempt() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Reply::text("done")));
        let ctx = context(provider.clone(), OrchestratorConfig::default());

        let outcome = Runner::new(fast_config(2))
            .execute(&ctx, Tier::Worker, 0, &prompt(), &settings())
            .await;

        assert_eq!(outcome.result.unwrap().text, "done");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn execute_retries_transient_errors() {
        let provider = Arc::new(ScriptedProvider::new(|_, call| {
            if call <= 2 {
                Reply::error(ProviderError::RateLimited("slow down".into()))
            } else {
                Reply::text("third time lucky")
            }
        }));
        let recorder = Arc::new(Recorder::default());
        let ctx = context(provider.clone(), OrchestratorConfig::default())
            .with_observer(recorder.clone());

        let outcome = Runner::new(fast_config(2))
            .execute(&ctx, Tier::Synthesis, 3, &prompt(), &settings())
            .await;

        assert_eq!(outcome.result.unwrap().text, "third time lucky");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            recorder.kinds(),
            vec![EventType::UnitRetrying, EventType::UnitRetrying]
        );
    }

    #[tokio::test]
    async fn execute_does_not_retry_permanent_errors() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Reply::error(ProviderError::Auth("bad key".into()))
        }));
        let ctx = context(provider.clone(), OrchestratorConfig::default());

        let outcome = Runner::new(fast_config(3))
            .execute(&ctx, Tier::Worker, 0, &prompt(), &settings())
            .await;

        assert!(matches!(
            outcome.result,
            Err(FailureReason::Provider { .. })
        ));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn execute_handles_maximum_retry_budget() {
        let provider = Arc::new(ScriptedProvider::new(|_, call| {
            if call <= 2 {
                Reply::error(ProviderError::RateLimited("busy".into()))
            } else {
                Reply::text("eventually")
            }
        }));
        let ctx = context(provider.clone(), OrchestratorConfig::default());

        let outcome = Runner::new(fast_config(u32::MAX))
            .execute(&ctx, Tier::Worker, 0, &prompt(), &settings())
            .await;

        assert_eq!(outcome.result.unwrap().text, "eventually");
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn execute_reports_exhausted_retries() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Reply::error(ProviderError::Server {
                status: 503,
                message: "unavailable".into(),
            })
        }));
        let ctx = context(provider.clone(), OrchestratorConfig::default());

        let outcome = Runner::new(fast_config(2))
            .execute(&ctx, Tier::Worker, 0, &prompt(), &settings())
            .await;

        match outcome.result {
            Err(FailureReason::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn execute_times_out_slow_provider() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Reply::text("late").after(Duration::from_secs(10))
        }));
        let ctx = context(provider, OrchestratorConfig::default());
        let config = RunnerConfig {
            timeout: Duration::from_millis(20),
            ..fast_config(0)
        };

        let outcome = Runner::new(config)
            .execute(&ctx, Tier::Worker, 0, &prompt(), &settings())
            .await;

        assert_eq!(outcome.result.unwrap_err(), FailureReason::Timeout { after_ms: 20 });
        assert!(outcome.elapsed_ms < 5_000);
    }

    #[tokio::test]
    async fn execute_observes_cancellation() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| {
            Reply::text("never").after(Duration::from_secs(10))
        }));
        let ctx = context(provider, OrchestratorConfig::default());
        let cancel = ctx.cancel.clone();

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                Runner::new(fast_config(0))
                    .execute(&ctx, Tier::Worker, 0, &Prompt::new("s", "u"), &settings())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.result.unwrap_err(), FailureReason::Cancelled);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn execute_skips_provider_when_already_cancelled() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Reply::text("x")));
        let ctx = context(provider.clone(), OrchestratorConfig::default());
        ctx.cancel.cancel();

        let outcome = Runner::new(fast_config(0))
            .execute(&ctx, Tier::Executive, 0, &prompt(), &settings())
            .await;

        assert_eq!(outcome.result.unwrap_err(), FailureReason::Cancelled);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(provider.calls(), 0);
    }
}
