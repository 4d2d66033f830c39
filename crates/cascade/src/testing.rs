//! Test doubles shared by the unit tests.

use crate::context::RunContext;
use crate::observer::ProgressObserver;
use crate::provider::{Generation, GenerationSettings, Provider, ProviderError};
use async_trait::async_trait;
use cascade_core::{EventType, OrchestratorConfig, ProgressEvent, Prompt, Task, Usage};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted provider does for one call.
pub(crate) struct Reply {
    delay: Duration,
    result: Result<String, ProviderError>,
}

impl Reply {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(text.into()),
        }
    }

    pub(crate) fn error(err: ProviderError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(err),
        }
    }

    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = Box<dyn Fn(&Prompt, u32) -> Reply + Send + Sync>;

/// Provider whose answers come from a closure of `(prompt, call_number)`.
pub(crate) struct ScriptedProvider {
    responder: Responder,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub(crate) fn new(responder: impl Fn(&Prompt, u32) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _settings: &GenerationSettings,
    ) -> Result<Generation, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let reply = (self.responder)(prompt, call);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result.map(|text| Generation {
            text,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                cost_usd: 0.001,
            },
        })
    }
}

/// Collects every event it sees.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Recorder {
    pub(crate) fn kinds(&self) -> Vec<EventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(ProgressEvent::event_type)
            .collect()
    }
}

impl ProgressObserver for Recorder {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) fn context(provider: Arc<dyn Provider>, config: OrchestratorConfig) -> RunContext {
    RunContext::new(Task::new("Assess the state of orbital mining"), Arc::new(config), provider)
}
