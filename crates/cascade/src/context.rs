//! Per-run shared state handed to every tier.

use crate::observer::ProgressObserver;
use crate::provider::Provider;
use cascade_core::{EventPayload, Id, OrchestratorConfig, ProgressEvent, Task};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a tier needs to run its units.
///
/// Cheap to clone; all heavy state is behind `Arc`.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Id,
    pub task: Task,
    pub config: Arc<OrchestratorConfig>,
    pub provider: Arc<dyn Provider>,
    /// Fires when the run is abandoned (overall timeout or caller request).
    pub cancel: CancellationToken,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("task", &self.task)
            .field("provider", &self.provider.name())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(task: Task, config: Arc<OrchestratorConfig>, provider: Arc<dyn Provider>) -> Self {
        Self {
            run_id: Id::new(),
            task,
            config,
            provider,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Push a progress event to the observer, if any.
    pub fn emit(&self, payload: EventPayload) {
        if let Some(observer) = &self.observer {
            observer.on_event(&ProgressEvent::new(self.run_id.clone(), payload));
        }
    }
}
