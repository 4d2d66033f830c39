//! cascade - hierarchical fan-out/fan-in orchestration over LLM providers.
//!
//! A root task is decomposed into subtasks, run by a pool of workers, condensed
//! by synthesis groups, and optionally summarized once more by an executive.

pub mod context;
pub mod decompose;
pub mod executive;
pub mod observer;
pub mod orchestrator;
pub mod pool;
pub mod provider;
pub mod render;
pub mod runner;
pub mod synthesis;

#[cfg(test)]
mod testing;

pub use context::RunContext;
pub use decompose::{Decomposer, ProviderDecomposer, TemplateDecomposer};
pub use executive::{synthesize_executive, ExecutiveInput};
pub use observer::{FanoutObserver, ProgressObserver, ReportObserver, TracingObserver};
pub use orchestrator::{OrchestrationError, Orchestrator};
pub use pool::WorkerPool;
pub use provider::{build_provider, Generation, GenerationSettings, Provider, ProviderError};
pub use synthesis::{partition, synthesize_groups};
