pub mod config;
pub mod events;
pub mod prompt;
pub mod report;
pub mod topology;
pub mod types;

pub use config::OrchestratorConfig;
pub use events::{EventPayload, EventType, ProgressEvent};
pub use prompt::Prompt;
pub use report::{ReportRow, ReportWriter};
pub use topology::Topology;
pub use types::*;
