//! Progress events pushed to observers during a run.
//!
//! Events are the only externally visible stream of a run in flight; they
//! are not needed for correctness.

use crate::types::{FailureReason, FinalTier, Id, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    DecompositionComplete,
    TopologyResolved,
    SubtaskStarted,
    SubtaskCompleted,
    SubtaskFailed,
    UnitRetrying,
    GroupStarted,
    GroupCompleted,
    GroupFailed,
    ExecutiveStarted,
    ExecutiveCompleted,
    ExecutiveFailed,
    RunCompleted,
    RunFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "RUN_STARTED",
            Self::DecompositionComplete => "DECOMPOSITION_COMPLETE",
            Self::TopologyResolved => "TOPOLOGY_RESOLVED",
            Self::SubtaskStarted => "SUBTASK_STARTED",
            Self::SubtaskCompleted => "SUBTASK_COMPLETED",
            Self::SubtaskFailed => "SUBTASK_FAILED",
            Self::UnitRetrying => "UNIT_RETRYING",
            Self::GroupStarted => "GROUP_STARTED",
            Self::GroupCompleted => "GROUP_COMPLETED",
            Self::GroupFailed => "GROUP_FAILED",
            Self::ExecutiveStarted => "EXECUTIVE_STARTED",
            Self::ExecutiveCompleted => "EXECUTIVE_COMPLETED",
            Self::ExecutiveFailed => "EXECUTIVE_FAILED",
            Self::RunCompleted => "RUN_COMPLETED",
            Self::RunFailed => "RUN_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    pub task: String,
    pub worker_count: usize,
    pub concurrency_cap: usize,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionCompletePayload {
    /// Subtasks returned by the decomposer before normalization.
    pub decomposed: usize,
    /// Subtasks after padding/truncation.
    pub subtask_count: usize,
    pub padded: usize,
    pub truncated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyResolvedPayload {
    pub workers: usize,
    pub synthesizers: usize,
    pub executive: bool,
    pub group_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskStartedPayload {
    pub index: usize,
    pub specialization: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskCompletedPayload {
    pub index: usize,
    pub duration_ms: u64,
    pub attempts: u32,
    pub output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskFailedPayload {
    pub index: usize,
    pub duration_ms: u64,
    pub attempts: u32,
    pub reason: FailureReason,
}

/// A transient provider error is about to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRetryingPayload {
    pub tier: Tier,
    /// Subtask or group index; 0 for the executive.
    pub index: usize,
    /// Attempt that just failed (1-based).
    pub attempt: u32,
    pub backoff_ms: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStartedPayload {
    pub index: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCompletedPayload {
    pub index: usize,
    pub duration_ms: u64,
    pub attempts: u32,
    pub output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupFailedPayload {
    pub index: usize,
    pub duration_ms: u64,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveStartedPayload {
    pub inputs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveCompletedPayload {
    pub duration_ms: u64,
    pub attempts: u32,
    pub output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveFailedPayload {
    pub duration_ms: u64,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub final_tier: FinalTier,
    pub workers_failed: usize,
    pub groups_failed: usize,
    pub executive_failed: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailedPayload {
    pub reason: String,
}

/// Union type for all event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    RunStarted(RunStartedPayload),
    DecompositionComplete(DecompositionCompletePayload),
    TopologyResolved(TopologyResolvedPayload),
    SubtaskStarted(SubtaskStartedPayload),
    SubtaskCompleted(SubtaskCompletedPayload),
    SubtaskFailed(SubtaskFailedPayload),
    UnitRetrying(UnitRetryingPayload),
    GroupStarted(GroupStartedPayload),
    GroupCompleted(GroupCompletedPayload),
    GroupFailed(GroupFailedPayload),
    ExecutiveStarted(ExecutiveStartedPayload),
    ExecutiveCompleted(ExecutiveCompletedPayload),
    ExecutiveFailed(ExecutiveFailedPayload),
    RunCompleted(RunCompletedPayload),
    RunFailed(RunFailedPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::RunStarted(_) => EventType::RunStarted,
            Self::DecompositionComplete(_) => EventType::DecompositionComplete,
            Self::TopologyResolved(_) => EventType::TopologyResolved,
            Self::SubtaskStarted(_) => EventType::SubtaskStarted,
            Self::SubtaskCompleted(_) => EventType::SubtaskCompleted,
            Self::SubtaskFailed(_) => EventType::SubtaskFailed,
            Self::UnitRetrying(_) => EventType::UnitRetrying,
            Self::GroupStarted(_) => EventType::GroupStarted,
            Self::GroupCompleted(_) => EventType::GroupCompleted,
            Self::GroupFailed(_) => EventType::GroupFailed,
            Self::ExecutiveStarted(_) => EventType::ExecutiveStarted,
            Self::ExecutiveCompleted(_) => EventType::ExecutiveCompleted,
            Self::ExecutiveFailed(_) => EventType::ExecutiveFailed,
            Self::RunCompleted(_) => EventType::RunCompleted,
            Self::RunFailed(_) => EventType::RunFailed,
        }
    }

    /// Tier the event belongs to, if any.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::SubtaskStarted(_) | Self::SubtaskCompleted(_) | Self::SubtaskFailed(_) => {
                Some(Tier::Worker)
            }
            Self::GroupStarted(_) | Self::GroupCompleted(_) | Self::GroupFailed(_) => {
                Some(Tier::Synthesis)
            }
            Self::ExecutiveStarted(_) | Self::ExecutiveCompleted(_) | Self::ExecutiveFailed(_) => {
                Some(Tier::Executive)
            }
            Self::UnitRetrying(p) => Some(p.tier),
            _ => None,
        }
    }
}

/// One timestamped event for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Id,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn new(run_id: Id, payload: EventPayload) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_correctly() {
        assert_eq!(
            serde_json::to_string(&EventType::SubtaskStarted).unwrap(),
            "\"SUBTASK_STARTED\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::RunCompleted).unwrap(),
            "\"RUN_COMPLETED\""
        );
        assert_eq!(EventType::GroupFailed.as_str(), "GROUP_FAILED");
    }

    #[test]
    fn progress_event_json_is_flat_and_tagged() {
        let event = ProgressEvent::new(
            Id::from_string("run-1"),
            EventPayload::SubtaskFailed(SubtaskFailedPayload {
                index: 3,
                duration_ms: 120,
                attempts: 3,
                reason: FailureReason::Timeout { after_ms: 100 },
            }),
        );
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["type"], "SUBTASK_FAILED");
        assert_eq!(json["index"], 3);
        assert_eq!(json["reason"]["kind"], "timeout");
    }

    #[test]
    fn payload_reports_its_tier() {
        let retry = EventPayload::UnitRetrying(UnitRetryingPayload {
            tier: Tier::Synthesis,
            index: 1,
            attempt: 1,
            backoff_ms: 1000,
            error: "rate limited".to_string(),
        });
        assert_eq!(retry.tier(), Some(Tier::Synthesis));
        assert_eq!(retry.event_type(), EventType::UnitRetrying);

        let started = EventPayload::ExecutiveStarted(ExecutiveStartedPayload { inputs: 2 });
        assert_eq!(started.tier(), Some(Tier::Executive));

        let failed = EventPayload::RunFailed(RunFailedPayload {
            reason: "no subtasks".to_string(),
        });
        assert_eq!(failed.tier(), None);
    }
}
