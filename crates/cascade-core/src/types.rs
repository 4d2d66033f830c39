//! Core types for the tiered orchestrator.
//!
//! Workers (belters) produce one result per subtask, synthesizers (drummers)
//! condense groups of worker results, and the executive (camina) produces the
//! final report.

use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for runs.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Root task supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub description: String,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            description: description.into(),
        }
    }
}

/// Specializations assigned to workers, cycled by subtask index.
pub const SPECIALIZATIONS: [&str; 5] = ["research", "analysis", "technical", "strategic", "general"];

/// One unit of decomposed work, assigned to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// 0-based position in the decomposition.
    pub index: usize,
    pub description: String,
    /// Free-form category tag.
    pub specialization: String,
}

impl Subtask {
    pub fn new(index: usize, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            specialization: SPECIALIZATIONS[index % SPECIALIZATIONS.len()].to_string(),
        }
    }
}

/// Orchestration tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Belter.
    Worker,
    /// Drummer.
    Synthesis,
    /// Camina.
    Executive,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Synthesis => "synthesis",
            Self::Executive => "executive",
        }
    }

    /// Agent name used in prompts and logs.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Worker => "Belter",
            Self::Synthesis => "Drummer",
            Self::Executive => "Camina",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome status of a single unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Succeeded,
    Failed,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

/// Why a unit of work failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The unit did not finish within its tier timeout.
    Timeout { after_ms: u64 },
    /// The provider returned a permanent error.
    Provider { message: String },
    /// Transient errors persisted past the retry budget.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The run was cancelled while the unit was queued or in flight.
    Cancelled,
    /// Nothing to work on (e.g. every member of a group failed).
    EmptyInput,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { after_ms } => write!(f, "timeout after {after_ms}ms"),
            Self::Provider { message } => write!(f, "provider error: {message}"),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "retries exhausted after {attempts} attempts: {last_error}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::EmptyInput => f.write_str("no successful inputs"),
        }
    }
}

/// Token and dollar estimate for one or more provider calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            cost_usd: self.cost_usd + rhs.cost_usd,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, u| acc + u)
    }
}

/// Output of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub subtask: Subtask,
    pub status: UnitStatus,
    /// Generated text; empty when failed.
    pub content: String,
    pub failure: Option<FailureReason>,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub usage: Usage,
}

impl WorkerResult {
    pub fn succeeded(&self) -> bool {
        self.status == UnitStatus::Succeeded
    }

    /// Placeholder for a subtask that never produced output.
    pub fn failed(subtask: Subtask, failure: FailureReason, elapsed_ms: u64, attempts: u32) -> Self {
        Self {
            subtask,
            status: UnitStatus::Failed,
            content: String::new(),
            failure: Some(failure),
            elapsed_ms,
            attempts,
            usage: Usage::default(),
        }
    }
}

/// A contiguous batch of worker results assigned to one synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisGroup {
    pub index: usize,
    /// Worker indices, in order.
    pub members: Vec<usize>,
}

impl SynthesisGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Output of one synthesizer over its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub group_index: usize,
    /// Worker indices this synthesis covers (kept on failure).
    pub source_indices: Vec<usize>,
    pub status: UnitStatus,
    pub content: String,
    pub failure: Option<FailureReason>,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub usage: Usage,
}

impl SynthesisResult {
    pub fn succeeded(&self) -> bool {
        self.status == UnitStatus::Succeeded
    }

    /// Synthesized text, or the raw text of successful members when the
    /// synthesis failed.
    pub fn text_or_fallback(&self, workers: &[WorkerResult]) -> String {
        if self.succeeded() {
            return self.content.clone();
        }
        self.source_indices
            .iter()
            .filter_map(|&i| workers.get(i))
            .filter(|w| w.succeeded())
            .map(|w| w.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Final executive synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveResult {
    pub status: UnitStatus,
    pub content: String,
    pub failure: Option<FailureReason>,
    /// Number of inputs (synthesis outputs or worker outputs) consumed.
    pub source_count: usize,
    pub elapsed_ms: u64,
    pub attempts: u32,
    /// Usage of the executive call itself.
    pub usage: Usage,
}

impl ExecutiveResult {
    pub fn succeeded(&self) -> bool {
        self.status == UnitStatus::Succeeded
    }
}

/// Highest tier whose output became the run's final content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalTier {
    Executive,
    Synthesis,
    Workers,
}

impl FinalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::Synthesis => "synthesis",
            Self::Workers => "workers",
        }
    }
}

/// Failure counts per tier, reported alongside the final content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFailures {
    pub workers_failed: usize,
    pub workers_total: usize,
    pub groups_failed: usize,
    pub groups_total: usize,
    pub executive_failed: bool,
}

impl TierFailures {
    pub fn from_results(
        workers: &[WorkerResult],
        syntheses: &[SynthesisResult],
        executive: Option<&ExecutiveResult>,
    ) -> Self {
        Self {
            workers_failed: workers.iter().filter(|w| !w.succeeded()).count(),
            workers_total: workers.len(),
            groups_failed: syntheses.iter().filter(|s| !s.succeeded()).count(),
            groups_total: syntheses.len(),
            executive_failed: executive.is_some_and(|e| !e.succeeded()),
        }
    }

    /// Fraction of workers that succeeded (0.0 when there are none).
    pub fn worker_success_rate(&self) -> f64 {
        if self.workers_total == 0 {
            return 0.0;
        }
        (self.workers_total - self.workers_failed) as f64 / self.workers_total as f64
    }
}

/// Everything one orchestration run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Id,
    pub task: Task,
    pub topology: Topology,
    pub final_tier: FinalTier,
    /// Final report text from the highest tier produced.
    pub content: String,
    pub workers: Vec<WorkerResult>,
    pub syntheses: Vec<SynthesisResult>,
    pub executive: Option<ExecutiveResult>,
    pub failures: TierFailures,
    pub total_usage: Usage,
    pub elapsed_ms: u64,
    /// The run-level timeout fired before every tier settled.
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(index: usize, content: &str) -> WorkerResult {
        WorkerResult {
            subtask: Subtask::new(index, format!("subtask {index}")),
            status: UnitStatus::Succeeded,
            content: content.to_string(),
            failure: None,
            elapsed_ms: 10,
            attempts: 1,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                cost_usd: 0.01,
            },
        }
    }

    #[test]
    fn subtask_specialization_cycles() {
        assert_eq!(Subtask::new(0, "a").specialization, "research");
        assert_eq!(Subtask::new(4, "a").specialization, "general");
        assert_eq!(Subtask::new(5, "a").specialization, "research");
        assert_eq!(Subtask::new(7, "a").specialization, "technical");
    }

    #[test]
    fn usage_sums() {
        let total: Usage = vec![worker(0, "a").usage, worker(1, "b").usage]
            .into_iter()
            .sum();
        assert_eq!(total.prompt_tokens, 20);
        assert_eq!(total.completion_tokens, 10);
        assert_eq!(total.total_tokens(), 30);
        assert!((total.cost_usd - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn failed_synthesis_falls_back_to_member_text() {
        let workers = vec![
            worker(0, "alpha"),
            WorkerResult::failed(Subtask::new(1, "b"), FailureReason::Cancelled, 0, 0),
            worker(2, "gamma"),
        ];
        let synthesis = SynthesisResult {
            group_index: 0,
            source_indices: vec![0, 1, 2],
            status: UnitStatus::Failed,
            content: String::new(),
            failure: Some(FailureReason::Timeout { after_ms: 5 }),
            elapsed_ms: 5,
            attempts: 1,
            usage: Usage::default(),
        };
        assert_eq!(synthesis.text_or_fallback(&workers), "alpha\n\ngamma");
    }

    #[test]
    fn tier_failures_counts_each_tier() {
        let workers = vec![
            worker(0, "a"),
            WorkerResult::failed(Subtask::new(1, "b"), FailureReason::Cancelled, 0, 0),
        ];
        let failures = TierFailures::from_results(&workers, &[], None);
        assert_eq!(failures.workers_failed, 1);
        assert_eq!(failures.workers_total, 2);
        assert_eq!(failures.groups_total, 0);
        assert!(!failures.executive_failed);
        assert!((failures.worker_success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn failure_reason_serializes_with_kind_tag() {
        let json = serde_json::to_string(&FailureReason::Timeout { after_ms: 1500 }).unwrap();
        assert_eq!(json, r#"{"kind":"timeout","after_ms":1500}"#);
        let json = serde_json::to_string(&FailureReason::Cancelled).unwrap();
        assert_eq!(json, r#"{"kind":"cancelled"}"#);
    }
}
