//! Prompt assembly for each tier.
//!
//! Every provider call receives a system instruction naming the agent role and
//! a user message carrying the root task plus the tier's inputs.

use crate::types::{Subtask, Task, Tier, WorkerResult};
use serde::{Deserialize, Serialize};

/// Separator between worker outputs inside a synthesis prompt.
pub const WORKER_SEPARATOR: &str = "\n\n---\n\n";

/// Separator between synthesis outputs inside an executive prompt.
pub const SYNTHESIS_SEPARATOR: &str = "\n\n===\n\n";

/// A system/user message pair sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Rough size in bytes, used for logging.
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }
}

const DECOMPOSITION_SYSTEM: &str = "You are a task decomposition specialist. Break down complex \
tasks into specific, actionable subtasks that can be executed independently.

Rules:
1. Each subtask should be self-contained and specific
2. Subtasks should cover all aspects of the main task
3. Output ONLY a numbered list of subtasks
4. No explanations or additional text";

/// Ask the provider for a numbered list of `target` subtasks.
pub fn decomposition_prompt(task: &Task, target: usize) -> Prompt {
    Prompt::new(
        DECOMPOSITION_SYSTEM,
        format!(
            "Break down this task into {target} subtasks:\n\n{}",
            task.description
        ),
    )
}

pub fn worker_prompt(task: &Task, subtask: &Subtask) -> Prompt {
    Prompt::new(
        format!(
            "You are a specialized research agent called a '{}'. Your specialization is {}.",
            Tier::Worker.agent_name(),
            subtask.specialization
        ),
        format!(
            "Research task: {}\n\nContext: part {} of the overall task \"{}\"",
            subtask.description,
            subtask.index + 1,
            task.description
        ),
    )
}

/// Synthesis prompt over the successful members of one group.
///
/// Failed members are skipped; callers guarantee at least one success.
pub fn synthesis_prompt(task: &Task, members: &[&WorkerResult]) -> Prompt {
    let findings = members
        .iter()
        .filter(|w| w.succeeded())
        .map(|w| {
            format!(
                "{} {} ({}):\n{}",
                Tier::Worker.agent_name(),
                w.subtask.index + 1,
                w.subtask.specialization,
                w.content
            )
        })
        .collect::<Vec<_>>()
        .join(WORKER_SEPARATOR);

    Prompt::new(
        format!(
            "You are a synthesis agent called a '{}'. Your job is to aggregate findings \
from {} research '{}s' into a coherent report.",
            Tier::Synthesis.agent_name(),
            members.len(),
            Tier::Worker.agent_name()
        ),
        format!(
            "Original Query: {}\n\n{} Findings:\n{findings}\n\nPlease synthesize these findings \
into a detailed summary.",
            task.description,
            Tier::Worker.agent_name()
        ),
    )
}

/// Executive prompt over synthesis texts, given as `(group_index, text)`.
pub fn executive_prompt_from_syntheses(task: &Task, syntheses: &[(usize, String)]) -> Prompt {
    let body = syntheses
        .iter()
        .map(|(index, text)| {
            format!(
                "{} {} Synthesis:\n{text}",
                Tier::Synthesis.agent_name(),
                index + 1
            )
        })
        .collect::<Vec<_>>()
        .join(SYNTHESIS_SEPARATOR);

    executive_prompt(task, &format!("{} Syntheses", Tier::Synthesis.agent_name()), &body)
}

/// Executive prompt directly over worker outputs (no synthesis tier).
pub fn executive_prompt_from_workers(task: &Task, workers: &[WorkerResult]) -> Prompt {
    let body = workers
        .iter()
        .filter(|w| w.succeeded())
        .map(|w| {
            format!(
                "{} {} ({}):\n{}",
                Tier::Worker.agent_name(),
                w.subtask.index + 1,
                w.subtask.specialization,
                w.content
            )
        })
        .collect::<Vec<_>>()
        .join(WORKER_SEPARATOR);

    executive_prompt(task, &format!("{} Findings", Tier::Worker.agent_name()), &body)
}

fn executive_prompt(task: &Task, heading: &str, body: &str) -> Prompt {
    Prompt::new(
        format!(
            "You are an executive synthesis agent called '{}'. Your job is to provide the \
final high-level executive report based on the material below.",
            Tier::Executive.agent_name()
        ),
        format!(
            "Original Query: {}\n\n{heading}:\n{body}\n\nPlease create the final executive \
summary and key findings.",
            task.description
        ),
    )
}

/// Concatenate successful worker outputs in subtask order.
pub fn aggregate_worker_text(workers: &[WorkerResult]) -> String {
    workers
        .iter()
        .filter(|w| w.succeeded())
        .map(|w| format!("## {}\n\n{}", w.subtask.description, w.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureReason, UnitStatus, Usage};

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

    #[test]
    fn worker_prompt_names_specialization() {
        let task = Task::new("Survey rust async runtimes");
        let prompt = worker_prompt(&task, &Subtask::new(1, "Compare schedulers"));
        assert!(prompt.system.contains("'Belter'"));
        assert!(prompt.system.contains("analysis"));
        assert!(prompt.user.starts_with("Research task: Compare schedulers"));
        assert!(prompt.user.contains("Survey rust async runtimes"));
    }

    #[test]
    fn synthesis_prompt_skips_failed_members() {
        let task = Task::new("t");
        let ok = worker(0, "first finding");
        let failed = WorkerResult::failed(
            Subtask::new(1, "b"),
            FailureReason::Timeout { after_ms: 10 },
            10,
            1,
        );
        let ok2 = worker(2, "third finding");
        let prompt = synthesis_prompt(&task, &[&ok, &failed, &ok2]);

        assert!(prompt.system.contains("'Drummer'"));
        assert!(prompt.user.contains("first finding"));
        assert!(prompt.user.contains("third finding"));
        assert!(prompt.user.contains(WORKER_SEPARATOR));
        assert!(!prompt.user.contains("Belter 2 "));
    }

    #[test]
    fn executive_prompt_lists_syntheses_in_order() {
        let task = Task::new("t");
        let prompt = executive_prompt_from_syntheses(
            &task,
            &[(0, "alpha".to_string()), (1, "beta".to_string())],
        );
        assert!(prompt.system.contains("'Camina'"));
        let alpha = prompt.user.find("alpha").unwrap();
        let beta = prompt.user.find("beta").unwrap();
        assert!(alpha < beta);
        assert!(prompt.user.contains("Drummer 1 Synthesis"));
        assert!(prompt.user.contains(SYNTHESIS_SEPARATOR));
    }

    #[test]
    fn aggregate_worker_text_keeps_subtask_order() {
        let workers = vec![
            worker(0, "one"),
            WorkerResult::failed(Subtask::new(1, "b"), FailureReason::Cancelled, 0, 0),
            worker(2, "three"),
        ];
        let text = aggregate_worker_text(&workers);
        assert_eq!(text, "## angle 0\n\none\n\n## angle 2\n\nthree");
    }

    #[test]
    fn decomposition_prompt_requests_target_count() {
        let prompt = decomposition_prompt(&Task::new("Plan a launch"), 7);
        assert!(prompt.user.contains("7 subtasks"));
        assert!(prompt.system.contains("numbered list"));
    }
}
