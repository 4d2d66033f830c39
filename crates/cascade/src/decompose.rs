//! Task decomposition: turning one root task into worker subtasks.
//!
//! Two decomposers are provided. [`TemplateDecomposer`] is deterministic and
//! keyword driven; [`ProviderDecomposer`] asks the LLM for a numbered list and
//! falls back to the templates when the call fails or yields nothing usable.
//! Either way the orchestrator runs the raw list through [`normalize`].

use crate::provider::{GenerationSettings, Provider, ProviderError};
use async_trait::async_trait;
use cascade_core::config::{DecomposerKind, OrchestratorConfig};
use cascade_core::prompt::decomposition_prompt;
use cascade_core::{Subtask, Task};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Items shorter than this (in characters) are dropped from provider output.
pub const MIN_SUBTASK_CHARS: usize = 10;

const DECOMPOSITION_TEMPERATURE: f32 = 0.5;
const DECOMPOSITION_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("decomposition provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("decomposition timed out after {0:?}")]
    Timeout(Duration),
}

/// Splits a root task into ordered subtask descriptions.
///
/// The returned count need not match `target`; callers normalize it.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, task: &Task, target: usize) -> Result<Vec<String>, DecomposeError>;
}

/// Recognized task domains for template decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Research,
    Software,
    Analysis,
    Planning,
}

impl Domain {
    /// Checked in this order; the first keyword hit wins.
    const ALL: [Domain; 4] = [
        Domain::Research,
        Domain::Software,
        Domain::Analysis,
        Domain::Planning,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Research => &["research", "investigate", "study", "analyze", "explore"],
            Self::Software => &["develop", "implement", "code", "build", "software", "app"],
            Self::Analysis => &["analyze", "evaluate", "assess", "examine", "compare"],
            Self::Planning => &["plan", "strategy", "roadmap", "organize", "design"],
        }
    }

    fn steps(self) -> [&'static str; 5] {
        match self {
            Self::Research => [
                "Define research questions and objectives",
                "Conduct literature review and background research",
                "Identify primary and secondary data sources",
                "Analyze and synthesize research findings",
                "Formulate conclusions and recommendations",
            ],
            Self::Software => [
                "Define requirements and specifications",
                "Design system architecture and components",
                "Implement core functionality",
                "Write tests and documentation",
                "Perform integration and deployment",
            ],
            Self::Analysis => [
                "Define analysis scope and objectives",
                "Gather and prepare relevant data",
                "Apply analytical methods and techniques",
                "Interpret results and identify patterns",
                "Present findings and recommendations",
            ],
            Self::Planning => [
                "Define goals and success criteria",
                "Identify resources and constraints",
                "Develop action plan and timeline",
                "Identify risks and mitigation strategies",
                "Define monitoring and evaluation approach",
            ],
        }
    }

    pub fn detect(task: &str) -> Option<Self> {
        let lower = task.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|domain| domain.keywords().iter().any(|k| lower.contains(k)))
    }
}

const GENERIC_ANGLES: [&str; 5] = [
    "Research and gather relevant information about",
    "Analyze key aspects and factors related to",
    "Identify challenges and opportunities for",
    "Evaluate different approaches and strategies for",
    "Synthesize findings and formulate recommendations for",
];

/// Sub-angles used to pad a short decomposition.
const PADDING_ANGLES: [&str; 15] = [
    "Conduct supplementary research on",
    "Perform detailed analysis of",
    "Investigate related aspects of",
    "Gather additional perspectives on",
    "Examine supporting evidence for",
    "Research secondary sources about",
    "Analyze contextual factors of",
    "Study comparative examples of",
    "Evaluate different approaches to",
    "Explore implications and consequences of",
    "Review best practices related to",
    "Investigate potential challenges with",
    "Research implementation strategies for",
    "Analyze stakeholder perspectives on",
    "Study market and industry context of",
];

/// Deterministic keyword-driven decomposition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateDecomposer;

impl TemplateDecomposer {
    pub fn subtasks_for(task: &str) -> Vec<String> {
        match Domain::detect(task) {
            Some(domain) => domain
                .steps()
                .iter()
                .map(|step| format!("{step} for: {task}"))
                .collect(),
            None => GENERIC_ANGLES
                .iter()
                .map(|angle| format!("{angle}: {task}"))
                .collect(),
        }
    }
}

#[async_trait]
impl Decomposer for TemplateDecomposer {
    async fn decompose(&self, task: &Task, _target: usize) -> Result<Vec<String>, DecomposeError> {
        Ok(Self::subtasks_for(&task.description))
    }
}

/// Asks the provider for a numbered list of subtasks.
pub struct ProviderDecomposer {
    provider: Arc<dyn Provider>,
    model: Option<String>,
    timeout: Duration,
}

impl ProviderDecomposer {
    pub fn new(provider: Arc<dyn Provider>, model: Option<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model,
            timeout,
        }
    }

    async fn ask(&self, task: &Task, target: usize) -> Result<Vec<String>, DecomposeError> {
        let prompt = decomposition_prompt(task, target);
        let settings = GenerationSettings {
            model: self.model.clone(),
            temperature: DECOMPOSITION_TEMPERATURE,
            max_tokens: DECOMPOSITION_MAX_TOKENS,
        };
        let generation = tokio::time::timeout(self.timeout, self.provider.generate(&prompt, &settings))
            .await
            .map_err(|_| DecomposeError::Timeout(self.timeout))??;
        Ok(validate(parse_numbered_list(&generation.text)))
    }
}

#[async_trait]
impl Decomposer for ProviderDecomposer {
    async fn decompose(&self, task: &Task, target: usize) -> Result<Vec<String>, DecomposeError> {
        match self.ask(task, target).await {
            Ok(items) if !items.is_empty() => {
                debug!(items = items.len(), "provider decomposition parsed");
                Ok(items)
            }
            Ok(_) => {
                warn!("provider decomposition yielded no items; using templates");
                Ok(TemplateDecomposer::subtasks_for(&task.description))
            }
            Err(err) => {
                warn!(error = %err, "provider decomposition failed; using templates");
                Ok(TemplateDecomposer::subtasks_for(&task.description))
            }
        }
    }
}

/// Decomposer selected by `config.decomposer`.
pub fn build_decomposer(
    config: &OrchestratorConfig,
    provider: Arc<dyn Provider>,
) -> Arc<dyn Decomposer> {
    match config.decomposer {
        DecomposerKind::Template => Arc::new(TemplateDecomposer),
        DecomposerKind::Provider => Arc::new(ProviderDecomposer::new(
            provider,
            config.model.clone(),
            config.worker_timeout(),
        )),
    }
}

/// Extract list items from LLM output.
///
/// Accepts `1.`, `1)`, `-`, `*` and `•` markers; other lines are ignored.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let item = if digits > 0 {
                line[digits..]
                    .strip_prefix('.')
                    .or_else(|| line[digits..].strip_prefix(')'))?
            } else {
                ["- ", "* ", "• "]
                    .iter()
                    .find_map(|marker| line.strip_prefix(marker))?
            };
            let item = item.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

/// Drop items that are too short to act on, and exact duplicates.
pub fn validate(items: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if item.trim().chars().count() < MIN_SUBTASK_CHARS || kept.contains(&item) {
            continue;
        }
        kept.push(item);
    }
    kept
}

/// Subtasks after padding/truncation to the requested worker count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub subtasks: Vec<Subtask>,
    /// Usable items the decomposer returned.
    pub decomposed: usize,
    pub padded: usize,
    pub truncated: usize,
}

/// Shape a raw decomposition into exactly `target` subtasks.
///
/// Blank items are discarded. When nothing usable remains the result is
/// empty (`decomposed == 0`) and no padding is applied.
pub fn normalize(raw: Vec<String>, task: &str, target: usize) -> Normalized {
    let mut items: Vec<String> = raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let decomposed = items.len();

    if decomposed == 0 {
        return Normalized {
            subtasks: Vec::new(),
            decomposed,
            padded: 0,
            truncated: 0,
        };
    }

    let truncated = decomposed.saturating_sub(target);
    items.truncate(target);

    let padded = target.saturating_sub(items.len());
    items.extend((0..padded).map(|i| padding_angle(i, task)));

    Normalized {
        subtasks: items
            .into_iter()
            .enumerate()
            .map(|(index, description)| Subtask::new(index, description))
            .collect(),
        decomposed,
        padded,
        truncated,
    }
}

fn padding_angle(i: usize, task: &str) -> String {
    let angle = PADDING_ANGLES[i % PADDING_ANGLES.len()];
    let pass = i / PADDING_ANGLES.len();
    if pass == 0 {
        format!("{angle}: {task}")
    } else {
        format!("{angle} (pass {}): {task}", pass + 1)
    }
}
