//! Configuration parsing for orchestration runs.
//!
//! Plain `key=value` lines, `#` comments, optional quotes.
//! Precedence: CLI flags > `--config` file > `.cascade/config` > defaults.

use crate::topology::Topology;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("invalid number value for {key}: {value}")]
    InvalidFloat { key: String, value: String },
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Upper bound on the per-unit retry budget.
pub const MAX_RETRIES: u32 = 20;

/// LLM backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic offline provider.
    #[default]
    Echo,
    /// OpenAI-compatible chat completions API.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "echo" => Some(Self::Echo),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

/// How the root task is split into subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecomposerKind {
    /// Keyword-driven templates, no provider call.
    #[default]
    Template,
    /// Ask the provider for a numbered list, fall back to templates.
    Provider,
}

impl DecomposerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Provider => "provider",
        }
    }
}

/// Configuration for one orchestration run.
///
/// Immutable once a run starts; each run owns its own copy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    // Sizing
    pub worker_count: usize,
    pub concurrency_cap: usize,

    // Tier overrides (None = use the scaling table)
    pub enable_drummer: Option<bool>,
    pub enable_camina: Option<bool>,

    // Timeouts
    pub worker_timeout_sec: u64,
    pub synthesis_timeout_sec: u64,
    pub executive_timeout_sec: u64,
    /// Whole-run timeout; 0 disables it.
    pub overall_timeout_sec: u64,

    // Retries
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,

    // Provider
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub cost_per_1k_tokens: f64,

    // Progressive determinism: each tier at least as conservative as the one below.
    pub worker_temperature: f32,
    pub synthesis_temperature: f32,
    pub executive_temperature: f32,

    pub decomposer: DecomposerKind,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            concurrency_cap: 10,
            enable_drummer: None,
            enable_camina: None,
            worker_timeout_sec: 180,
            synthesis_timeout_sec: 240,
            executive_timeout_sec: 300,
            overall_timeout_sec: 900,
            retries: 2,
            retry_backoff_ms: 1000,
            retry_backoff_max_ms: 30_000,
            provider: ProviderKind::Echo,
            model: None,
            base_url: None,
            max_tokens: 2048,
            cost_per_1k_tokens: 0.0,
            worker_temperature: 0.7,
            synthesis_temperature: 0.5,
            executive_temperature: 0.3,
            decomposer: DecomposerKind::Template,
        }
    }
}

impl OrchestratorConfig {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    pub fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "worker_count" => self.worker_count = Self::parse_int(key, value)?,
            "concurrency_cap" => self.concurrency_cap = Self::parse_int(key, value)?,
            "enable_drummer" => self.enable_drummer = Self::parse_override(key, value)?,
            "enable_camina" => self.enable_camina = Self::parse_override(key, value)?,
            "worker_timeout_sec" => self.worker_timeout_sec = Self::parse_int(key, value)?,
            "synthesis_timeout_sec" => self.synthesis_timeout_sec = Self::parse_int(key, value)?,
            "executive_timeout_sec" => self.executive_timeout_sec = Self::parse_int(key, value)?,
            "overall_timeout_sec" => self.overall_timeout_sec = Self::parse_int(key, value)?,
            "retries" => self.retries = Self::parse_int(key, value)?,
            "retry_backoff_ms" => self.retry_backoff_ms = Self::parse_int(key, value)?,
            "retry_backoff_max_ms" => self.retry_backoff_max_ms = Self::parse_int(key, value)?,
            "provider" => {
                self.provider = ProviderKind::parse(value).ok_or_else(|| {
                    ConfigError::InvalidLine(format!(
                        "provider must be 'echo', 'openai', or 'anthropic', got '{value}'"
                    ))
                })?;
            }
            "model" => self.model = Self::optional_string(value),
            "base_url" => self.base_url = Self::optional_string(value),
            "max_tokens" => self.max_tokens = Self::parse_int(key, value)?,
            "cost_per_1k_tokens" => self.cost_per_1k_tokens = Self::parse_float(key, value)?,
            "worker_temperature" => self.worker_temperature = Self::parse_float(key, value)?,
            "synthesis_temperature" => self.synthesis_temperature = Self::parse_float(key, value)?,
            "executive_temperature" => self.executive_temperature = Self::parse_float(key, value)?,
            "decomposer" => {
                self.decomposer = match value {
                    "template" => DecomposerKind::Template,
                    "provider" => DecomposerKind::Provider,
                    _ => {
                        return Err(ConfigError::InvalidLine(format!(
                            "decomposer must be 'template' or 'provider', got '{value}'"
                        )))
                    }
                }
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn optional_string(value: &str) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_float<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidFloat {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Parse a boolean value.
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Tier overrides accept `auto` (or an empty value) to fall back to the table.
    fn parse_override(key: &str, value: &str) -> Result<Option<bool>, ConfigError> {
        if value.is_empty() || value.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        Self::parse_bool(key, value).map(Some)
    }

    /// Check invariants that a run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be at least 1".into()));
        }
        if self.concurrency_cap == 0 {
            return Err(ConfigError::Invalid("concurrency_cap must be at least 1".into()));
        }
        let timeouts = [
            ("worker_timeout_sec", self.worker_timeout_sec),
            ("synthesis_timeout_sec", self.synthesis_timeout_sec),
            ("executive_timeout_sec", self.executive_timeout_sec),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be at least 1")));
            }
        }
        if self.retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "retries must be at most {MAX_RETRIES}, got {}",
                self.retries
            )));
        }
        let temps = [
            ("worker_temperature", self.worker_temperature),
            ("synthesis_temperature", self.synthesis_temperature),
            ("executive_temperature", self.executive_temperature),
        ];
        for (key, temp) in temps {
            if !(0.0..=2.0).contains(&temp) {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be within 0.0..=2.0, got {temp}"
                )));
            }
        }
        if self.synthesis_temperature > self.worker_temperature
            || self.executive_temperature > self.synthesis_temperature
        {
            return Err(ConfigError::Invalid(format!(
                "temperatures must not increase by tier (worker {} >= synthesis {} >= executive {})",
                self.worker_temperature, self.synthesis_temperature, self.executive_temperature
            )));
        }
        if self.cost_per_1k_tokens < 0.0 {
            return Err(ConfigError::Invalid("cost_per_1k_tokens must not be negative".into()));
        }
        Ok(())
    }

    /// Topology for a given number of subtasks with this config's overrides.
    pub fn topology_for(&self, workers: usize) -> Topology {
        Topology::resolve(workers, self.enable_drummer, self.enable_camina)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_sec)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_sec)
    }

    pub fn executive_timeout(&self) -> Duration {
        Duration::from_secs(self.executive_timeout_sec)
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        if self.overall_timeout_sec == 0 {
            None
        } else {
            Some(Duration::from_secs(self.overall_timeout_sec))
        }
    }

    /// Render the effective config as `key=value` lines.
    pub fn to_config_string(&self) -> String {
        fn opt_bool(v: Option<bool>) -> String {
            v.map_or_else(|| "auto".to_string(), |b| b.to_string())
        }
        let lines = [
            format!("worker_count={}", self.worker_count),
            format!("concurrency_cap={}", self.concurrency_cap),
            format!("enable_drummer={}", opt_bool(self.enable_drummer)),
            format!("enable_camina={}", opt_bool(self.enable_camina)),
            format!("worker_timeout_sec={}", self.worker_timeout_sec),
            format!("synthesis_timeout_sec={}", self.synthesis_timeout_sec),
            format!("executive_timeout_sec={}", self.executive_timeout_sec),
            format!("overall_timeout_sec={}", self.overall_timeout_sec),
            format!("retries={}", self.retries),
            format!("retry_backoff_ms={}", self.retry_backoff_ms),
            format!("retry_backoff_max_ms={}", self.retry_backoff_max_ms),
            format!("provider={}", self.provider.as_str()),
            format!("model={}", self.model.as_deref().unwrap_or("")),
            format!("base_url={}", self.base_url.as_deref().unwrap_or("")),
            format!("max_tokens={}", self.max_tokens),
            format!("cost_per_1k_tokens={}", self.cost_per_1k_tokens),
            format!("worker_temperature={}", self.worker_temperature),
            format!("synthesis_temperature={}", self.synthesis_temperature),
            format!("executive_temperature={}", self.executive_temperature),
            format!("decomposer={}", self.decomposer.as_str()),
        ];
        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.retries, 2);
        assert_eq!(config.provider, ProviderKind::Echo);
        assert!(config.enable_drummer.is_none());
    }

    #[test]
    fn parse_simple_config() {
        let mut config = OrchestratorConfig::default();
        config
            .parse_content(
                r#"
# comment
worker_count=12
concurrency_cap = 4
enable_drummer=true
enable_camina=auto
provider="openai"
model='gpt-4o-mini'
worker_temperature=0.9
decomposer=provider
"#,
            )
            .unwrap();

        assert_eq!(config.worker_count, 12);
        assert_eq!(config.concurrency_cap, 4);
        assert_eq!(config.enable_drummer, Some(true));
        assert_eq!(config.enable_camina, None);
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        assert!((config.worker_temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.decomposer, DecomposerKind::Provider);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = OrchestratorConfig::default();
        assert!(matches!(
            config.parse_content("worker_count=many"),
            Err(ConfigError::InvalidInt { .. })
        ));
        assert!(matches!(
            config.parse_content("enable_camina=maybe"),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            config.parse_content("worker_temperature=hot"),
            Err(ConfigError::InvalidFloat { .. })
        ));
        assert!(matches!(
            config.parse_content("nonsense=1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.parse_content("no equals sign"),
            Err(ConfigError::InvalidLine(_))
        ));
        assert!(matches!(
            config.parse_content("provider=cohere"),
            Err(ConfigError::InvalidLine(_))
        ));
    }

    #[test]
    fn validate_rejects_increasing_temperature() {
        let config = OrchestratorConfig {
            synthesis_temperature: 0.8,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = OrchestratorConfig {
            executive_temperature: 0.6,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // Equal temperatures are allowed.
        let config = OrchestratorConfig {
            worker_temperature: 0.2,
            synthesis_temperature: 0.2,
            executive_temperature: 0.2,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_tier_timeouts() {
        for key in [
            "worker_timeout_sec",
            "synthesis_timeout_sec",
            "executive_timeout_sec",
        ] {
            let mut config = OrchestratorConfig::default();
            config.apply_value(key, "0").unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn validate_bounds_retry_budget() {
        let mut config = OrchestratorConfig::default();
        config.apply_value("retries", "4294967295").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retries must be at most"));

        config.apply_value("retries", &MAX_RETRIES.to_string()).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_sizing() {
        for config in [
            OrchestratorConfig {
                worker_count: 0,
                ..Default::default()
            },
            OrchestratorConfig {
                concurrency_cap: 0,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn config_string_parses_back() {
        let original = OrchestratorConfig {
            worker_count: 20,
            enable_camina: Some(false),
            provider: ProviderKind::Anthropic,
            model: Some("claude-sonnet".to_string()),
            overall_timeout_sec: 0,
            ..Default::default()
        };
        let mut parsed = OrchestratorConfig::default();
        parsed.parse_content(&original.to_config_string()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.overall_timeout().is_none());
    }

    #[test]
    fn from_file_merges_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "worker_count=3").unwrap();
        writeln!(file, "retries=0").unwrap();

        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.retries, 0);
        assert_eq!(config.concurrency_cap, 10);
    }

    #[test]
    fn topology_for_applies_overrides() {
        let config = OrchestratorConfig {
            enable_drummer: Some(true),
            enable_camina: Some(false),
            ..Default::default()
        };
        let topology = config.topology_for(5);
        assert_eq!(topology.synthesizers, 1);
        assert!(!topology.executive);
    }
}
