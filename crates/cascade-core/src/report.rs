//! Report TSV generation for run timelines.
//!
//! One row per progress event, appended as the run proceeds.
//!
//! Columns: `timestamp_ms`, `run_id`, kind, tier, index, `duration_ms`, attempts,
//!          `output_bytes`, message

use crate::events::{EventPayload, ProgressEvent};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A single row in the report.tsv file.
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub run_id: String,
    /// Event kind (e.g., `SUBTASK_STARTED`, `RUN_COMPLETED`).
    pub kind: String,
    /// Tier name (optional).
    pub tier: Option<String>,
    /// Subtask or group index (optional).
    pub index: Option<usize>,
    /// Duration in milliseconds (optional).
    pub duration_ms: Option<u64>,
    /// Provider attempts (optional).
    pub attempts: Option<u32>,
    /// Output size in bytes (optional).
    pub output_bytes: Option<usize>,
    /// Message field for additional info.
    pub message: String,
}

impl ReportRow {
    /// Create a new report row with required fields.
    pub fn new(timestamp_ms: i64, run_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            run_id: run_id.into(),
            kind: kind.into(),
            tier: None,
            index: None,
            duration_ms: None,
            attempts: None,
            output_bytes: None,
            message: String::new(),
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_output_bytes(mut self, bytes: usize) -> Self {
        self.output_bytes = Some(bytes);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Build a row from a progress event.
    pub fn from_event(event: &ProgressEvent) -> Self {
        let mut row = Self::new(
            event.timestamp.timestamp_millis(),
            event.run_id.as_ref(),
            event.event_type().as_str(),
        );
        if let Some(tier) = event.payload.tier() {
            row = row.with_tier(tier.as_str());
        }

        match &event.payload {
            EventPayload::RunStarted(p) => row.with_message(format!(
                "workers={} cap={} provider={} task={}",
                p.worker_count, p.concurrency_cap, p.provider, p.task
            )),
            EventPayload::DecompositionComplete(p) => row.with_message(format!(
                "decomposed={} subtasks={} padded={} truncated={}",
                p.decomposed, p.subtask_count, p.padded, p.truncated
            )),
            EventPayload::TopologyResolved(p) => row.with_message(format!(
                "workers={} synthesizers={} executive={} group_size={}",
                p.workers, p.synthesizers, p.executive, p.group_size
            )),
            EventPayload::SubtaskStarted(p) => row
                .with_index(p.index)
                .with_message(format!("specialization={}", p.specialization)),
            EventPayload::SubtaskCompleted(p) => row
                .with_index(p.index)
                .with_duration_ms(p.duration_ms)
                .with_attempts(p.attempts)
                .with_output_bytes(p.output_bytes),
            EventPayload::SubtaskFailed(p) => row
                .with_index(p.index)
                .with_duration_ms(p.duration_ms)
                .with_attempts(p.attempts)
                .with_message(p.reason.to_string()),
            EventPayload::UnitRetrying(p) => row
                .with_index(p.index)
                .with_attempts(p.attempt)
                .with_message(format!("backoff_ms={} error={}", p.backoff_ms, p.error)),
            EventPayload::GroupStarted(p) => row
                .with_index(p.index)
                .with_message(format!("size={}", p.size)),
            EventPayload::GroupCompleted(p) => row
                .with_index(p.index)
                .with_duration_ms(p.duration_ms)
                .with_attempts(p.attempts)
                .with_output_bytes(p.output_bytes),
            EventPayload::GroupFailed(p) => row
                .with_index(p.index)
                .with_duration_ms(p.duration_ms)
                .with_message(p.reason.to_string()),
            EventPayload::ExecutiveStarted(p) => row.with_message(format!("inputs={}", p.inputs)),
            EventPayload::ExecutiveCompleted(p) => row
                .with_duration_ms(p.duration_ms)
                .with_attempts(p.attempts)
                .with_output_bytes(p.output_bytes),
            EventPayload::ExecutiveFailed(p) => row
                .with_duration_ms(p.duration_ms)
                .with_message(p.reason.to_string()),
            EventPayload::RunCompleted(p) => row.with_duration_ms(p.duration_ms).with_message(
                format!(
                    "final={} workers_failed={} groups_failed={} executive_failed={} cancelled={} cost_usd={:.4}",
                    p.final_tier.as_str(),
                    p.workers_failed,
                    p.groups_failed,
                    p.executive_failed,
                    p.cancelled,
                    p.cost_usd
                ),
            ),
            EventPayload::RunFailed(p) => row.with_message(p.reason.clone()),
        }
    }

    /// Format as a TSV line.
    fn to_tsv_line(&self) -> String {
        let tier = self.tier.as_deref().unwrap_or("");
        let index = self.index.map(|i| i.to_string()).unwrap_or_default();
        let duration = self.duration_ms.map(|d| d.to_string()).unwrap_or_default();
        let attempts = self.attempts.map(|a| a.to_string()).unwrap_or_default();
        let output_bytes = self.output_bytes.map(|b| b.to_string()).unwrap_or_default();

        // Sanitize message to prevent TSV breakage
        let safe_message = sanitize_field(&self.message);

        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.timestamp_ms,
            self.run_id,
            self.kind,
            tier,
            index,
            duration,
            attempts,
            output_bytes,
            safe_message,
        )
    }
}

/// Sanitize a field value to prevent TSV breakage.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// TSV header row.
const HEADER: &str =
    "timestamp_ms\trun_id\tkind\ttier\tindex\tduration_ms\tattempts\toutput_bytes\tmessage";

/// Writer for report.tsv files.
pub struct ReportWriter {
    writer: BufWriter<File>,
}

impl std::fmt::Debug for ReportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportWriter")
            .field("writer", &"BufWriter<File>")
            .finish()
    }
}

impl ReportWriter {
    /// Create a new report writer, writing header if the file is new.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        if !exists {
            writeln!(writer, "{HEADER}")?;
        }

        Ok(Self { writer })
    }

    /// Write a single report row.
    pub fn write_row(&mut self, row: &ReportRow) -> std::io::Result<()> {
        writeln!(self.writer, "{}", row.to_tsv_line())
    }

    /// Flush pending writes.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
