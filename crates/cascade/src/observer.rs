//! Progress observers: where run events go.

use cascade_core::events::{EventPayload, ProgressEvent};
use cascade_core::{ReportRow, ReportWriter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Receives progress events while a run is in flight.
///
/// Called synchronously from the tier that produced the event; keep it cheap.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Logs every event through `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let run_id = event.run_id.as_ref();
        let kind = event.event_type().as_str();
        match &event.payload {
            EventPayload::RunStarted(p) => info!(
                run_id,
                worker_count = p.worker_count,
                concurrency_cap = p.concurrency_cap,
                provider = %p.provider,
                "{kind}"
            ),
            EventPayload::DecompositionComplete(p) => info!(
                run_id,
                decomposed = p.decomposed,
                subtasks = p.subtask_count,
                padded = p.padded,
                truncated = p.truncated,
                "{kind}"
            ),
            EventPayload::TopologyResolved(p) => info!(
                run_id,
                workers = p.workers,
                synthesizers = p.synthesizers,
                executive = p.executive,
                group_size = p.group_size,
                "{kind}"
            ),
            EventPayload::SubtaskStarted(p) => info!(
                run_id,
                tier = "worker",
                index = p.index,
                specialization = %p.specialization,
                "{kind}"
            ),
            EventPayload::SubtaskCompleted(p) => info!(
                run_id,
                tier = "worker",
                index = p.index,
                duration_ms = p.duration_ms,
                attempts = p.attempts,
                output_bytes = p.output_bytes,
                "{kind}"
            ),
            EventPayload::SubtaskFailed(p) => warn!(
                run_id,
                tier = "worker",
                index = p.index,
                duration_ms = p.duration_ms,
                attempts = p.attempts,
                reason = %p.reason,
                "{kind}"
            ),
            EventPayload::UnitRetrying(p) => warn!(
                run_id,
                tier = %p.tier,
                index = p.index,
                attempt = p.attempt,
                backoff_ms = p.backoff_ms,
                error = %p.error,
                "{kind}"
            ),
            EventPayload::GroupStarted(p) => {
                info!(run_id, tier = "synthesis", index = p.index, size = p.size, "{kind}");
            }
            EventPayload::GroupCompleted(p) => info!(
                run_id,
                tier = "synthesis",
                index = p.index,
                duration_ms = p.duration_ms,
                attempts = p.attempts,
                output_bytes = p.output_bytes,
                "{kind}"
            ),
            EventPayload::GroupFailed(p) => warn!(
                run_id,
                tier = "synthesis",
                index = p.index,
                duration_ms = p.duration_ms,
                reason = %p.reason,
                "{kind}"
            ),
            EventPayload::ExecutiveStarted(p) => {
                info!(run_id, tier = "executive", inputs = p.inputs, "{kind}");
            }
            EventPayload::ExecutiveCompleted(p) => info!(
                run_id,
                tier = "executive",
                duration_ms = p.duration_ms,
                attempts = p.attempts,
                output_bytes = p.output_bytes,
                "{kind}"
            ),
            EventPayload::ExecutiveFailed(p) => warn!(
                run_id,
                tier = "executive",
                duration_ms = p.duration_ms,
                reason = %p.reason,
                "{kind}"
            ),
            EventPayload::RunCompleted(p) => info!(
                run_id,
                final_tier = p.final_tier.as_str(),
                workers_failed = p.workers_failed,
                groups_failed = p.groups_failed,
                executive_failed = p.executive_failed,
                cancelled = p.cancelled,
                duration_ms = p.duration_ms,
                cost_usd = p.cost_usd,
                "{kind}"
            ),
            EventPayload::RunFailed(p) => warn!(run_id, reason = %p.reason, "{kind}"),
        }
    }
}

/// Appends one row per event to a `report.tsv` timeline.
#[derive(Debug)]
pub struct ReportObserver {
    writer: Mutex<ReportWriter>,
}

impl ReportObserver {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            writer: Mutex::new(ReportWriter::new(path)?),
        })
    }
}

impl ProgressObserver for ReportObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let row = ReportRow::from_event(event);
        let Ok(mut writer) = self.writer.lock() else {
            warn!("report writer lock poisoned; dropping event");
            return;
        };
        if let Err(err) = writer.write_row(&row).and_then(|()| writer.flush()) {
            warn!(error = %err, kind = %row.kind, "failed to write report row");
        }
    }
}

/// Forwards each event to several observers, in order.
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for FanoutObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutObserver")
            .field("observers", &self.len())
            .finish()
    }
}

impl ProgressObserver for FanoutObserver {
    fn on_event(&self, event: &ProgressEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::events::{GroupStartedPayload, RunFailedPayload};
    use cascade_core::Id;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl ProgressObserver for Counter {
        fn on_event(&self, _event: &ProgressEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(payload: EventPayload) -> ProgressEvent {
        ProgressEvent::new(Id::from_string("run-1"), payload)
    }

    #[test]
    fn fanout_forwards_to_every_observer() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let fanout = FanoutObserver::new().with(a.clone()).with(b.clone());
        assert_eq!(fanout.len(), 2);

        fanout.on_event(&event(EventPayload::GroupStarted(GroupStartedPayload {
            index: 0,
            size: 5,
        })));
        fanout.on_event(&event(EventPayload::RunFailed(RunFailedPayload {
            reason: "x".into(),
        })));

        assert_eq!(a.0.load(Ordering::SeqCst), 2);
        assert_eq!(b.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fanout_debug_shows_observer_count() {
        let fanout = FanoutObserver::new()
            .with(Arc::new(TracingObserver))
            .with(Arc::new(Counter::default()));
        assert_eq!(format!("{fanout:?}"), "FanoutObserver { observers: 2 }");
    }

    #[test]
    fn report_observer_writes_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.tsv");
        let observer = ReportObserver::create(&path).unwrap();

        observer.on_event(&event(EventPayload::GroupStarted(GroupStartedPayload {
            index: 1,
            size: 4,
        })));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp_ms\t"));
        assert!(lines[1].contains("\trun-1\tGROUP_STARTED\tsynthesis\t1\t"));
        assert!(lines[1].ends_with("size=4"));
    }

    #[test]
    fn tracing_observer_logs_without_subscriber() {
        TracingObserver.on_event(&event(EventPayload::RunFailed(RunFailedPayload {
            reason: "no subtasks".into(),
        })));
    }
}
