//! LZ-010: Provisioning event sinks.
//!
//! The executor reports every step to an [`EventSink`]. Sinks are shared
//! across partition threads, so they take `&self`.

use super::error::StateError;
use super::types::{Partition, ProvisioningEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Receives provisioning events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ProvisioningEvent);
}

/// Current UTC time as ISO 8601 (`2026-02-16T14:00:00Z`).
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_iso8601(secs)
}

/// Format seconds since the Unix epoch as ISO 8601 UTC.
pub fn format_iso8601(epoch_secs: u64) -> String {
    let days = (epoch_secs / 86_400) as i64;
    let rem = epoch_secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("run-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log path for a partition.
pub fn event_log_path(state_dir: &Path, partition: &Partition) -> PathBuf {
    state_dir.join(partition.dir_name()).join("events.jsonl")
}

/// Append one event to a partition's JSONL log.
pub fn append_event(
    state_dir: &Path,
    partition: &Partition,
    event: &ProvisioningEvent,
) -> Result<(), StateError> {
    let path = event_log_path(state_dir, partition);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let line = serde_json::to_string(&TimestampedEvent {
        ts: now_iso8601(),
        event: event.clone(),
    })
    .map_err(|e| StateError::Serialize(e.to_string()))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
    writeln!(file, "{}", line).map_err(|source| StateError::Io { path, source })
}

/// Read back a partition's event log.
pub fn read_events(state_dir: &Path, partition: &Partition) -> Result<Vec<TimestampedEvent>, StateError> {
    let path = event_log_path(state_dir, partition);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| StateError::Io {
        path: path.clone(),
        source,
    })?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).map_err(|e| StateError::Parse {
                path: path.clone(),
                detail: e.to_string(),
            })
        })
        .collect()
}

/// Parse the `account/region` form carried by events.
fn event_partition(event: &ProvisioningEvent) -> Option<Partition> {
    event
        .partition()
        .split_once('/')
        .map(|(account, region)| Partition::new(account, region))
}

/// Appends events to `state/{account}-{region}/events.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    state_dir: PathBuf,
}

impl JsonlEventLog {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }
}

impl EventSink for JsonlEventLog {
    fn record(&self, event: &ProvisioningEvent) {
        let Some(partition) = event_partition(event) else {
            tracing::warn!(partition = event.partition(), "event without a partition");
            return;
        };
        if let Err(e) = append_event(&self.state_dir, &partition, event) {
            tracing::warn!(error = %e, "cannot append provisioning event");
        }
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ProvisioningEvent) {
        match event {
            ProvisioningEvent::EmissionStarted { partition, run_id, .. } => {
                tracing::info!(%partition, %run_id, "emission started");
            }
            ProvisioningEvent::NodeStarted { node, action, .. } => {
                tracing::debug!(%node, %action, "node started");
            }
            ProvisioningEvent::NodeSucceeded {
                node,
                resolved_id,
                duration_seconds,
                ..
            } => {
                tracing::info!(%node, %resolved_id, duration_seconds, "node emitted");
            }
            ProvisioningEvent::NodeFailed { node, error, .. } => {
                tracing::error!(%node, %error, "node failed");
            }
            ProvisioningEvent::NodeSkipped { node, reason, .. } => {
                tracing::warn!(%node, %reason, "node skipped");
            }
            ProvisioningEvent::EmissionCompleted {
                partition,
                succeeded,
                unchanged,
                failed,
                skipped,
                ..
            } => {
                tracing::info!(%partition, succeeded, unchanged, failed, skipped, "emission completed");
            }
        }
    }
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProvisioningEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProvisioningEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &ProvisioningEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Fans every event out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for MultiSink {
    fn record(&self, event: &ProvisioningEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(partition: &str) -> ProvisioningEvent {
        ProvisioningEvent::EmissionStarted {
            partition: partition.to_string(),
            run_id: "run-abc".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn test_lz010_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 20);
    }

    #[test]
    fn test_lz010_format_known_dates() {
        assert_eq!(format_iso8601(0), "1970-01-01T00:00:00Z");
        // Leap day
        assert_eq!(format_iso8601(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(format_iso8601(1_771_250_400), "2026-02-16T14:00:00Z");
        // Last second of a year
        assert_eq!(format_iso8601(1_735_689_599), "2024-12-31T23:59:59Z");
    }

    #[test]
    fn test_lz010_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert_eq!(id.len(), 16);
    }

    #[test]
    fn test_lz010_event_log_path() {
        let p = event_log_path(Path::new("/state"), &Partition::new("111111111111", "us-east-1"));
        assert_eq!(p, PathBuf::from("/state/111111111111-us-east-1/events.jsonl"));
    }

    #[test]
    fn test_lz010_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::new("111111111111", "us-east-1");
        append_event(dir.path(), &partition, &started("111111111111/us-east-1")).unwrap();
        append_event(
            dir.path(),
            &partition,
            &ProvisioningEvent::NodeFailed {
                partition: "111111111111/us-east-1".into(),
                node: "111111111111/us-east-1/transit-gateway/Core".into(),
                error: "quota exceeded".into(),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(event_log_path(dir.path(), &partition)).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"emission_started\""));

        let events = read_events(dir.path(), &partition).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1].event, ProvisioningEvent::NodeFailed { .. }));
    }

    #[test]
    fn test_lz010_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let events = read_events(dir.path(), &Partition::new("1", "r")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_lz010_jsonl_sink_routes_by_partition() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlEventLog::new(dir.path());
        sink.record(&started("111111111111/us-east-1"));
        sink.record(&started("222222222222/us-east-1"));
        sink.record(&started("111111111111/us-east-1"));
        let a = read_events(dir.path(), &Partition::new("111111111111", "us-east-1")).unwrap();
        let b = read_events(dir.path(), &Partition::new("222222222222", "us-east-1")).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_lz010_memory_and_multi_sink() {
        let memory = std::sync::Arc::new(MemorySink::new());

        struct Shared(std::sync::Arc<MemorySink>);
        impl EventSink for Shared {
            fn record(&self, event: &ProvisioningEvent) {
                self.0.record(event);
            }
        }

        let multi = MultiSink::new()
            .with(TracingSink)
            .with(Shared(memory.clone()))
            .with(Shared(memory.clone()));
        multi.record(&started("111111111111/us-east-1"));
        assert_eq!(memory.events().len(), 2);
    }
}
