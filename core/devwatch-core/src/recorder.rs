//! Structured activity log writer.
//!
//! The JSONL event log is the daemon's durable record. It is written only
//! through [`ActivityRecorder`], never through `tracing`, and a failed write
//! is reported on the console without interrupting the caller.

use crate::error::{CoreError, Result};
use devwatch_events::{EventRecord, EventType};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

pub trait ActivityRecorder {
    fn record(&mut self, event_type: EventType, details: Value);
}

/// Serializes a typed detail payload and records it.
pub fn record_details<T: Serialize>(
    recorder: &mut dyn ActivityRecorder,
    event_type: EventType,
    details: &T,
) {
    match serde_json::to_value(details) {
        Ok(value) => recorder.record(event_type, value),
        Err(err) => {
            tracing::warn!(event = %event_type, error = %err, "Failed to serialize event details");
            recorder.record(event_type, Value::Object(Default::default()));
        }
    }
}

/// Appends one JSON object per line to `<log_dir>/<user>_activity.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlRecorder {
    path: PathBuf,
    user: String,
}

impl JsonlRecorder {
    pub fn new(path: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            user: user.into(),
        }
    }

    fn append(&self, record: &EventRecord) -> Result<()> {
        let line = record.to_line().map_err(|source| CoreError::Json {
            context: format!("serializing {} event", record.event_type),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| CoreError::io("creating activity log directory", err))?;
        }

        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| CoreError::io("opening activity log", err))?;
        writeln!(file, "{}", line).map_err(|err| CoreError::io("writing activity log", err))?;
        Ok(())
    }
}

impl ActivityRecorder for JsonlRecorder {
    fn record(&mut self, event_type: EventType, details: Value) {
        let record = EventRecord::new(&self.user, event_type, details);
        if let Err(err) = self.append(&record) {
            tracing::warn!(
                path = %self.path.display(),
                event = %event_type,
                error = %err,
                "Failed to write activity event"
            );
        }
    }
}

/// Keeps records in memory. Clones share the same buffer, so a test can hand
/// one clone to a session and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    user: String,
    records: Rc<RefCell<Vec<EventRecord>>>,
}

impl MemoryRecorder {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            records: Rc::default(),
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.borrow().clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.records
            .borrow()
            .iter()
            .map(|record| record.event_type)
            .collect()
    }

    pub fn find(&self, event_type: EventType) -> Option<EventRecord> {
        self.records
            .borrow()
            .iter()
            .find(|record| record.event_type == event_type)
            .cloned()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|record| record.event_type == event_type)
            .count()
    }
}

impl ActivityRecorder for MemoryRecorder {
    fn record(&mut self, event_type: EventType, details: Value) {
        self.records
            .borrow_mut()
            .push(EventRecord::new(&self.user, event_type, details));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devwatch_events::{parse_event_line, DaemonStopDetails};
    use serde_json::json;

    #[test]
    fn appends_one_line_per_event() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("logs").join("dev_activity.jsonl");
        let mut recorder = JsonlRecorder::new(&path, "dev");

        recorder.record(EventType::DaemonStart, json!({"check_interval": 5}));
        recorder.record(EventType::DaemonStop, json!({"reason": "user_interrupt"}));

        let content = fs_err::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first = parse_event_line(lines[0]).expect("parse first");
        assert_eq!(first.event_type, EventType::DaemonStart);
        assert_eq!(first.user, "dev");

        let second = parse_event_line(lines[1]).expect("parse second");
        let details: DaemonStopDetails = second.details_as().expect("details");
        assert_eq!(details.reason.as_deref(), Some("user_interrupt"));
    }

    #[test]
    fn write_failure_does_not_panic() {
        let temp = tempfile::tempdir().expect("temp dir");
        let blocker = temp.path().join("not-a-dir");
        fs_err::write(&blocker, "x").expect("write blocker");

        let mut recorder = JsonlRecorder::new(blocker.join("activity.jsonl"), "dev");
        recorder.record(EventType::DaemonStart, Value::Null);
        assert!(!blocker.join("activity.jsonl").exists());
    }

    #[test]
    fn record_details_serializes_typed_payloads() {
        let recorder = MemoryRecorder::new("dev");
        let mut sink = recorder.clone();
        let details = DaemonStopDetails {
            reason: Some("user_interrupt".to_string()),
        };
        record_details(&mut sink, EventType::DaemonStop, &details);

        let record = recorder.find(EventType::DaemonStop).expect("recorded");
        assert_eq!(record.details, json!({"reason": "user_interrupt"}));
        assert_eq!(recorder.count(EventType::DaemonStop), 1);
    }
}
