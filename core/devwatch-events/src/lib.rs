//! Structured event log schema for devwatch.
//!
//! The daemon appends one JSON object per line; anything that reads the log
//! (reporting jobs, ad-hoc `jq` scripts, tests) shares these types so the
//! schema cannot drift. Readers must keep working when the daemon grows new
//! event types or drops optional detail fields, so every detail field is
//! optional and unknown event names map to [`EventType::Unknown`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ACTIVITY_LOG_SUFFIX: &str = "_activity.jsonl";
pub const MAX_SAMPLE_FILES: usize = 10;

/// Path of the append-only activity log for `user` inside `log_dir`.
pub fn activity_log_path(log_dir: &Path, user: &str) -> PathBuf {
    log_dir.join(format!("{}{}", user, ACTIVITY_LOG_SUFFIX))
}

/// Current UTC time in the log's timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    DaemonStart,
    ActivityDetected,
    PreShutdownBackupStart,
    PreShutdownGitBackup,
    PreShutdownBackupComplete,
    AutoShutdown,
    DaemonStop,
    /// Written by a newer daemon; readers skip or pass it through.
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DaemonStart => "daemon_start",
            EventType::ActivityDetected => "activity_detected",
            EventType::PreShutdownBackupStart => "pre_shutdown_backup_start",
            EventType::PreShutdownGitBackup => "pre_shutdown_git_backup",
            EventType::PreShutdownBackupComplete => "pre_shutdown_backup_complete",
            EventType::AutoShutdown => "auto_shutdown",
            EventType::DaemonStop => "daemon_stop",
            EventType::Unknown => "unknown",
        }
    }

    pub fn from_name(value: &str) -> Self {
        match value {
            "daemon_start" => EventType::DaemonStart,
            "activity_detected" => EventType::ActivityDetected,
            "pre_shutdown_backup_start" => EventType::PreShutdownBackupStart,
            "pre_shutdown_git_backup" => EventType::PreShutdownGitBackup,
            "pre_shutdown_backup_complete" => EventType::PreShutdownBackupComplete,
            "auto_shutdown" => EventType::AutoShutdown,
            "daemon_stop" => EventType::DaemonStop,
            _ => EventType::Unknown,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(EventType::from_name(&value))
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub user: String,
    pub event_type: EventType,
    #[serde(default)]
    pub details: Value,
}

impl EventRecord {
    pub fn new(user: &str, event_type: EventType, details: Value) -> Self {
        Self {
            timestamp: now_timestamp(),
            user: user.to_string(),
            event_type,
            details,
        }
    }

    pub fn details_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.details.is_null() {
            return serde_json::from_value(Value::Object(Default::default()));
        }
        serde_json::from_value(self.details.clone())
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn validate(&self) -> Result<(), EventParseError> {
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(EventParseError::new(
                "invalid_timestamp",
                "timestamp must be RFC3339",
            ));
        }
        if self.user.trim().is_empty() {
            return Err(EventParseError::new("invalid_user", "user is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParseError {
    pub code: String,
    pub message: String,
}

impl EventParseError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EventParseError {}

/// Parses and validates a single log line.
pub fn parse_event_line(line: &str) -> Result<EventRecord, EventParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(EventParseError::new("empty_line", "line was empty"));
    }
    let record: EventRecord = serde_json::from_str(trimmed).map_err(|err| {
        EventParseError::new("invalid_json", format!("line was not valid JSON: {}", err))
    })?;
    record.validate()?;
    Ok(record)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Detail payloads
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything observed during one poll. Serialized as the details of
/// `activity_detected`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickEvidence {
    pub net_sent_bytes: u64,
    pub net_recv_bytes: u64,
    pub cpu_usage: f32,
    pub x11_idle_ms: u64,
    pub user_active_physically: bool,
    pub keystroke_count: u64,
    pub keyboard_active: bool,
    pub process_count: usize,
    pub active_processes: Vec<String>,
    pub ssh_sessions: u32,
    pub recent_commits: u32,
    pub modified_files: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonStartDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_shutdown_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_idle_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStartDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitBackupDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repos_committed: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos_failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupCompleteDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_backup_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoShutdownDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_backup_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonStopDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
