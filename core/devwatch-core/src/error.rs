//! Error types for devwatch-core operations.
//!
//! Most of the core never lets these escape: probes turn them into neutral
//! values and the shutdown phases turn them into failed outcomes. They
//! surface only from config loading and from a tick that could not run at all.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration value for {key}: {details}")]
    ConfigInvalid { key: String, details: String },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn {command}: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {timeout:?}: {command}")]
    CommandTimedOut { command: String, timeout: Duration },

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Probe Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Probe {probe} unavailable: {details}")]
    Probe { probe: &'static str, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    pub fn probe(probe: &'static str, details: impl Into<String>) -> Self {
        CoreError::Probe {
            probe,
            details: details.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::CommandTimedOut { .. })
    }
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
