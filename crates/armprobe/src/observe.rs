//! Passive page observations: console messages, dialogs, failed requests.
//!
//! Observations are printed as they arrive and kept in an [`ObservationLog`];
//! they never influence the scenario.

use crate::dialog::DialogType;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Console message level as reported by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// console.log
    Log,
    /// console.debug
    Debug,
    /// console.info
    Info,
    /// console.warn
    Warning,
    /// console.error
    Error,
    /// console.trace
    Trace,
    /// anything else (table, dir, assert, ...)
    Other,
}

impl ConsoleLevel {
    /// Parse a CDP console API type
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "log" => Self::Log,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" | "assert" => Self::Error,
            "trace" => Self::Trace,
            _ => Self::Other,
        }
    }

    /// Name printed in the console line
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Trace => "trace",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the page did that the probe only reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// A console API call
    Console {
        /// Message level
        level: ConsoleLevel,
        /// Arguments joined by spaces
        text: String,
    },
    /// A native dialog opened
    Dialog {
        /// Dialog kind
        kind: DialogType,
        /// Dialog message
        message: String,
    },
    /// A network request failed
    RequestFailed {
        /// Request URL
        url: String,
        /// Failure reason as reported by the browser
        failure: String,
    },
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Console { level, text } => write!(f, "BROWSER CONSOLE: {level}: {text}"),
            Self::Dialog { message, .. } => write!(f, "DIALOG: {message}"),
            Self::RequestFailed { url, failure } => write!(f, "REQUEST FAILED: {url} {failure}"),
        }
    }
}

/// Thread-safe record of observations, shared with listener tasks
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    entries: Arc<Mutex<Vec<Observation>>>,
}

impl ObservationLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation
    pub fn push(&self, observation: Observation) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(observation);
        }
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn snapshot(&self) -> Vec<Observation> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of console messages at `level`
    #[must_use]
    pub fn console_count(&self, level: ConsoleLevel) -> usize {
        self.snapshot()
            .iter()
            .filter(|o| matches!(o, Observation::Console { level: l, .. } if *l == level))
            .count()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Nothing recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
