//! Result and error types for Armprobe.

use thiserror::Error;

/// Result type for Armprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving the probe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Page or browser-context error
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// JavaScript evaluation error
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// No element matched a selector before the deadline
    #[error("No element matches '{selector}' after {ms}ms")]
    ElementNotFound {
        /// Selector as written in the scenario
        selector: String,
        /// How long we waited
        ms: u64,
    },

    /// Operation timed out
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// What was being waited for
        waited_for: String,
    },

    /// Request interception error
    #[error("Request interception failed: {message}")]
    Interception {
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Selector could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// Selector as written
        selector: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// A scenario step failed
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// Step description
        step: String,
        /// Underlying error
        #[source]
        source: Box<ProbeError>,
    },

    /// Operation on a driver that was already closed
    #[error("Browser is already closed")]
    AlreadyClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Wrap an error with the scenario step it interrupted
    #[must_use]
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// True if this is (or wraps) a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ElementNotFound { .. } => true,
            Self::Step { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wraps_source() {
        let err = ProbeError::ElementNotFound {
            selector: "select >> nth=5".to_string(),
            ms: 30_000,
        }
        .in_step("select unloading point");

        let text = err.to_string();
        assert!(text.contains("select unloading point"));
        assert!(text.contains("select >> nth=5"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_timeout() {
        let timeout = ProbeError::Timeout {
            ms: 5000,
            waited_for: "URL".to_string(),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.in_step("wait").is_timeout());
        assert!(!ProbeError::AlreadyClosed.is_timeout());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProbeError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
