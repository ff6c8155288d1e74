//! Probe output: typed console lines, the sink they go to, and the run outcome.

use crate::form::InvalidField;
use crate::observe::Observation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// How a line should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Progress line
    Info,
    /// A check passed
    Pass,
    /// A check failed
    Fail,
    /// Asynchronous page observation
    Observed,
}

/// Every line the probe prints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeEvent {
    /// Opening the application root
    NavigatingToApp,
    /// Opening the order form
    NavigatingToForm,
    /// Form header is visible
    PageLoaded,
    /// Form header is not visible
    PageLoadFailed,
    /// Starting form population
    FillingForm,
    /// Clicking the self-pickup checkbox
    TogglingSelfPickup,
    /// Carrier picked from the combobox
    CarrierSelected,
    /// Specification card picked
    SpecificationSelected,
    /// Product added to the order
    ProductAdded,
    /// About to submit
    SubmittingForm,
    /// Native validity of the form
    FormValidity(bool),
    /// Fields failing validation
    InvalidFields(Vec<InvalidField>),
    /// `requestSubmit()` was called
    SubmitTriggered,
    /// A mocked route with a notice served a request
    RouteNotice(String),
    /// URL reached the order list
    Redirected,
    /// URL did not reach the order list in time
    RedirectFailed,
    /// URL at the time of a redirect failure
    CurrentUrl(String),
    /// Console message, dialog or failed request
    Observed(Observation),
}

impl ProbeEvent {
    /// Presentation class of this line
    #[must_use]
    pub const fn status(&self) -> EventStatus {
        match self {
            Self::PageLoaded
            | Self::CarrierSelected
            | Self::SpecificationSelected
            | Self::ProductAdded
            | Self::Redirected => EventStatus::Pass,
            Self::PageLoadFailed | Self::RedirectFailed | Self::CurrentUrl(_) => EventStatus::Fail,
            Self::Observed(_) => EventStatus::Observed,
            _ => EventStatus::Info,
        }
    }

    /// Failure lines survive `--quiet`
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status(), EventStatus::Fail)
    }
}

impl std::fmt::Display for ProbeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NavigatingToApp => f.write_str("Navigating to app..."),
            Self::NavigatingToForm => f.write_str("Navigating to Create Armature Order..."),
            Self::PageLoaded => f.write_str("✅ Page Loaded"),
            Self::PageLoadFailed => f.write_str("❌ Page Load Failed"),
            Self::FillingForm => f.write_str("Filling form..."),
            Self::TogglingSelfPickup => f.write_str("Toggling Self-Pickup..."),
            Self::CarrierSelected => f.write_str("✅ Carrier selected"),
            Self::SpecificationSelected => f.write_str("✅ Specification selected"),
            Self::ProductAdded => f.write_str("✅ Product Added"),
            Self::SubmittingForm => f.write_str("Submitting form..."),
            Self::FormValidity(valid) => write!(f, "Form Validity: {valid}"),
            Self::InvalidFields(fields) => {
                let json = serde_json::to_string(fields).map_err(|_| std::fmt::Error)?;
                write!(f, "INVALID FIELDS: {json}")
            }
            Self::SubmitTriggered => f.write_str("JS Submit triggered"),
            Self::RouteNotice(notice) => f.write_str(notice),
            Self::Redirected => f.write_str("✅ Successfully redirected to /orders"),
            Self::RedirectFailed => f.write_str("❌ Redirect failed"),
            Self::CurrentUrl(url) => write!(f, "Current URL: {url}"),
            Self::Observed(observation) => write!(f, "{observation}"),
        }
    }
}

/// Where probe lines go.
///
/// Called from the scenario and from background listener tasks, so
/// implementations must be shareable across threads.
pub trait ProbeSink: Send + Sync {
    /// Print one line
    fn emit(&self, event: ProbeEvent);

    /// The scenario moved to a new step; used for progress display
    fn step(&self, _description: &str) {}

    /// The run is over
    fn finish(&self) {}
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn ProbeSink>;

/// Sink printing every line to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ProbeSink for StdoutSink {
    fn emit(&self, event: ProbeEvent) {
        println!("{event}");
    }
}

/// Sink keeping every line in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ProbeEvent>>>,
    steps: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in emission order
    #[must_use]
    pub fn events(&self) -> Vec<ProbeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Rendered lines in emission order
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(ToString::to_string).collect()
    }

    /// Step descriptions in order
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Whether an identical event was emitted
    #[must_use]
    pub fn contains(&self, event: &ProbeEvent) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

impl ProbeSink for RecordingSink {
    fn emit(&self, event: ProbeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn step(&self, description: &str) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(description.to_string());
        }
    }
}

/// How a run ended, when it ended in a reported outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Redirected to the order list
    Submitted,
    /// Form header never became visible
    LoadFailed {
        /// Screenshot path, if it was written
        screenshot: Option<PathBuf>,
    },
    /// No redirect within the timeout
    SubmitFailed {
        /// URL when the wait gave up
        current_url: String,
        /// Screenshot path, if it was written
        screenshot: Option<PathBuf>,
    },
}

impl RunOutcome {
    /// Whether the order was submitted
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Submitted)
    }

    /// Screenshot written for a failure
    #[must_use]
    pub fn screenshot(&self) -> Option<&std::path::Path> {
        match self {
            Self::Submitted => None,
            Self::LoadFailed { screenshot } | Self::SubmitFailed { screenshot, .. } => {
                screenshot.as_deref()
            }
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => f.write_str("order submitted"),
            Self::LoadFailed { .. } => f.write_str("form page did not load"),
            Self::SubmitFailed { current_url, .. } => {
                write!(f, "no redirect after submit (at {current_url})")
            }
        }
    }
}
