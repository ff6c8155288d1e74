//! Armprobe: end-to-end probe for the armature order form
//!
//! Drives the "create armature order" page of the web client through a
//! headless Chromium, serving the backend from canned responses, and reports
//! whether an order can be filled in and submitted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   ┌─────────────────┐   ProbeDriver   ┌──────────────────────┐  │
//! │   │ FormSubmission  │────────────────►│ ChromiumDriver (CDP) │  │
//! │   │ Probe           │                 │ MockDriver (tests)   │  │
//! │   └────────┬────────┘                 └──────────┬───────────┘  │
//! │            │ ProbeEvent                          │ Fetch        │
//! │            ▼                                     ▼              │
//! │   ┌─────────────────┐                 ┌──────────────────────┐  │
//! │   │ ProbeSink       │◄────────────────│ RouteTable           │  │
//! │   └─────────────────┘  notices, obs.  └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use armprobe::{FormSubmissionProbe, ProbeConfig, StdoutSink};
//! use std::sync::Arc;
//!
//! # async fn run() -> armprobe::ProbeResult<()> {
//! let probe = FormSubmissionProbe::new(ProbeConfig::default(), Arc::new(StdoutSink));
//! # #[cfg(feature = "browser")]
//! let outcome = probe.run_chromium().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "browser")]
mod browser;
mod config;
mod dialog;
mod driver;
mod form;
mod locator;
mod network;
mod observe;
mod report;
mod result;
mod scenario;
mod wait;

#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;
pub use config::{
    BrowserOptions, ProbeConfig, DEFAULT_BASE_URL, DEFAULT_FORM_PATH, DEFAULT_HEADER_TEXT,
    DEFAULT_REDIRECT_PATTERN,
};
pub use dialog::{AutoDialogBehavior, Dialog, DialogAction, DialogType};
pub use driver::{MockDriver, MockPage, ProbeDriver};
pub use form::{FormValidity, InvalidField, FORM_VALIDITY_JS, REQUEST_SUBMIT_JS};
pub use locator::{ElementProbe, Selector, SelectorKind, ELEMENT_HELPERS_JS};
pub use network::{
    glob_to_regex, CapturedRequest, HttpMethod, MockResponse, Route, RouteHit, RouteTable,
    SharedRouteTable, UrlPattern,
};
pub use observe::{ConsoleLevel, Observation, ObservationLog};
pub use report::{
    EventStatus, ProbeEvent, ProbeSink, RecordingSink, RunOutcome, SharedSink, StdoutSink,
};
pub use result::{ProbeError, ProbeResult};
pub use scenario::{
    armature_order_steps, mocked_routes, validate_steps, FormStep, FormSubmissionProbe,
    CURRENT_USER_BODY, CURRENT_USER_ROUTE, LOGIN_BODY, LOGIN_ROUTE, ORDER_BODY, ORDER_NOTICE,
    ORDER_QUANTITY, ORDER_ROUTE, UNKNOWN_URL,
};
pub use wait::{
    poll_until, LoadState, NetworkActivity, WaitOptions, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS,
};
