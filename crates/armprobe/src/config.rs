//! Probe configuration.
//!
//! Every address, text, timeout and artifact path the scenario uses. The
//! defaults reproduce the fixed run against a local dev server; a YAML file
//! may override any subset of fields.

use crate::dialog::AutoDialogBehavior;
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default application address
pub const DEFAULT_BASE_URL: &str = "http://localhost:5173";

/// Default order form route
pub const DEFAULT_FORM_PATH: &str = "/create-order/armature";

/// Header shown once the order form has rendered
pub const DEFAULT_HEADER_TEXT: &str = "Новая заявка на арматуру";

/// URL glob that marks a successful submit
pub const DEFAULT_REDIRECT_PATTERN: &str = "**/orders";

/// Browser launch options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Keep the Chromium sandbox (disable in containers)
    pub sandbox: bool,
    /// Path to the Chromium binary (None = auto-detect)
    pub chromium_path: Option<PathBuf>,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
    /// Extra command-line switches
    pub extra_args: Vec<String>,
    /// How native dialogs are answered
    pub dialog_behavior: AutoDialogBehavior,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
            window_width: 1280,
            window_height: 720,
            extra_args: Vec::new(),
            dialog_behavior: AutoDialogBehavior::DismissAll,
        }
    }
}

/// Complete probe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Application root, without trailing slash
    pub base_url: String,
    /// Order form route
    pub form_path: String,
    /// Text that proves the form rendered
    pub header_text: String,
    /// localStorage key for the session token
    pub token_key: String,
    /// Injected session token
    pub token_value: String,
    /// URL glob reached after a successful submit
    pub redirect_pattern: String,
    /// How long to wait for the redirect
    pub redirect_timeout_ms: u64,
    /// How long an action waits for its target element
    pub action_timeout_ms: u64,
    /// How long a navigation may take
    pub navigation_timeout_ms: u64,
    /// How long to wait for network idle before checking the header anyway
    pub network_idle_timeout_ms: u64,
    /// Directory failure screenshots are written to
    pub artifacts_dir: PathBuf,
    /// Screenshot name for a load failure
    pub load_screenshot: String,
    /// Screenshot name for a submit failure
    pub submit_screenshot: String,
    /// Browser launch options
    pub browser: BrowserOptions,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            form_path: DEFAULT_FORM_PATH.to_string(),
            header_text: DEFAULT_HEADER_TEXT.to_string(),
            token_key: "token".to_string(),
            token_value: "mock-token".to_string(),
            redirect_pattern: DEFAULT_REDIRECT_PATTERN.to_string(),
            redirect_timeout_ms: 5000,
            action_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
            network_idle_timeout_ms: 30_000,
            artifacts_dir: PathBuf::from("."),
            load_screenshot: "error_load.png".to_string(),
            submit_screenshot: "error_submit.png".to_string(),
            browser: BrowserOptions::default(),
        }
    }
}

impl ProbeConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; missing fields keep their defaults
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn load(path: &Path) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProbeError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_yaml(&text)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> ProbeResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject values the probe cannot run with
    pub fn validate(&self) -> ProbeResult<()> {
        let fail = |message: String| Err(ProbeError::Config { message });
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return fail(format!("base_url must be http(s): {}", self.base_url));
        }
        if !self.form_path.starts_with('/') {
            return fail(format!("form_path must start with '/': {}", self.form_path));
        }
        if self.header_text.trim().is_empty() {
            return fail("header_text must not be empty".to_string());
        }
        if self.token_key.is_empty() {
            return fail("token_key must not be empty".to_string());
        }
        crate::network::glob_to_regex(&self.redirect_pattern)?;
        if self.load_screenshot.is_empty() || self.submit_screenshot.is_empty() {
            return fail("screenshot names must not be empty".to_string());
        }
        Ok(())
    }

    /// Set the application root
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the redirect timeout
    #[must_use]
    pub const fn with_redirect_timeout(mut self, ms: u64) -> Self {
        self.redirect_timeout_ms = ms;
        self
    }

    /// Set the per-action timeout
    #[must_use]
    pub const fn with_action_timeout(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    /// Set the page navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, ms: u64) -> Self {
        self.navigation_timeout_ms = ms;
        self
    }

    /// Set the artifacts directory
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.browser.headless = headless;
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.browser.sandbox = false;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser.chromium_path = Some(path.into());
        self
    }

    /// Application root with a trailing slash
    #[must_use]
    pub fn app_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// Full order form URL
    #[must_use]
    pub fn form_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.form_path)
    }

    /// Where the load-failure screenshot goes
    #[must_use]
    pub fn load_screenshot_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.load_screenshot)
    }

    /// Where the submit-failure screenshot goes
    #[must_use]
    pub fn submit_screenshot_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.submit_screenshot)
    }
}
