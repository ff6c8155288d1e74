//! ProbeDriver - the seam between the scenario and a browser.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  FormSubmissionProbe         │
//! └──────────────┬───────────────┘
//!                │ ProbeDriver
//!      ┌─────────┴──────────┐
//!      ▼                    ▼
//! ┌──────────────┐   ┌──────────────┐
//! │ChromiumDriver│   │  MockDriver  │
//! │ (CDP, real)  │   │ (scripted)   │
//! └──────────────┘   └──────────────┘
//! ```
//!
//! Actions auto-wait: `click`, `select_option` and `fill` poll for their target
//! to become actionable until `timeout` and fail with
//! [`ProbeError::ElementNotFound`] otherwise.

use crate::form::FormValidity;
use crate::locator::Selector;
use crate::network::{HttpMethod, SharedRouteTable, UrlPattern};
use crate::observe::Observation;
use crate::report::{ProbeEvent, SharedSink};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{poll_until, LoadState, WaitOptions};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Browser operations the probe needs
#[async_trait]
pub trait ProbeDriver: Send {
    /// Serve matching requests from `routes`; route notices go to `sink`
    async fn install_routes(&mut self, routes: SharedRouteTable, sink: SharedSink)
        -> ProbeResult<()>;

    /// Navigate and wait for the `load` event, for at most `timeout`
    async fn goto(&mut self, url: &str, timeout: Duration) -> ProbeResult<()>;

    /// Evaluate a script in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> ProbeResult<serde_json::Value>;

    /// Write a `localStorage` entry for the current origin
    async fn set_local_storage(&self, key: &str, value: &str) -> ProbeResult<()>;

    /// Wait for a load state
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> ProbeResult<()>;

    /// Whether the selected element is visible right now (no waiting)
    async fn is_visible(&self, selector: &Selector) -> ProbeResult<bool>;

    /// Wait for the selected element to be visible
    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()>;

    /// Click the centre of the selected element
    async fn click(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()>;

    /// Select the option at `index` of a `<select>`
    async fn select_option(
        &self,
        selector: &Selector,
        index: usize,
        timeout: Duration,
    ) -> ProbeResult<()>;

    /// Replace an input's value
    async fn fill(&self, selector: &Selector, value: &str, timeout: Duration) -> ProbeResult<()>;

    /// `checkValidity()` of the first form plus its invalid fields
    async fn form_validity(&self) -> ProbeResult<FormValidity>;

    /// `requestSubmit()` on the first form
    async fn request_submit(&self) -> ProbeResult<()>;

    /// Current page URL
    async fn current_url(&self) -> ProbeResult<String>;

    /// Wait until the page URL matches `pattern`
    async fn wait_for_url(&self, pattern: &UrlPattern, timeout: Duration) -> ProbeResult<()>;

    /// Write a PNG screenshot to `path`
    async fn screenshot(&self, path: &Path) -> ProbeResult<PathBuf>;

    /// Release the browser. Every other call fails afterwards.
    async fn close(&mut self) -> ProbeResult<()>;
}

/// Poll interval used by [`MockDriver::wait_for_url`]
const MOCK_POLL_INTERVAL_MS: u64 = 5;

/// Scripted page served by [`MockDriver`]
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    /// Selectors (as written) that resolve to a visible element
    pub present: HashSet<String>,
    /// Validity reported for the form
    pub validity: FormValidity,
    /// Request the page sends when the form is submitted
    pub submit_request: Option<(HttpMethod, String)>,
    /// Where the page navigates after a 2xx submit response
    pub redirect_to: Option<String>,
    /// Navigations without this `localStorage` key land on `login_url`,
    /// where no selector resolves
    pub requires_token: Option<String>,
    /// Login page URL used with `requires_token`
    pub login_url: String,
    /// Load state waits never finish
    pub never_idle: bool,
    /// Navigation to this URL never completes
    pub stalled_navigation: Option<String>,
}

impl MockPage {
    /// Empty page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make selectors resolve
    #[must_use]
    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present.extend(selectors.into_iter().map(Into::into));
        self
    }

    /// Remove a selector
    #[must_use]
    pub fn without_selector(mut self, selector: &str) -> Self {
        self.present.remove(selector);
        self
    }

    /// Set form validity
    #[must_use]
    pub fn with_validity(mut self, validity: FormValidity) -> Self {
        self.validity = validity;
        self
    }

    /// Request sent on submit and the navigation that follows a 2xx response
    #[must_use]
    pub fn with_submit(
        mut self,
        method: HttpMethod,
        url: impl Into<String>,
        redirect_to: impl Into<String>,
    ) -> Self {
        self.submit_request = Some((method, url.into()));
        self.redirect_to = Some(redirect_to.into());
        self
    }

    /// Redirect to `login_url` unless `key` is in localStorage
    #[must_use]
    pub fn with_auth_guard(mut self, key: impl Into<String>, login_url: impl Into<String>) -> Self {
        self.requires_token = Some(key.into());
        self.login_url = login_url.into();
        self
    }

    /// Network never goes idle
    #[must_use]
    pub const fn with_busy_network(mut self) -> Self {
        self.never_idle = true;
        self
    }

    /// Navigation to `url` hangs until the caller's timeout
    #[must_use]
    pub fn with_stalled_navigation(mut self, url: impl Into<String>) -> Self {
        self.stalled_navigation = Some(url.into());
        self
    }
}

#[derive(Default)]
struct MockState {
    current_url: String,
    local_storage: HashMap<String, String>,
    values: HashMap<String, String>,
    call_history: Vec<String>,
    close_calls: usize,
    closed: bool,
    routes: Option<SharedRouteTable>,
    sink: Option<SharedSink>,
    pending_navigation: Option<(Instant, String)>,
}

impl MockState {
    fn settle(&mut self) {
        if let Some((at, _)) = self.pending_navigation {
            if Instant::now() >= at {
                if let Some((_, url)) = self.pending_navigation.take() {
                    self.current_url = url;
                }
            }
        }
    }
}

/// In-memory driver for scenario tests
pub struct MockDriver {
    page: MockPage,
    state: Mutex<MockState>,
    fail_screenshots: bool,
    fail_current_url: bool,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new(MockPage::default())
    }
}

impl MockDriver {
    /// Create a driver serving `page`
    #[must_use]
    pub fn new(page: MockPage) -> Self {
        Self {
            page,
            state: Mutex::new(MockState {
                current_url: "about:blank".to_string(),
                ..MockState::default()
            }),
            fail_screenshots: false,
            fail_current_url: false,
        }
    }

    /// Make every screenshot fail
    #[must_use]
    pub const fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Make `current_url` fail, as it does while a document is being replaced
    #[must_use]
    pub const fn with_failing_current_url(mut self) -> Self {
        self.fail_current_url = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: String) -> ProbeResult<()> {
        let mut state = self.state();
        state.call_history.push(call);
        if state.closed {
            return Err(ProbeError::AlreadyClosed);
        }
        Ok(())
    }

    fn resolves(&self, selector: &Selector) -> bool {
        let on_login = self.page.requires_token.is_some()
            && self.state().current_url == self.page.login_url;
        !on_login && self.page.present.contains(selector.as_str())
    }

    fn require(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()> {
        if self.resolves(selector) {
            Ok(())
        } else {
            Err(ProbeError::ElementNotFound {
                selector: selector.to_string(),
                ms: timeout.as_millis() as u64,
            })
        }
    }

    /// Every call in order, as `name:args`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().call_history.clone()
    }

    /// Check if a method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_history.iter().any(|c| c.starts_with(method))
    }

    /// How many times `close` was called
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    /// Value written by `fill` or `select_option`
    #[must_use]
    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state().values.get(selector).cloned()
    }

    /// localStorage entry
    #[must_use]
    pub fn local_storage(&self, key: &str) -> Option<String> {
        self.state().local_storage.get(key).cloned()
    }

    /// Replay one request through the installed routes, as the page would
    pub fn send_request(&self, method: HttpMethod, url: &str) -> Option<crate::network::RouteHit> {
        let (routes, sink) = {
            let state = self.state();
            (state.routes.clone(), state.sink.clone())
        };
        let hit = routes.and_then(|table| {
            table
                .lock()
                .ok()
                .and_then(|mut table| table.handle_request(url, method))
        });
        if let Some(sink) = sink {
            match hit {
                Some(ref hit) => {
                    if let Some(ref notice) = hit.notice {
                        sink.emit(ProbeEvent::RouteNotice(notice.clone()));
                    }
                }
                None => sink.emit(ProbeEvent::Observed(Observation::RequestFailed {
                    url: url.to_string(),
                    failure: "net::ERR_CONNECTION_REFUSED".to_string(),
                })),
            }
        }
        hit
    }
}

#[async_trait]
impl ProbeDriver for MockDriver {
    async fn install_routes(
        &mut self,
        routes: SharedRouteTable,
        sink: SharedSink,
    ) -> ProbeResult<()> {
        let count = routes.lock().map(|t| t.route_count()).unwrap_or(0);
        self.record(format!("install_routes:{count}"))?;
        let mut state = self.state();
        state.routes = Some(routes);
        state.sink = Some(sink);
        Ok(())
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("goto:{url}"))?;
        if self.page.stalled_navigation.as_deref() == Some(url) {
            tokio::time::sleep(timeout).await;
            return Err(ProbeError::Timeout {
                ms: timeout.as_millis() as u64,
                waited_for: format!("navigation to {url}"),
            });
        }
        let mut state = self.state();
        state.pending_navigation = None;
        let blocked = match self.page.requires_token {
            Some(ref key) => !state.local_storage.contains_key(key) && !url.ends_with('/'),
            None => false,
        };
        state.current_url = if blocked {
            self.page.login_url.clone()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> ProbeResult<serde_json::Value> {
        self.record(format!("evaluate:{script}"))?;
        Ok(serde_json::Value::Null)
    }

    async fn set_local_storage(&self, key: &str, value: &str) -> ProbeResult<()> {
        self.record(format!("set_local_storage:{key}={value}"))?;
        self.state()
            .local_storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("wait_for_load_state:{state}"))?;
        if self.page.never_idle && state == LoadState::NetworkIdle {
            return Err(ProbeError::Timeout {
                ms: timeout.as_millis() as u64,
                waited_for: state.to_string(),
            });
        }
        Ok(())
    }

    async fn is_visible(&self, selector: &Selector) -> ProbeResult<bool> {
        self.record(format!("is_visible:{selector}"))?;
        Ok(self.resolves(selector))
    }

    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("wait_for_selector:{selector}"))?;
        self.require(selector, timeout)
    }

    async fn click(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("click:{selector}"))?;
        self.require(selector, timeout)
    }

    async fn select_option(
        &self,
        selector: &Selector,
        index: usize,
        timeout: Duration,
    ) -> ProbeResult<()> {
        self.record(format!("select_option:{selector}:{index}"))?;
        self.require(selector, timeout)?;
        self.state()
            .values
            .insert(selector.to_string(), index.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("fill:{selector}:{value}"))?;
        self.require(selector, timeout)?;
        self.state()
            .values
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn form_validity(&self) -> ProbeResult<FormValidity> {
        self.record("form_validity".to_string())?;
        Ok(self.page.validity.clone())
    }

    async fn request_submit(&self) -> ProbeResult<()> {
        self.record("request_submit".to_string())?;
        let Some((method, ref url)) = self.page.submit_request else {
            return Ok(());
        };
        if let Some(hit) = self.send_request(method, url) {
            let ok = (200..300).contains(&hit.response.status);
            if let (true, Some(target)) = (ok, self.page.redirect_to.clone()) {
                let at = Instant::now() + Duration::from_millis(hit.response.delay_ms);
                self.state().pending_navigation = Some((at, target));
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        self.record("current_url".to_string())?;
        if self.fail_current_url {
            return Err(ProbeError::script("Execution context was destroyed"));
        }
        let mut state = self.state();
        state.settle();
        Ok(state.current_url.clone())
    }

    async fn wait_for_url(&self, pattern: &UrlPattern, timeout: Duration) -> ProbeResult<()> {
        self.record(format!("wait_for_url:{pattern}"))?;
        let options = WaitOptions::new()
            .with_timeout(timeout.as_millis() as u64)
            .with_poll_interval(MOCK_POLL_INTERVAL_MS);
        let waited_for = format!("URL matching {pattern}");
        poll_until(options, &waited_for, move || async move {
            let mut state = self.state();
            state.settle();
            Ok(pattern.matches(&state.current_url).then_some(()))
        })
        .await
    }

    async fn screenshot(&self, path: &Path) -> ProbeResult<PathBuf> {
        self.record(format!("screenshot:{}", path.display()))?;
        if self.fail_screenshots {
            return Err(ProbeError::Screenshot {
                message: "mock screenshot failure".to_string(),
            });
        }
        tokio::fs::write(path, b"\x89PNG\r\n\x1a\n").await?;
        Ok(path.to_path_buf())
    }

    async fn close(&mut self) -> ProbeResult<()> {
        let mut state = self.state();
        state.call_history.push("close".to_string());
        state.close_calls += 1;
        if state.closed {
            return Err(ProbeError::AlreadyClosed);
        }
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::network::{MockResponse, Route, RouteTable};
    use crate::report::RecordingSink;
    use std::sync::Arc;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    mod action_tests {
        use super::*;

        #[tokio::test]
        async fn test_present_selector_actions() {
            let driver = MockDriver::new(MockPage::new().with_selectors(["select >> nth=0"]));
            let s = sel("select >> nth=0");
            driver.select_option(&s, 1, Duration::from_secs(1)).await.unwrap();
            assert_eq!(driver.value_of("select >> nth=0").as_deref(), Some("1"));
            assert!(driver.was_called("select_option:select >> nth=0:1"));
        }

        #[tokio::test]
        async fn test_missing_selector_fails_with_timeout() {
            let driver = MockDriver::default();
            let err = driver
                .click(&sel("button.bg-blue-100 >> nth=0"), Duration::from_millis(30))
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::ElementNotFound { ms: 30, .. }));
        }

        #[tokio::test]
        async fn test_is_visible_does_not_fail() {
            let driver = MockDriver::default();
            assert!(!driver.is_visible(&Selector::text("Header")).await.unwrap());
        }
    }

    mod navigation_tests {
        use super::*;

        const NAV: Duration = Duration::from_secs(1);

        #[tokio::test]
        async fn test_stalled_navigation_times_out() {
            let page = MockPage::new().with_stalled_navigation("http://app/form");
            let mut driver = MockDriver::new(page);
            let err = driver
                .goto("http://app/form", Duration::from_millis(15))
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::Timeout { ms: 15, .. }));
            driver.goto("http://app/", NAV).await.unwrap();
        }

        #[tokio::test]
        async fn test_failing_current_url() {
            let driver = MockDriver::default().with_failing_current_url();
            assert!(matches!(
                driver.current_url().await,
                Err(ProbeError::Script { .. })
            ));
        }

        #[tokio::test]
        async fn test_auth_guard_redirects_without_token() {
            let page = MockPage::new().with_auth_guard("token", "http://app/login");
            let mut driver = MockDriver::new(page);
            driver.goto("http://app/form", NAV).await.unwrap();
            assert_eq!(driver.current_url().await.unwrap(), "http://app/login");

            driver.set_local_storage("token", "t").await.unwrap();
            driver.goto("http://app/form", NAV).await.unwrap();
            assert_eq!(driver.current_url().await.unwrap(), "http://app/form");
        }

        #[tokio::test]
        async fn test_busy_network_times_out() {
            let driver = MockDriver::new(MockPage::new().with_busy_network());
            let err = driver
                .wait_for_load_state(LoadState::NetworkIdle, Duration::from_millis(10))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            driver
                .wait_for_load_state(LoadState::Load, Duration::from_millis(10))
                .await
                .unwrap();
        }
    }

    mod submit_tests {
        use super::*;

        async fn driver_with_order_route(delay_ms: u64) -> (MockDriver, RecordingSink) {
            let page = MockPage::new().with_submit(
                HttpMethod::Post,
                "http://app/api/orders",
                "http://app/orders",
            );
            let mut driver = MockDriver::new(page);
            let sink = RecordingSink::new();
            let table = RouteTable::with_routes([Route::new(
                UrlPattern::glob("**/orders"),
                MockResponse::raw("{}").with_delay(delay_ms),
            )
            .with_notice("hit")]);
            driver
                .install_routes(table.shared(), Arc::new(sink.clone()))
                .await
                .unwrap();
            (driver, sink)
        }

        #[tokio::test]
        async fn test_submit_redirects_after_route() {
            let (driver, sink) = driver_with_order_route(0).await;
            driver.request_submit().await.unwrap();
            driver
                .wait_for_url(&UrlPattern::glob("**/orders"), Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(sink.lines(), vec!["hit"]);
        }

        #[tokio::test]
        async fn test_delayed_route_misses_deadline() {
            let (driver, _sink) = driver_with_order_route(10_000).await;
            driver.request_submit().await.unwrap();
            let err = driver
                .wait_for_url(&UrlPattern::glob("**/orders"), Duration::from_millis(20))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(driver.current_url().await.unwrap(), "about:blank");
        }

        #[tokio::test]
        async fn test_unrouted_request_reports_failure() {
            let (driver, sink) = driver_with_order_route(0).await;
            assert!(driver.send_request(HttpMethod::Get, "http://app/api/catalog").is_none());
            assert!(sink.lines()[0].starts_with("REQUEST FAILED: http://app/api/catalog"));
        }
    }

    mod close_tests {
        use super::*;

        #[tokio::test]
        async fn test_calls_after_close_fail() {
            let mut driver = MockDriver::default();
            driver.close().await.unwrap();
            assert!(matches!(
                driver.current_url().await,
                Err(ProbeError::AlreadyClosed)
            ));
            assert!(driver.close().await.is_err());
            assert_eq!(driver.close_calls(), 2);
        }

        #[tokio::test]
        async fn test_screenshot_writes_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("shot.png");
            let driver = MockDriver::default();
            driver.screenshot(&path).await.unwrap();
            assert!(path.exists());

            let failing = MockDriver::default().with_failing_screenshots();
            assert!(failing.screenshot(&path).await.is_err());
        }
    }
}
