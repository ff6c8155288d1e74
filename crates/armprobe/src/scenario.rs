//! The armature order probe.
//!
//! Mocks the backend, bypasses login with an injected token, fills the
//! armature order form, submits it and checks that the app lands on the order
//! list. Every path out of [`FormSubmissionProbe::run`] closes the browser.

use crate::config::ProbeConfig;
use crate::driver::ProbeDriver;
use crate::locator::Selector;
use crate::network::{MockResponse, Route, RouteTable, SharedRouteTable, UrlPattern};
use crate::report::{ProbeEvent, RunOutcome, SharedSink};
use crate::result::ProbeResult;
use crate::wait::LoadState;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current-user endpoint
pub const CURRENT_USER_ROUTE: &str = "**/api/me";

/// Login endpoint
pub const LOGIN_ROUTE: &str = "**/api/login";

/// Order creation endpoint
pub const ORDER_ROUTE: &str = "**/orders";

/// Profile returned for the current user
pub const CURRENT_USER_BODY: &str =
    r#"{"id": 1, "name": "Test User", "phone": "+79991112233", "role": "client", "is_active": true}"#;

/// Login response
pub const LOGIN_BODY: &str = r#"{"access_token": "mock-token", "user": {"id": 1}}"#;

/// Order creation response
pub const ORDER_BODY: &str = r#"{"success": true, "id": 123}"#;

/// Printed whenever the order route is hit
pub const ORDER_NOTICE: &str = "Order submission intercepted!";

/// Quantity typed into the first product row
pub const ORDER_QUANTITY: &str = "10";

/// Reported as the current URL when the page cannot tell
pub const UNKNOWN_URL: &str = "about:unknown";

/// The three mocked backend routes
#[must_use]
pub fn mocked_routes() -> RouteTable {
    RouteTable::with_routes([
        Route::new(
            UrlPattern::glob(CURRENT_USER_ROUTE),
            MockResponse::json(CURRENT_USER_BODY),
        ),
        Route::new(UrlPattern::glob(LOGIN_ROUTE), MockResponse::json(LOGIN_BODY)),
        Route::new(UrlPattern::glob(ORDER_ROUTE), MockResponse::raw(ORDER_BODY))
            .with_notice(ORDER_NOTICE),
    ])
}

/// One step of form population
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormStep {
    /// Print a line
    Announce(ProbeEvent),
    /// Pick an option of a `<select>` by index
    SelectOption {
        /// Target
        selector: &'static str,
        /// Option index
        index: usize,
        /// What the field is
        what: &'static str,
    },
    /// Click an element
    Click {
        /// Target
        selector: &'static str,
        /// What is clicked
        what: &'static str,
    },
    /// Wait for an element to become visible
    WaitFor {
        /// Target
        selector: &'static str,
        /// What is awaited
        what: &'static str,
    },
    /// Type into an input
    Fill {
        /// Target
        selector: &'static str,
        /// Text to enter
        value: &'static str,
        /// What the field is
        what: &'static str,
    },
}

impl FormStep {
    /// Human-readable step name used in errors and progress display
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Announce(event) => event.to_string(),
            Self::SelectOption { what, index, .. } => format!("select {what} (option {index})"),
            Self::Click { what, .. } => format!("click {what}"),
            Self::WaitFor { what, .. } => format!("wait for {what}"),
            Self::Fill { what, value, .. } => format!("fill {what} with {value}"),
        }
    }

    /// Selector the step acts on, if any
    #[must_use]
    pub const fn selector(&self) -> Option<&'static str> {
        match self {
            Self::Announce(_) => None,
            Self::SelectOption { selector, .. }
            | Self::Click { selector, .. }
            | Self::WaitFor { selector, .. }
            | Self::Fill { selector, .. } => Some(*selector),
        }
    }

    async fn execute<D>(&self, driver: &mut D, sink: &SharedSink, timeout: Duration) -> ProbeResult<()>
    where
        D: ProbeDriver + ?Sized,
    {
        let target = self.selector().map(Selector::parse).transpose()?;
        match (self, target) {
            (Self::Announce(event), _) => sink.emit(event.clone()),
            (Self::SelectOption { index, .. }, Some(s)) => {
                driver.select_option(&s, *index, timeout).await?;
            }
            (Self::Click { .. }, Some(s)) => driver.click(&s, timeout).await?,
            (Self::WaitFor { .. }, Some(s)) => driver.wait_for_selector(&s, timeout).await?,
            (Self::Fill { value, .. }, Some(s)) => driver.fill(&s, value, timeout).await?,
            (_, None) => {}
        }
        Ok(())
    }
}

/// Form population, in order
#[must_use]
pub fn armature_order_steps() -> Vec<FormStep> {
    use FormStep::{Announce, Click, Fill, SelectOption, WaitFor};
    vec![
        Announce(ProbeEvent::FillingForm),
        SelectOption {
            selector: "select >> nth=0",
            index: 1,
            what: "buyer",
        },
        SelectOption {
            selector: "select >> nth=1",
            index: 1,
            what: "consignee",
        },
        Announce(ProbeEvent::TogglingSelfPickup),
        Click {
            selector: "input[id='is_pickup']",
            what: "self-pickup checkbox",
        },
        Click {
            selector: "input[placeholder*='Выберите']",
            what: "carrier combobox",
        },
        WaitFor {
            selector: "ul[role='listbox']",
            what: "carrier options",
        },
        Click {
            selector: "li[role='option'] >> nth=0",
            what: "first carrier",
        },
        Announce(ProbeEvent::CarrierSelected),
        // buyer(0) consignee(1) vehicle(2) trailer(3) driver(4) unloading(5)
        SelectOption {
            selector: "select >> nth=5",
            index: 1,
            what: "unloading point",
        },
        Click {
            selector: "text=СП-2023 >> nth=0",
            what: "specification card",
        },
        Announce(ProbeEvent::SpecificationSelected),
        WaitFor {
            selector: "text=Доступно к заказу",
            what: "product gallery",
        },
        Click {
            selector: "button.bg-blue-100 >> nth=0",
            what: "add product button",
        },
        Announce(ProbeEvent::ProductAdded),
        Fill {
            selector: "input[type='number']",
            value: ORDER_QUANTITY,
            what: "quantity",
        },
    ]
}

/// Drives the order form end to end
pub struct FormSubmissionProbe {
    config: ProbeConfig,
    sink: SharedSink,
    routes: SharedRouteTable,
}

impl std::fmt::Debug for FormSubmissionProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSubmissionProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FormSubmissionProbe {
    /// Probe with the standard mocked routes
    #[must_use]
    pub fn new(config: ProbeConfig, sink: SharedSink) -> Self {
        Self::with_routes(config, sink, mocked_routes())
    }

    /// Probe with a custom route table
    #[must_use]
    pub fn with_routes(config: ProbeConfig, sink: SharedSink, routes: RouteTable) -> Self {
        Self {
            config,
            sink,
            routes: routes.shared(),
        }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Route table, including the requests it served
    #[must_use]
    pub fn routes(&self) -> SharedRouteTable {
        self.routes.clone()
    }

    /// Launch Chromium and run the probe
    #[cfg(feature = "browser")]
    pub async fn run_chromium(&self) -> ProbeResult<RunOutcome> {
        self.sink.step("launching browser");
        let mut driver =
            crate::browser::ChromiumDriver::launch(&self.config.browser, self.sink.clone()).await?;
        self.run(&mut driver).await
    }

    /// Run the probe on an open driver, then close it.
    ///
    /// Reported failures come back as a [`RunOutcome`]; anything else is an
    /// error, returned after the driver has been closed.
    pub async fn run<D>(&self, driver: &mut D) -> ProbeResult<RunOutcome>
    where
        D: ProbeDriver + ?Sized,
    {
        let result = self.drive(driver).await;
        self.sink.step("closing browser");
        let closed = driver.close().await;
        self.sink.finish();

        match (result, closed) {
            (Ok(outcome), Ok(())) => {
                info!(%outcome, "probe finished");
                Ok(outcome)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("closing browser after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn drive<D>(&self, driver: &mut D) -> ProbeResult<RunOutcome>
    where
        D: ProbeDriver + ?Sized,
    {
        let cfg = &self.config;
        let action_timeout = Duration::from_millis(cfg.action_timeout_ms);
        let navigation_timeout = Duration::from_millis(cfg.navigation_timeout_ms);

        self.sink.step("installing mocked routes");
        driver
            .install_routes(self.routes.clone(), self.sink.clone())
            .await
            .map_err(|e| e.in_step("install mocked routes"))?;

        self.sink.emit(ProbeEvent::NavigatingToApp);
        self.sink.step("opening application");
        let app_url = cfg.app_url();
        driver
            .goto(&app_url, navigation_timeout)
            .await
            .map_err(|e| e.in_step("open application"))?;
        driver
            .set_local_storage(&cfg.token_key, &cfg.token_value)
            .await
            .map_err(|e| e.in_step("inject session token"))?;

        self.sink.emit(ProbeEvent::NavigatingToForm);
        self.sink.step("opening order form");
        let form_url = cfg.form_url();
        driver
            .goto(&form_url, navigation_timeout)
            .await
            .map_err(|e| e.in_step("open order form"))?;

        let idle_timeout = Duration::from_millis(cfg.network_idle_timeout_ms);
        match driver
            .wait_for_load_state(LoadState::NetworkIdle, idle_timeout)
            .await
        {
            Ok(()) => debug!("network idle"),
            Err(e) if e.is_timeout() => {
                warn!(
                    "network did not go idle within {}ms, checking the page anyway",
                    cfg.network_idle_timeout_ms
                );
            }
            Err(e) => return Err(e.in_step("wait for network idle")),
        }

        let header = Selector::text(cfg.header_text.clone());
        let loaded = driver
            .is_visible(&header)
            .await
            .map_err(|e| e.in_step("check form header"))?;
        if !loaded {
            self.sink.emit(ProbeEvent::PageLoadFailed);
            let screenshot = self.capture(driver, &cfg.load_screenshot_path()).await;
            return Ok(RunOutcome::LoadFailed { screenshot });
        }
        self.sink.emit(ProbeEvent::PageLoaded);

        for step in armature_order_steps() {
            let description = step.description();
            if step.selector().is_some() {
                self.sink.step(&description);
                debug!(step = %description, "form step");
            }
            step.execute(driver, &self.sink, action_timeout)
                .await
                .map_err(|e| e.in_step(description))?;
        }

        self.sink.emit(ProbeEvent::SubmittingForm);
        self.sink.step("checking form validity");
        let validity = driver
            .form_validity()
            .await
            .map_err(|e| e.in_step("check form validity"))?;
        self.sink.emit(ProbeEvent::FormValidity(validity.valid));
        if !validity.valid {
            self.sink.emit(ProbeEvent::InvalidFields(validity.invalid_fields));
        }

        driver
            .request_submit()
            .await
            .map_err(|e| e.in_step("submit form"))?;
        self.sink.emit(ProbeEvent::SubmitTriggered);

        self.sink.step("waiting for redirect");
        let pattern = UrlPattern::glob(cfg.redirect_pattern.clone());
        let redirect_timeout = Duration::from_millis(cfg.redirect_timeout_ms);
        match driver.wait_for_url(&pattern, redirect_timeout).await {
            Ok(()) => {
                self.sink.emit(ProbeEvent::Redirected);
                Ok(RunOutcome::Submitted)
            }
            Err(e) => {
                debug!("redirect wait ended: {}", e);
                self.sink.emit(ProbeEvent::RedirectFailed);
                let current_url = match driver.current_url().await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("could not read the current URL: {}", e);
                        UNKNOWN_URL.to_string()
                    }
                };
                self.sink.emit(ProbeEvent::CurrentUrl(current_url.clone()));
                let screenshot = self.capture(driver, &cfg.submit_screenshot_path()).await;
                Ok(RunOutcome::SubmitFailed {
                    current_url,
                    screenshot,
                })
            }
        }
    }

    /// Screenshot for a reported failure; a failed write only logs a warning
    async fn capture<D>(&self, driver: &mut D, path: &Path) -> Option<PathBuf>
    where
        D: ProbeDriver + ?Sized,
    {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), "cannot create artifacts directory: {}", e);
                return None;
            }
        }
        match driver.screenshot(path).await {
            Ok(written) => {
                info!(path = %written.display(), "screenshot saved");
                Some(written)
            }
            Err(e) => {
                warn!(path = %path.display(), "screenshot failed: {}", e);
                None
            }
        }
    }
}

/// Check that every step selector parses
pub fn validate_steps(steps: &[FormStep]) -> ProbeResult<()> {
    for step in steps {
        if let Some(raw) = step.selector() {
            Selector::parse(raw).map_err(|e| e.in_step(step.description()))?;
        }
    }
    Ok(())
}
