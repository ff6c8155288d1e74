//! Chromium driver over the Chrome DevTools Protocol.
//!
//! One browser process, one isolated browser context, one page. Background
//! tasks drive the CDP handler, answer paused requests from the route table,
//! and turn console, dialog and network events into observations.

use crate::config::BrowserOptions;
use crate::dialog::{Dialog, DialogType};
use crate::driver::ProbeDriver;
use crate::form::{FormValidity, FORM_VALIDITY_JS, REQUEST_SUBMIT_JS};
use crate::locator::{ElementProbe, Selector};
use crate::network::{HttpMethod, MockResponse, SharedRouteTable, UrlPattern};
use crate::observe::{ConsoleLevel, Observation, ObservationLog};
use crate::report::{ProbeEvent, SharedSink};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{poll_until, LoadState, NetworkActivity, WaitOptions};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FulfillRequestParams, HeaderEntry,
    RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, RemoteObject};
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Browser driven over CDP
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
    activity: NetworkActivity,
    observations: ObservationLog,
    options: BrowserOptions,
    user_data_dir: PathBuf,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("options", &self.options)
            .field("user_data_dir", &self.user_data_dir)
            .field("open", &self.page.is_some())
            .finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launch Chromium, open an isolated context with one page, and start
    /// printing console messages, dialogs and failed requests to `sink`.
    pub async fn launch(options: &BrowserOptions, sink: SharedSink) -> ProbeResult<Self> {
        let user_data_dir =
            std::env::temp_dir().join(format!("armprobe-{}", uuid::Uuid::new_v4()));
        let config = browser_config(options, &user_data_dir)?;
        debug!(?options, "launching chromium");

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| ProbeError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match open_isolated_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                if let Err(close_err) = browser.close().await {
                    warn!("closing browser after failed page setup: {}", close_err);
                }
                handler_task.abort();
                return Err(e);
            }
        };

        let activity = NetworkActivity::new();
        let observations = ObservationLog::new();
        let tasks = vec![
            spawn_console_listener(&page, sink.clone(), observations.clone()).await?,
            spawn_dialog_listener(&page, sink.clone(), observations.clone(), options).await?,
            spawn_network_listener(&page, sink, observations.clone(), activity.clone()).await?,
        ];

        info!(headless = options.headless, "chromium ready");
        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page: Some(page),
            handler: Some(handler_task),
            tasks,
            activity,
            observations,
            options: options.clone(),
            user_data_dir,
        })
    }

    /// Everything observed so far
    #[must_use]
    pub fn observations(&self) -> &ObservationLog {
        &self.observations
    }

    fn page(&self) -> ProbeResult<&Page> {
        self.page.as_ref().ok_or(ProbeError::AlreadyClosed)
    }

    /// Poll until the selected element is visible and enabled
    async fn actionable(&self, selector: &Selector, timeout: Duration) -> ProbeResult<ElementProbe> {
        let script = selector.probe_script();
        let script = script.as_str();
        let options = WaitOptions::new().with_timeout(timeout.as_millis() as u64);
        poll_until(options, selector.as_str(), move || async move {
            let value = self.evaluate(script).await?;
            let probe: ElementProbe = serde_json::from_value(value)?;
            Ok(probe.is_actionable().then_some(probe))
        })
        .await
        .map_err(|e| not_found(e, selector, timeout))
    }

    /// Poll a script that returns `true` once it has acted on the element
    async fn act(&self, selector: &Selector, body: &str, timeout: Duration) -> ProbeResult<()> {
        self.actionable(selector, timeout).await?;
        let script = selector.with_element_script(body);
        let script = script.as_str();
        let options = WaitOptions::new().with_timeout(timeout.as_millis() as u64);
        poll_until(options, selector.as_str(), move || async move {
            let done = self.evaluate(script).await?.as_bool().unwrap_or(false);
            Ok(done.then_some(()))
        })
        .await
        .map_err(|e| not_found(e, selector, timeout))
    }
}

fn not_found(err: ProbeError, selector: &Selector, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::ElementNotFound {
            selector: selector.to_string(),
            ms: timeout.as_millis() as u64,
        }
    } else {
        err
    }
}

fn browser_config(options: &BrowserOptions, user_data_dir: &Path) -> ProbeResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .window_size(options.window_width, options.window_height)
        .arg("--disable-dev-shm-usage")
        .arg(format!("--user-data-dir={}", user_data_dir.display()));

    if !options.headless {
        builder = builder.with_head();
    }
    if !options.sandbox {
        builder = builder.no_sandbox();
    }
    for arg in &options.extra_args {
        builder = builder.arg(arg.clone());
    }
    if let Some(ref path) = options.chromium_path {
        builder = builder.chrome_executable(path.clone());
    }

    builder
        .build()
        .map_err(|message| ProbeError::BrowserLaunch { message })
}

async fn open_isolated_page(browser: &Browser) -> ProbeResult<Page> {
    let context = browser
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(|e| ProbeError::page(format!("creating browser context: {e}")))?;
    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context.result.browser_context_id.clone())
        .build()
        .map_err(ProbeError::page)?;
    browser
        .new_page(target)
        .await
        .map_err(|e| ProbeError::page(format!("opening page: {e}")))
}

fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .map(|arg| match (&arg.value, &arg.description) {
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(description)) => description.clone(),
            (None, None) => "undefined".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn spawn_console_listener(
    page: &Page,
    sink: SharedSink,
    log: ObservationLog,
) -> ProbeResult<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| ProbeError::page(e.to_string()))?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let observation = Observation::Console {
                level: ConsoleLevel::parse(&format!("{:?}", event.r#type)),
                text: console_text(&event.args),
            };
            log.push(observation.clone());
            sink.emit(ProbeEvent::Observed(observation));
        }
    }))
}

async fn spawn_dialog_listener(
    page: &Page,
    sink: SharedSink,
    log: ObservationLog,
    options: &BrowserOptions,
) -> ProbeResult<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| ProbeError::page(e.to_string()))?;
    let page = page.clone();
    let behavior = options.dialog_behavior;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let kind = DialogType::parse(&format!("{:?}", event.r#type));
            let mut dialog = Dialog::new(kind, event.message.clone());
            dialog.default_value = event.default_prompt.clone();

            let observation = Observation::Dialog {
                kind,
                message: event.message.clone(),
            };
            log.push(observation.clone());
            sink.emit(ProbeEvent::Observed(observation));

            let action = behavior.resolve(&dialog);
            let mut params = HandleJavaScriptDialogParams::new(action.accepts());
            params.prompt_text = action.prompt_text().map(str::to_string);
            if let Err(e) = page.execute(params).await {
                warn!("answering dialog failed: {}", e);
            }
        }
    }))
}

async fn spawn_network_listener(
    page: &Page,
    sink: SharedSink,
    log: ObservationLog,
    activity: NetworkActivity,
) -> ProbeResult<JoinHandle<()>> {
    let listen_err = |e: chromiumoxide::error::CdpError| ProbeError::page(e.to_string());
    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(listen_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(listen_err)?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(listen_err)?;

    Ok(tokio::spawn(async move {
        let mut urls: HashMap<String, String> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = sent.next() => {
                    let id = event.request_id.inner().clone();
                    urls.insert(id.clone(), event.request.url.clone());
                    activity.request_started(id);
                }
                Some(event) = finished.next() => {
                    let id = event.request_id.inner();
                    urls.remove(id);
                    activity.request_finished(id);
                }
                Some(event) = failed.next() => {
                    let id = event.request_id.inner();
                    activity.request_finished(id);
                    let url = urls.remove(id).unwrap_or_default();
                    let observation = Observation::RequestFailed {
                        url,
                        failure: event.error_text.clone(),
                    };
                    log.push(observation.clone());
                    sink.emit(ProbeEvent::Observed(observation));
                }
                else => break,
            }
        }
    }))
}

/// Mocked responses waiting out their delay.
///
/// Owned by the interception task, so aborting that task drops the set and
/// aborts every fulfilment still sleeping.
#[derive(Default)]
struct PendingFulfilments {
    set: JoinSet<()>,
}

impl PendingFulfilments {
    fn schedule<F>(&mut self, delay: Duration, fulfil: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        while self.set.try_join_next().is_some() {}
        self.set.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            fulfil.await;
        });
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

async fn fulfill(page: &Page, event: &EventRequestPaused, response: &MockResponse) -> ProbeResult<()> {
    let headers: Vec<HeaderEntry> = response
        .header_pairs()
        .into_iter()
        .map(|(name, value)| HeaderEntry::new(name, value))
        .collect();
    let params = FulfillRequestParams::builder()
        .request_id(event.request_id.clone())
        .response_code(i64::from(response.status))
        .response_headers(headers)
        .body(BASE64.encode(response.body.as_bytes()))
        .build()
        .map_err(|message| ProbeError::Interception { message })?;
    page.execute(params)
        .await
        .map_err(|e| ProbeError::Interception {
            message: e.to_string(),
        })?;
    Ok(())
}

#[async_trait]
impl ProbeDriver for ChromiumDriver {
    async fn install_routes(
        &mut self,
        routes: SharedRouteTable,
        sink: SharedSink,
    ) -> ProbeResult<()> {
        let page = self.page()?.clone();
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| ProbeError::Interception {
                message: e.to_string(),
            })?;

        let task_page = page.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut pending = PendingFulfilments::default();
            while let Some(event) = paused.next().await {
                let url = event.request.url.clone();
                let method = HttpMethod::parse(&event.request.method);
                let hit = match routes.lock() {
                    Ok(mut table) => table.handle_request(&url, method),
                    Err(_) => None,
                };

                let Some(hit) = hit else {
                    let params = ContinueRequestParams::new(event.request_id.clone());
                    if let Err(e) = task_page.execute(params).await {
                        debug!(%url, "continue request failed: {}", e);
                    }
                    continue;
                };

                debug!(%url, %method, route = %hit.pattern, "serving mocked route");
                if let Some(notice) = hit.notice {
                    sink.emit(ProbeEvent::RouteNotice(notice));
                }
                let response = hit.response;
                let page = task_page.clone();
                pending.schedule(Duration::from_millis(response.delay_ms), async move {
                    if let Err(e) = fulfill(&page, &event, &response).await {
                        warn!(%url, "fulfilling mocked route failed: {}", e);
                    }
                });
                debug!(pending = pending.len(), "mocked responses in flight");
            }
        }));

        let enable = EnableParams::builder()
            .pattern(RequestPattern::builder().url_pattern("*").build())
            .build();
        page.execute(enable)
            .await
            .map_err(|e| ProbeError::Interception {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> ProbeResult<()> {
        let page = self.page()?;
        debug!(%url, ?timeout, "navigating");
        self.activity.reset();
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(result) => result.map(|_| ()).map_err(|e| ProbeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout {
                ms: timeout.as_millis() as u64,
                waited_for: format!("navigation to {url}"),
            }),
        }
    }

    async fn evaluate(&self, script: &str) -> ProbeResult<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| ProbeError::script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn set_local_storage(&self, key: &str, value: &str) -> ProbeResult<()> {
        let script = format!(
            "localStorage.setItem({}, {})",
            serde_json::to_string(key)?,
            serde_json::to_string(value)?
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> ProbeResult<()> {
        let started = Instant::now();
        let options = WaitOptions::new().with_timeout(timeout.as_millis() as u64);
        let ready = state.ready_states();
        poll_until(options, state.event_name(), move || async move {
            let value = self.evaluate("document.readyState").await?;
            Ok(value
                .as_str()
                .is_some_and(|s| ready.contains(&s))
                .then_some(()))
        })
        .await?;

        if state == LoadState::NetworkIdle {
            self.activity
                .wait_for_idle(options.remaining_since(started))
                .await?;
        }
        Ok(())
    }

    async fn is_visible(&self, selector: &Selector) -> ProbeResult<bool> {
        let value = self.evaluate(&selector.is_visible_script()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()> {
        let options = WaitOptions::new().with_timeout(timeout.as_millis() as u64);
        poll_until(options, selector.as_str(), move || async move {
            Ok(self.is_visible(selector).await?.then_some(()))
        })
        .await
        .map_err(|e| not_found(e, selector, timeout))
    }

    async fn click(&self, selector: &Selector, timeout: Duration) -> ProbeResult<()> {
        let probe = self.actionable(selector, timeout).await?;
        self.page()?
            .click(Point::new(probe.x, probe.y))
            .await
            .map_err(|e| ProbeError::page(format!("click on {selector}: {e}")))?;
        Ok(())
    }

    async fn select_option(
        &self,
        selector: &Selector,
        index: usize,
        timeout: Duration,
    ) -> ProbeResult<()> {
        let body = format!(
            "if (!(el instanceof HTMLSelectElement)) throw new Error('not a <select>'); \
             if (el.options.length <= {index}) return false; \
             el.selectedIndex = {index}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true;"
        );
        self.act(selector, &body, timeout).await
    }

    async fn fill(&self, selector: &Selector, value: &str, timeout: Duration) -> ProbeResult<()> {
        let body = format!(
            "el.focus(); \
             const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
             Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {value}); \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true;",
            value = serde_json::to_string(value)?
        );
        self.act(selector, &body, timeout).await
    }

    async fn form_validity(&self) -> ProbeResult<FormValidity> {
        FormValidity::from_value(self.evaluate(FORM_VALIDITY_JS).await?)
    }

    async fn request_submit(&self) -> ProbeResult<()> {
        self.evaluate(REQUEST_SUBMIT_JS).await?;
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        // evaluation fails while a navigation swaps the document
        match self.evaluate("window.location.href").await {
            Ok(serde_json::Value::String(url)) => Ok(url),
            _ => Ok(self
                .page()?
                .url()
                .await
                .map_err(|e| ProbeError::page(e.to_string()))?
                .unwrap_or_default()),
        }
    }

    async fn wait_for_url(&self, pattern: &UrlPattern, timeout: Duration) -> ProbeResult<()> {
        let options = WaitOptions::new().with_timeout(timeout.as_millis() as u64);
        let waited_for = format!("URL matching {pattern}");
        poll_until(options, &waited_for, move || async move {
            let url = self.current_url().await.ok();
            Ok(url.filter(|u| pattern.matches(u)).map(|_| ()))
        })
        .await
    }

    async fn screenshot(&self, path: &Path) -> ProbeResult<PathBuf> {
        let bytes = self
            .page()?
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| ProbeError::Screenshot {
                message: e.to_string(),
            })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "screenshot written");
        Ok(path.to_path_buf())
    }

    async fn close(&mut self) -> ProbeResult<()> {
        let Some(mut browser) = self.browser.get_mut().take() else {
            return Err(ProbeError::AlreadyClosed);
        };
        self.page = None;

        for task in self.tasks.drain(..) {
            task.abort();
        }
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            debug!("waiting for chromium exit: {}", e);
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!(dir = %self.user_data_dir.display(), "removing profile dir: {}", e);
        }
        info!("chromium closed");

        closed.map(|_| ()).map_err(|e| ProbeError::page(format!("closing browser: {e}")))
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        for task in self.tasks.iter().chain(self.handler.as_ref()) {
            task.abort();
        }
        // chromiumoxide's Browser kills the process when dropped
        if self.browser.get_mut().is_some() {
            warn!("ChromiumDriver dropped without close() - forcing shutdown via Drop");
        }
    }
}
