//! Real-browser runs against a local fixture app.
//!
//! Need a Chromium binary; run with `cargo test --features browser -- --ignored`.

#![cfg(feature = "browser")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use armprobe::{
    mocked_routes, poll_until, ChromiumDriver, ConsoleLevel, FormSubmissionProbe, HttpMethod,
    Observation, ProbeConfig, ProbeDriver, ProbeEvent, RecordingSink, RunOutcome, Selector,
    UrlPattern, WaitOptions, ORDER_ROUTE,
};
use axum::response::Html;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

const FIXTURE: &str = include_str!("fixtures/armature_form.html");

/// Logged by the fixture once the mocked profile arrives
const PROFILE_LINE: &str = "BROWSER CONSOLE: log: user Test User";

/// Serve the fixture for every path, the way an SPA dev server does
async fn serve_fixture() -> String {
    let app = Router::new().fallback(|| async { Html(FIXTURE) });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base_url: &str, artifacts: &std::path::Path) -> ProbeConfig {
    let mut config = ProbeConfig::default()
        .with_base_url(base_url)
        .with_artifacts_dir(artifacts)
        .with_action_timeout(5_000);
    config.network_idle_timeout_ms = 5_000;
    if std::env::var_os("CI").is_some() {
        config = config.with_no_sandbox();
    }
    config
}

#[tokio::test]
#[ignore = "requires Chromium"]
async fn test_order_is_submitted_in_chromium() {
    let base = serve_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let probe = FormSubmissionProbe::new(config(&base, dir.path()), Arc::new(sink.clone()));

    let outcome = probe.run_chromium().await.unwrap();

    assert_eq!(outcome, RunOutcome::Submitted, "lines: {:#?}", sink.lines());
    let lines = sink.lines();
    let submitting = lines.iter().position(|l| l == "Submitting form...").unwrap();
    let notice = lines
        .iter()
        .position(|l| l == "Order submission intercepted!")
        .unwrap();
    assert!(notice > submitting);
    assert!(sink.contains(&ProbeEvent::SubmitTriggered));
    assert!(sink.contains(&ProbeEvent::FormValidity(true)));
    assert!(lines.iter().any(|l| l == PROFILE_LINE), "lines: {lines:#?}");
    let routes = probe.routes();
    let table = routes.lock().unwrap();
    table.assert_served_times(ORDER_ROUTE, 1).unwrap();
    assert_eq!(table.requests_for(ORDER_ROUTE)[0].method, HttpMethod::Post);
}

#[tokio::test]
#[ignore = "requires Chromium"]
async fn test_wrong_header_reports_load_failure() {
    let base = serve_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&base, dir.path());
    config.header_text = "Редактирование заявки".to_string();
    let sink = RecordingSink::new();
    let probe = FormSubmissionProbe::new(config, Arc::new(sink.clone()));

    let outcome = probe.run_chromium().await.unwrap();

    assert!(matches!(outcome, RunOutcome::LoadFailed { screenshot: Some(_) }));
    assert!(dir.path().join("error_load.png").exists());
}

#[tokio::test]
#[ignore = "requires Chromium"]
async fn test_driver_auth_guard_text_selector_and_console() {
    let base = serve_fixture().await;
    let cfg = config(&base, std::path::Path::new("."));
    let sink = RecordingSink::new();
    let mut driver = ChromiumDriver::launch(&cfg.browser, Arc::new(sink.clone()))
        .await
        .unwrap();
    driver
        .install_routes(mocked_routes().shared(), Arc::new(sink.clone()))
        .await
        .unwrap();
    let nav = Duration::from_secs(10);

    driver.goto(&cfg.form_url(), nav).await.unwrap();
    let header = Selector::text(cfg.header_text.clone());
    driver
        .wait_for_url(&UrlPattern::glob("**/login"), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!driver.is_visible(&header).await.unwrap());

    driver.set_local_storage("token", "mock-token").await.unwrap();
    driver.goto(&cfg.form_url(), nav).await.unwrap();
    driver.wait_for_selector(&header, Duration::from_secs(5)).await.unwrap();
    let validity = driver.form_validity().await.unwrap();
    assert!(!validity.valid);
    assert!(validity
        .invalid_fields
        .iter()
        .any(|f| f.id == "unloading_point"));

    let observations = driver.observations();
    let options = WaitOptions::new().with_timeout(5_000);
    poll_until(options, "profile console line", move || async move {
        Ok((observations.console_count(ConsoleLevel::Log) > 0).then_some(()))
    })
    .await
    .unwrap();
    assert!(!observations.is_empty());
    assert!(observations.snapshot().iter().any(|o| matches!(
        o,
        Observation::Console { level: ConsoleLevel::Log, text } if text == "user Test User"
    )));
    assert!(sink.lines().iter().any(|l| l == PROFILE_LINE));

    driver.close().await.unwrap();
}
