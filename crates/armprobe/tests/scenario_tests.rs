//! Scenario behaviour against the scripted driver.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use armprobe::{
    armature_order_steps, mocked_routes, FormSubmissionProbe, FormValidity, HttpMethod,
    InvalidField, MockDriver, MockPage, ProbeConfig, ProbeError, ProbeEvent, RecordingSink,
    RunOutcome, Selector, CURRENT_USER_BODY, CURRENT_USER_ROUTE, ORDER_ROUTE, UNKNOWN_URL,
};
use std::path::Path;
use std::sync::Arc;

const APP: &str = "http://localhost:5173";

fn header_selector(config: &ProbeConfig) -> String {
    Selector::text(config.header_text.clone()).to_string()
}

fn armature_page(config: &ProbeConfig) -> MockPage {
    let selectors = armature_order_steps()
        .iter()
        .filter_map(|s| s.selector())
        .map(str::to_string)
        .chain([header_selector(config)])
        .collect::<Vec<_>>();
    MockPage::new()
        .with_selectors(selectors)
        .with_validity(FormValidity::valid())
        .with_submit(
            HttpMethod::Post,
            format!("{APP}/api/orders"),
            format!("{APP}/orders"),
        )
        .with_auth_guard("token", format!("{APP}/login"))
}

fn test_config(artifacts: &Path) -> ProbeConfig {
    ProbeConfig::default()
        .with_artifacts_dir(artifacts)
        .with_action_timeout(50)
}

fn probe(config: ProbeConfig) -> (FormSubmissionProbe, RecordingSink) {
    let sink = RecordingSink::new();
    (FormSubmissionProbe::new(config, Arc::new(sink.clone())), sink)
}

mod happy_path_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_run_prints_every_line_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config));
        let (probe, sink) = probe(config);

        let outcome = probe.run(&mut driver).await.unwrap();

        assert_eq!(outcome, RunOutcome::Submitted);
        assert_eq!(
            sink.lines(),
            vec![
                "Navigating to app...",
                "Navigating to Create Armature Order...",
                "✅ Page Loaded",
                "Filling form...",
                "Toggling Self-Pickup...",
                "✅ Carrier selected",
                "✅ Specification selected",
                "✅ Product Added",
                "Submitting form...",
                "Form Validity: true",
                "Order submission intercepted!",
                "JS Submit triggered",
                "✅ Successfully redirected to /orders",
            ]
        );
        assert_eq!(driver.close_calls(), 1);
        assert!(!dir.path().join("error_load.png").exists());
        assert!(!dir.path().join("error_submit.png").exists());
    }

    #[tokio::test]
    async fn test_form_is_populated_as_specified() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config));
        let (probe, _sink) = probe(config);

        probe.run(&mut driver).await.unwrap();

        assert_eq!(driver.value_of("select >> nth=0").as_deref(), Some("1"));
        assert_eq!(driver.value_of("select >> nth=1").as_deref(), Some("1"));
        assert_eq!(driver.value_of("select >> nth=5").as_deref(), Some("1"));
        assert_eq!(driver.value_of("input[type='number']").as_deref(), Some("10"));
        assert!(driver.was_called("click:input[id='is_pickup']"));
        assert!(driver.was_called("wait_for_selector:ul[role='listbox']"));
        assert!(driver.was_called("wait_for_selector:text=Доступно к заказу"));
    }

    #[tokio::test]
    async fn test_token_is_injected_before_form_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config));
        let (probe, sink) = probe(config);

        probe.run(&mut driver).await.unwrap();

        let history = driver.history();
        let pos = |prefix: &str| history.iter().position(|c| c.starts_with(prefix)).unwrap();
        assert!(pos("goto:http://localhost:5173/") < pos("set_local_storage:token=mock-token"));
        assert!(
            pos("set_local_storage:token=mock-token")
                < pos("goto:http://localhost:5173/create-order/armature")
        );
        assert_eq!(driver.local_storage("token").as_deref(), Some("mock-token"));
        assert!(sink.contains(&ProbeEvent::PageLoaded));
    }

    #[tokio::test]
    async fn test_exactly_one_order_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config));
        let (probe, _sink) = probe(config);

        probe.run(&mut driver).await.unwrap();

        let routes = probe.routes();
        let table = routes.lock().unwrap();
        table.assert_served_times(ORDER_ROUTE, 1).unwrap();
        let served = table.requests_for(ORDER_ROUTE);
        assert_eq!(served[0].method, HttpMethod::Post);
        assert!(served[0].url.contains("/orders"));
    }

    #[tokio::test]
    async fn test_busy_network_does_not_block_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config).with_busy_network());
        let (probe, sink) = probe(config);

        let outcome = probe.run(&mut driver).await.unwrap();

        assert!(outcome.is_success());
        assert!(sink.contains(&ProbeEvent::PageLoaded));
    }
}

mod route_tests {
    use super::*;

    #[test]
    fn test_current_user_payload_for_any_method() {
        let mut table = mocked_routes();
        for method in [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
        ] {
            let hit = table
                .handle_request("http://localhost:5173/api/me", method)
                .unwrap();
            assert_eq!(hit.response.status, 200);
            assert_eq!(hit.response.body, CURRENT_USER_BODY);
            assert_eq!(hit.pattern, CURRENT_USER_ROUTE);
        }
    }

    #[test]
    fn test_unmocked_requests_pass_through() {
        let mut table = mocked_routes();
        assert!(table
            .handle_request("http://localhost:5173/api/catalog", HttpMethod::Get)
            .is_none());
    }
}

mod load_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_header_exits_early_with_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let header = header_selector(&config);
        let mut driver = MockDriver::new(armature_page(&config).without_selector(&header));
        let (probe, sink) = probe(config);

        let outcome = probe.run(&mut driver).await.unwrap();

        let shot = dir.path().join("error_load.png");
        assert_eq!(
            outcome,
            RunOutcome::LoadFailed {
                screenshot: Some(shot.clone())
            }
        );
        assert!(shot.exists());
        assert_eq!(sink.lines().last().unwrap(), "❌ Page Load Failed");
        assert!(!sink.contains(&ProbeEvent::FillingForm));
        assert!(!driver.was_called("select_option"));
        assert!(!driver.was_called("click"));
        assert!(!driver.was_called("fill"));
        assert!(!driver.was_called("request_submit"));
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_lands_on_login() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let page = armature_page(&config);
        config.token_key = "session".to_string();
        let mut driver = MockDriver::new(page);
        let (probe, sink) = probe(config);

        let outcome = probe.run(&mut driver).await.unwrap();

        assert!(matches!(outcome, RunOutcome::LoadFailed { .. }));
        assert!(sink.contains(&ProbeEvent::PageLoadFailed));
    }

    #[tokio::test]
    async fn test_screenshot_failure_does_not_mask_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let header = header_selector(&config);
        let mut driver = MockDriver::new(armature_page(&config).without_selector(&header))
            .with_failing_screenshots();
        let (probe, _sink) = probe(config);

        let outcome = probe.run(&mut driver).await.unwrap();

        assert_eq!(outcome, RunOutcome::LoadFailed { screenshot: None });
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_nested_artifacts_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("latest");
        let config = test_config(&nested);
        let header = header_selector(&config);
        let mut driver = MockDriver::new(armature_page(&config).without_selector(&header));
        let (probe, _sink) = probe(config);

        probe.run(&mut driver).await.unwrap();

        assert!(nested.join("error_load.png").exists());
    }
}

mod submit_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_delayed_order_route_reports_current_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path()).with_redirect_timeout(50);
        let mut driver = MockDriver::new(armature_page(&config));
        let mut routes = mocked_routes();
        let order = routes.route_mut(ORDER_ROUTE).unwrap();
        order.response.delay_ms = 10_000;
        let sink = RecordingSink::new();
        let probe = FormSubmissionProbe::with_routes(config, Arc::new(sink.clone()), routes);

        let outcome = probe.run(&mut driver).await.unwrap();

        let form_url = "http://localhost:5173/create-order/armature";
        let shot = dir.path().join("error_submit.png");
        assert_eq!(
            outcome,
            RunOutcome::SubmitFailed {
                current_url: form_url.to_string(),
                screenshot: Some(shot.clone()),
            }
        );
        let lines = sink.lines();
        let tail = &lines[lines.len() - 2..];
        assert_eq!(tail[0], "❌ Redirect failed");
        assert_eq!(tail[1], format!("Current URL: {form_url}"));
        assert!(shot.exists());
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_url_still_reports_and_captures() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path()).with_redirect_timeout(50);
        let mut driver = MockDriver::new(armature_page(&config)).with_failing_current_url();
        let mut routes = mocked_routes();
        routes.route_mut(ORDER_ROUTE).unwrap().response.delay_ms = 10_000;
        let sink = RecordingSink::new();
        let probe = FormSubmissionProbe::with_routes(config, Arc::new(sink.clone()), routes);

        let outcome = probe.run(&mut driver).await.unwrap();

        let shot = dir.path().join("error_submit.png");
        assert_eq!(
            outcome,
            RunOutcome::SubmitFailed {
                current_url: UNKNOWN_URL.to_string(),
                screenshot: Some(shot.clone()),
            }
        );
        let lines = sink.lines();
        let tail = &lines[lines.len() - 2..];
        assert_eq!(tail[0], "❌ Redirect failed");
        assert_eq!(tail[1], format!("Current URL: {UNKNOWN_URL}"));
        assert!(shot.exists());
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_form_is_still_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let field = InvalidField {
            tag: "SELECT".into(),
            id: "unloading_point".into(),
            validation_message: "Please select an item in the list.".into(),
            ..InvalidField::default()
        };
        let page = armature_page(&config).with_validity(FormValidity::invalid(vec![field]));
        let mut driver = MockDriver::new(page);
        let (probe, sink) = probe(config);

        probe.run(&mut driver).await.unwrap();

        let lines = sink.lines();
        assert!(lines.contains(&"Form Validity: false".to_string()));
        let invalid = lines
            .iter()
            .find(|l| l.starts_with("INVALID FIELDS: "))
            .unwrap();
        assert!(invalid.contains("unloading_point"));
        assert!(driver.was_called("request_submit"));
        assert!(sink.contains(&ProbeEvent::SubmitTriggered));
    }
}

mod step_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_element_fails_step_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config).without_selector("select >> nth=5"));
        let (probe, sink) = probe(config);

        let err = probe.run(&mut driver).await.unwrap_err();

        match &err {
            ProbeError::Step { step, source } => {
                assert!(step.contains("unloading point"));
                assert!(matches!(
                    **source,
                    ProbeError::ElementNotFound { ms: 50, .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_timeout());
        assert!(sink.contains(&ProbeEvent::CarrierSelected));
        assert!(!sink.contains(&ProbeEvent::SpecificationSelected));
        assert!(!driver.was_called("request_submit"));
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_stalled_navigation_times_out_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path()).with_navigation_timeout(25);
        let page = armature_page(&config).with_stalled_navigation(config.form_url());
        let mut driver = MockDriver::new(page);
        let (probe, sink) = probe(config);

        let err = probe.run(&mut driver).await.unwrap_err();

        match &err {
            ProbeError::Step { step, source } => {
                assert_eq!(step, "open order form");
                assert!(matches!(**source, ProbeError::Timeout { ms: 25, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.contains(&ProbeEvent::NavigatingToForm));
        assert!(!driver.was_called("wait_for_load_state"));
        assert_eq!(driver.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_already_closed_driver_surfaces_error() {
        use armprobe::ProbeDriver;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut driver = MockDriver::new(armature_page(&config));
        driver.close().await.unwrap();
        let (probe, _sink) = probe(config);

        let err = probe.run(&mut driver).await.unwrap_err();

        assert!(matches!(
            err,
            ProbeError::Step { ref source, .. } if matches!(**source, ProbeError::AlreadyClosed)
        ));
    }
}
