//! Subcommand handlers

use crate::commands::{ConfigArgs, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{render_routes, OutputFormat};
use armprobe::{mocked_routes, ProbeConfig, RunOutcome};

/// `armprobe run`
#[cfg(feature = "browser")]
pub fn run_probe(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    use crate::output::ConsoleSink;
    use armprobe::FormSubmissionProbe;
    use std::io::IsTerminal;
    use std::sync::Arc;

    let probe_config = args.overrides.resolve()?;
    tracing::info!(
        base_url = %probe_config.base_url,
        headless = probe_config.browser.headless,
        "starting probe"
    );

    let mut sink = ConsoleSink::new(config.color.should_color(), config.verbosity.is_quiet());
    if std::io::stderr().is_terminal() {
        sink = sink.with_spinner();
    }
    let probe = FormSubmissionProbe::new(probe_config, Arc::new(sink));

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create async runtime: {e}")))?;
    let outcome = rt.block_on(probe.run_chromium())?;
    check_outcome(&outcome, args.fail_on_error)
}

/// `armprobe run` without browser support
#[cfg(not(feature = "browser"))]
pub fn run_probe(_config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    args.overrides.resolve()?;
    Err(CliError::config(
        "Browser support not enabled. Rebuild with --features browser",
    ))
}

/// Map a reported outcome to the exit status
pub fn check_outcome(outcome: &RunOutcome, fail_on_error: bool) -> CliResult<()> {
    if fail_on_error && !outcome.is_success() {
        return Err(CliError::probe_failed(outcome.to_string()));
    }
    Ok(())
}

/// `armprobe routes`
pub fn run_routes() {
    print!("{}", render_routes(&mocked_routes()));
}

/// `armprobe config`
pub fn run_config(args: &ConfigArgs) -> CliResult<()> {
    let config = args.overrides.resolve()?;
    print!("{}", render_config(&config, args.format.into())?);
    Ok(())
}

/// Effective configuration in the requested format
pub fn render_config(config: &ProbeConfig, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Yaml => Ok(config.to_yaml()?),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)? + "\n"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_reported_failures_pass_by_default() {
            let outcome = RunOutcome::LoadFailed { screenshot: None };
            assert!(check_outcome(&outcome, false).is_ok());
        }

        #[test]
        fn test_fail_on_error() {
            assert!(check_outcome(&RunOutcome::Submitted, true).is_ok());
            let outcome = RunOutcome::SubmitFailed {
                current_url: "http://localhost:5173/create-order/armature".into(),
                screenshot: Some(PathBuf::from("error_submit.png")),
            };
            let err = check_outcome(&outcome, true).unwrap_err();
            assert!(matches!(err, CliError::ProbeFailed { .. }));
            assert!(err.to_string().contains("create-order/armature"));
        }
    }

    mod render_config_tests {
        use super::*;

        #[test]
        fn test_yaml_loads_back() {
            let config = ProbeConfig::default().with_redirect_timeout(1234);
            let yaml = render_config(&config, OutputFormat::Yaml).unwrap();
            let loaded = ProbeConfig::from_yaml(&yaml).unwrap();
            assert_eq!(loaded.redirect_timeout_ms, 1234);
        }

        #[test]
        fn test_json() {
            let json = render_config(&ProbeConfig::default(), OutputFormat::Json).unwrap();
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["base_url"], armprobe::DEFAULT_BASE_URL);
            assert_eq!(value["token_key"], "token");
        }
    }
}
