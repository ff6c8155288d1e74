//! Output formatting and progress reporting

use armprobe::{EventStatus, ProbeEvent, ProbeSink, RouteTable};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Format for `armprobe config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// YAML, loadable with `--config`
    #[default]
    Yaml,
    /// JSON
    Json,
}

/// Prints probe lines to stdout and shows the current step on a spinner.
///
/// The spinner draws on stderr and is suspended while a line is written, so
/// stdout carries exactly the probe's lines.
#[derive(Debug)]
pub struct ConsoleSink {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode: failures only
    pub quiet: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl ConsoleSink {
    /// Create a sink without a spinner
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Show a step spinner on stderr; ignored in quiet mode
    #[must_use]
    pub fn with_spinner(mut self) -> Self {
        if self.quiet {
            return self;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
        self
    }

    /// Whether a spinner is attached
    #[must_use]
    pub const fn has_spinner(&self) -> bool {
        self.spinner.is_some()
    }

    /// Whether `event` is printed at all
    #[must_use]
    pub fn should_print(&self, event: &ProbeEvent) -> bool {
        !self.quiet || event.is_failure()
    }

    /// The line for `event`, styled when colors are on
    #[must_use]
    pub fn format_line(&self, event: &ProbeEvent) -> String {
        let line = event.to_string();
        if !self.use_color {
            return line;
        }
        match event.status() {
            EventStatus::Pass => style(line).green().to_string(),
            EventStatus::Fail => style(line).red().bold().to_string(),
            EventStatus::Observed => style(line).dim().to_string(),
            EventStatus::Info => line,
        }
    }

    fn write_line(&self, line: &str) {
        let _ = self.term.write_line(line);
    }
}

impl ProbeSink for ConsoleSink {
    fn emit(&self, event: ProbeEvent) {
        if !self.should_print(&event) {
            return;
        }
        let line = self.format_line(&event);
        match self.spinner {
            Some(ref pb) => pb.suspend(|| self.write_line(&line)),
            None => self.write_line(&line),
        }
    }

    fn step(&self, description: &str) {
        if let Some(ref pb) = self.spinner {
            pb.set_message(description.to_string());
        }
    }

    fn finish(&self) {
        if let Some(ref pb) = self.spinner {
            pb.finish_and_clear();
        }
    }
}

/// Mocked route table as a plain-text listing
#[must_use]
pub fn render_routes(table: &RouteTable) -> String {
    let mut out = String::new();
    for route in table.routes() {
        let response = &route.response;
        let _ = writeln!(out, "{} {}", route.method, route.pattern);
        let _ = writeln!(out, "  status:       {}", response.status);
        let _ = writeln!(
            out,
            "  content-type: {}",
            response.content_type.as_deref().unwrap_or("(none)")
        );
        let _ = writeln!(out, "  body:         {}", response.body);
        if let Some(ref notice) = route.notice {
            let _ = writeln!(out, "  notice:       {notice}");
        }
    }
    out
}
