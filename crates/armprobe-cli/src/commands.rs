//! CLI command definitions using clap

use crate::config::ColorChoice;
use crate::error::CliResult;
use crate::output::OutputFormat;
use armprobe::ProbeConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Armprobe: end-to-end probe for the armature order form
#[derive(Parser, Debug)]
#[command(name = "armprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (print failures only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the probe against the web client
    Run(RunArgs),

    /// Print the mocked backend routes
    Routes,

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Settings layered over the defaults and the YAML file
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the web client
    #[arg(long, env = "ARMPROBE_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium executable
    #[arg(long, env = "ARMPROBE_CHROMIUM", value_name = "PATH")]
    pub chromium: Option<PathBuf>,

    /// How long to wait for the /orders redirect
    #[arg(long, value_name = "MS")]
    pub redirect_timeout: Option<u64>,

    /// How long each page navigation may take
    #[arg(long, value_name = "MS")]
    pub navigation_timeout: Option<u64>,

    /// Directory for failure screenshots
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Defaults, then the YAML file, then environment and flags
    pub fn resolve(&self) -> CliResult<ProbeConfig> {
        let mut config = match self.config {
            Some(ref path) => ProbeConfig::load(path)?,
            None => ProbeConfig::default(),
        };
        if let Some(ref url) = self.base_url {
            config = config.with_base_url(url.clone());
        }
        if self.headed {
            config = config.with_headless(false);
        }
        if self.no_sandbox {
            config = config.with_no_sandbox();
        }
        if let Some(ref path) = self.chromium {
            config = config.with_chromium_path(path.clone());
        }
        if let Some(ms) = self.redirect_timeout {
            config = config.with_redirect_timeout(ms);
        }
        if let Some(ms) = self.navigation_timeout {
            config = config.with_navigation_timeout(ms);
        }
        if let Some(ref dir) = self.artifacts {
            config = config.with_artifacts_dir(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration sources
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Exit non-zero when the page does not load or the redirect never happens
    #[arg(long)]
    pub fail_on_error: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration sources
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Output format
    #[arg(long, value_enum, default_value = "yaml")]
    pub format: FormatArg,
}

/// Format argument for the config command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// YAML
    #[default]
    Yaml,
    /// JSON
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => Self::Yaml,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
