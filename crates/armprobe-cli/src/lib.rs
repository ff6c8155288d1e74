//! Armprobe CLI Library
//!
//! Command-line interface for the armature order probe.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, ConfigOverrides, FormatArg, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_routes, ConsoleSink, OutputFormat};
