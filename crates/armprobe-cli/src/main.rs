//! Armprobe CLI: drive the armature order form in a headless browser
//!
//! ## Usage
//!
//! ```bash
//! armprobe run                                # probe http://localhost:5173
//! armprobe run --base-url http://host:4173    # another dev server
//! armprobe run --config armprobe.yaml --headed
//! armprobe routes                             # show mocked backend routes
//! armprobe config --format json               # effective configuration
//! ```

use armprobe_cli::{
    handlers, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init_tracing(config.verbosity);

    match cli.command {
        Commands::Run(args) => handlers::run_probe(&config, &args),
        Commands::Routes => {
            handlers::run_routes();
            Ok(())
        }
        Commands::Config(args) => handlers::run_config(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
