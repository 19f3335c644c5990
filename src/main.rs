//! liveedit - hot-patch deployment coordinator.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use liveedit::cli::{self, Cli, Commands};
use liveedit::config::{ConfigHandle, MonitorConfig};
use liveedit::logger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = MonitorConfig::load(&cli.config)?;

    match &cli.command {
        Commands::Serve { args } => cli::serve::run(args, ConfigHandle::new(config)),
        Commands::Check => cli::check::run(&config),
    }
}
