//! `liveedit check`: validate config and toolchain without serving.

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::compile::CommandCompiler;
use crate::config::MonitorConfig;
use crate::log;

pub fn run(config: &MonitorConfig) -> Result<()> {
    if config.config_path.exists() {
        log!("config"; "{} is valid", config.config_path.display());
    } else {
        log!("config"; "{} not found, using defaults", config.config_path.display());
    }

    match CommandCompiler::from_config(config) {
        Some(compiler) => {
            let program = compiler.resolve()?;
            log!("compile"; "{}", program.display());
        }
        None => log!("warning"; "no compiler command configured, serve will refuse to start"),
    }

    eprintln!("\n{}", "effective settings:".dimmed());
    eprintln!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
