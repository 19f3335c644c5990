//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Push function edits into running apps without restarting them
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: liveedit.toml)
    #[arg(short = 'C', long, global = true, default_value = "liveedit.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Accept agents, read edits from stdin and push patches
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Validate the config and the compiler setup
    #[command(visible_alias = "c")]
    Check,
}

/// Serve command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Application id of the running app to patch (e.g. com.example.app)
    #[arg(short, long)]
    pub app: String,

    /// Network interface for the agent server (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long)]
    pub interface: Option<IpAddr>,

    /// Agent server port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["liveedit", "-v", "serve", "--app", "com.example", "-p", "9000"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("liveedit.toml"));
        match cli.command {
            Commands::Serve { args } => {
                assert_eq!(args.app, "com.example");
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.interface, None);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_serve_requires_app() {
        assert!(Cli::try_parse_from(["liveedit", "serve"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["liveedit", "check", "-C", "other.toml"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
