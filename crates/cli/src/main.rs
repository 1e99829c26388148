//! ca - command-line access to WebDAV shares and local folders

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use commands::Commands;
use exit_code::ExitCode;
use output::OutputConfig;

#[derive(Parser, Debug)]
#[command(name = "ca", version, about = "Browse and transfer files on WebDAV and local remotes")]
struct Cli {
    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log requests and responses to stderr (overrides RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install log subscriber")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.debug) {
        eprintln!("{e:#}");
        std::process::exit(ExitCode::GeneralError.as_i32());
    }

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };

    let code = commands::execute(cli.command, output_config).await;
    std::process::exit(code.as_i32());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ca", "ls", "home:/", "--json", "-r"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Ls(ref args) if args.recursive));
    }

    #[test]
    fn test_cat_range_flags() {
        let cli =
            Cli::try_parse_from(["ca", "cat", "dav:/About.txt", "--offset", "4", "--length", "3"])
                .unwrap();
        let Commands::Cat(args) = cli.command else {
            panic!("expected cat");
        };
        assert_eq!(args.offset, Some(4));
        assert_eq!(args.length, Some(3));
    }
}
