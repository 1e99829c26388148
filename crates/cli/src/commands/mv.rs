//! mv command - Move or rename within one remote

use clap::Args;
use serde::Serialize;

use super::{connect, parse_target, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct MvArgs {
    /// Node to move (remote:/path)
    pub source: String,

    /// New location on the same remote (remote:/path)
    pub target: String,

    /// Replace the target if it exists
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Serialize)]
struct MvOutput {
    success: bool,
    source: String,
    target: String,
}

pub async fn execute(args: MvArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let target = match parse_target(&args.target) {
        Ok(target) => target,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };
    if let Err(message) = check_same_remote(&args.source, &target.remote) {
        formatter.error(&message);
        return ExitCode::UsageError;
    }
    let (provider, source) = match connect(&args.source, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    match provider.move_item(&source, &target.path, args.force).await {
        Ok(moved) => {
            if formatter.is_json() {
                formatter.json(&MvOutput {
                    success: true,
                    source: source.to_string(),
                    target: moved.to_string(),
                });
            } else {
                formatter.success(&format!("Moved {source} to {moved}"));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, "move", &source, &e),
    }
}

fn check_same_remote(source: &str, target_remote: &str) -> Result<(), String> {
    match source.split_once(':') {
        Some((remote, _)) if remote == target_remote => Ok(()),
        _ => Err(format!(
            "Cannot move between remotes ('{source}' and '{target_remote}:')"
        )),
    }
}
