//! rm command - Delete a file or folder

use clap::Args;
use serde::Serialize;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Node to delete (remote:/path); folders go with their contents
    pub path: String,
}

#[derive(Serialize)]
struct RmOutput {
    success: bool,
    path: String,
}

pub async fn execute(args: RmArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let (provider, node) = match connect(&args.path, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    if node.is_root() {
        formatter.error("Refusing to delete the remote root");
        return ExitCode::UsageError;
    }

    match provider.delete(&node).await {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&RmOutput {
                    success: true,
                    path: node.to_string(),
                });
            } else {
                formatter.success(&format!("Removed {node}"));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, "delete", &node, &e),
    }
}
