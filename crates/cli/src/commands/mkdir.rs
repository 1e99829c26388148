//! mkdir command - Create a folder

use clap::Args;
use serde::Serialize;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Folder to create (remote:/path)
    pub path: String,
}

#[derive(Serialize)]
struct MkdirOutput {
    success: bool,
    path: String,
}

pub async fn execute(args: MkdirArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let (provider, folder) = match connect(&args.path, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    match provider.create_folder(&folder).await {
        Ok(created) => {
            if formatter.is_json() {
                formatter.json(&MkdirOutput {
                    success: true,
                    path: created.to_string(),
                });
            } else {
                formatter.success(&format!(
                    "Created folder {}",
                    formatter.style_dir(created.as_str())
                ));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, "create", &folder, &e),
    }
}
