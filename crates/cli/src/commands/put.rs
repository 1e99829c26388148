//! put command - Upload a local file

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use ca_core::{ByteStream, ProgressListener};

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination (remote:/path)
    pub target: String,

    /// Replace the destination if it exists
    #[arg(short, long)]
    pub force: bool,
}

pub async fn execute(args: PutArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let file = match tokio::fs::File::open(&args.source).await {
        Ok(file) => file,
        Err(e) => {
            formatter.error(&format!("Cannot open {}: {e}", args.source.display()));
            return ExitCode::GeneralError;
        }
    };
    let total = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            formatter.error(&format!("Cannot stat {}: {e}", args.source.display()));
            return ExitCode::GeneralError;
        }
    };

    let (provider, target) = match connect(&args.target, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    let bar = transfer_bar(total, !formatter.is_json() && !formatter.is_quiet());
    let listener: Arc<dyn ProgressListener> = {
        let bar = bar.clone();
        Arc::new(move |bytes: u64| bar.set_position(bytes))
    };
    let data: ByteStream = Box::pin(file);

    let metadata = match provider.write(&target, args.force, data, listener).await {
        Ok(metadata) => metadata,
        Err(e) => {
            bar.abandon();
            return report(&formatter, "upload to", &target, &e);
        }
    };
    bar.finish_and_clear();

    if formatter.is_json() {
        formatter.json(&metadata);
    } else {
        let size = metadata.size.unwrap_or(total);
        formatter.success(&format!(
            "Uploaded {} to {} ({})",
            args.source.display(),
            formatter.style_name(metadata.path.as_str()),
            formatter.format_size(size)
        ));
    }
    ExitCode::Success
}

fn transfer_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
