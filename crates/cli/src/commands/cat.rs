//! cat command - Print a file to stdout

use clap::Args;

use ca_core::no_progress;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct CatArgs {
    /// File to print (remote:/path)
    pub path: String,

    /// First byte to print
    #[arg(long)]
    pub offset: Option<u64>,

    /// Number of bytes to print
    #[arg(long)]
    pub length: Option<u64>,
}

pub async fn execute(args: CatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let (provider, file) = match connect(&args.path, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    let stream = match byte_range(args.offset, args.length) {
        None => provider.read(&file, no_progress()).await,
        Some((offset, count)) => provider.read_range(&file, offset, count, no_progress()).await,
    };
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => return report(&formatter, "read", &file, &e),
    };

    let mut stdout = tokio::io::stdout();
    if let Err(e) = tokio::io::copy(&mut stream, &mut stdout).await {
        formatter.error(&format!("Failed to read {file}: {e}"));
        return ExitCode::NetworkError;
    }
    ExitCode::Success
}

/// Range to request, `None` for the whole file
fn byte_range(offset: Option<u64>, length: Option<u64>) -> Option<(u64, u64)> {
    match (offset, length) {
        (None, None) => None,
        (offset, length) => Some((offset.unwrap_or(0), length.unwrap_or(u64::MAX))),
    }
}
