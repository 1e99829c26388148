//! check command - Verify that a remote answers and accepts the credentials

use clap::Args;
use serde::Serialize;

use ca_core::CloudPath;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Remote to check (remote: or remote:/path)
    pub remote: String,
}

#[derive(Serialize)]
struct CheckOutput {
    reachable: bool,
    remote: String,
    entries: usize,
}

pub async fn execute(args: CheckArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = if args.remote.contains(':') {
        args.remote.clone()
    } else {
        format!("{}:", args.remote)
    };

    // opening a WebDAV remote already runs the OPTIONS and PROPFIND checks
    let (provider, _) = match connect(&target, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    let root = CloudPath::root();
    let listing = match provider.list(&root, None).await {
        Ok(listing) => listing,
        Err(e) => return report(&formatter, "list", &root, &e),
    };

    let name = target.split_once(':').map_or(target.as_str(), |(name, _)| name);
    if formatter.is_json() {
        formatter.json(&CheckOutput {
            reachable: true,
            remote: name.to_string(),
            entries: listing.len(),
        });
    } else {
        formatter.success(&format!(
            "Remote '{}' is reachable ({} entries at the root)",
            formatter.style_name(name),
            listing.len()
        ));
    }
    ExitCode::Success
}
