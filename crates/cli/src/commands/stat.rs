//! stat command - Show metadata of a file or folder

use clap::Args;

use ca_core::CloudItemMetadata;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct StatArgs {
    /// Node to inspect (remote:/path)
    pub path: String,
}

pub async fn execute(args: StatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let (provider, node) = match connect(&args.path, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    let metadata = match provider.item_metadata(&node).await {
        Ok(metadata) => metadata,
        Err(e) => return report(&formatter, "stat", &node, &e),
    };

    if formatter.is_json() {
        formatter.json(&metadata);
    } else {
        for line in describe(&formatter, &metadata) {
            formatter.println(&line);
        }
    }
    ExitCode::Success
}

fn describe(formatter: &Formatter, metadata: &CloudItemMetadata) -> Vec<String> {
    let mut rows = vec![
        ("Name", metadata.name.clone()),
        ("Path", metadata.path.to_string()),
        ("Type", metadata.item_type.to_string()),
    ];
    if let Some(size) = metadata.size {
        rows.push((
            "Size",
            formatter.style_size(&format!("{} ({size} bytes)", formatter.format_size(size))),
        ));
    }
    if let Some(modified) = metadata.last_modified {
        rows.push(("Modified", formatter.style_date(&formatter.format_date(modified))));
    }

    rows.into_iter()
        .map(|(key, value)| format!("{} {value}", formatter.style_key(&format!("{key:<9}"))))
        .collect()
}
