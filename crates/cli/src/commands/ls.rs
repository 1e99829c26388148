//! ls command - List a folder

use clap::Args;

use ca_core::{CloudItemList, CloudItemMetadata};

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Folder to list (remote:/path)
    pub path: String,

    /// Include every descendant, not just immediate children
    #[arg(short, long)]
    pub recursive: bool,
}

pub async fn execute(args: LsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let (provider, folder) = match connect(&args.path, &formatter).await {
        Ok(connected) => connected,
        Err(code) => return code,
    };

    let mut items = Vec::new();
    let mut page_token: Option<String> = None;
    // follow page tokens until the backend stops handing them out
    loop {
        let page = if args.recursive {
            provider.list_exhaustively(&folder).await
        } else {
            provider.list(&folder, page_token.as_deref()).await
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => return report(&formatter, "list", &folder, &e),
        };

        let CloudItemList {
            items: page_items,
            next_page_token,
        } = page;
        items.extend(page_items);
        match next_page_token {
            Some(token) if !args.recursive => page_token = Some(token),
            _ => break,
        }
    }

    let listing = CloudItemList::new(items);
    if formatter.is_json() {
        formatter.json(&listing);
        return ExitCode::Success;
    }

    for item in &listing.items {
        formatter.println(&format_entry(&formatter, item, args.recursive));
    }
    ExitCode::Success
}

/// `[date] size name`, folders marked with a trailing slash
fn format_entry(formatter: &Formatter, item: &CloudItemMetadata, full_path: bool) -> String {
    let date = item
        .last_modified
        .map(|ts| formatter.format_date(ts))
        .unwrap_or_default();
    let size = if item.is_folder() {
        String::new()
    } else {
        item.size.map(|s| formatter.format_size(s)).unwrap_or_default()
    };
    let label = if full_path {
        item.path.as_str()
    } else {
        item.name.as_str()
    };
    let name = if item.is_folder() {
        formatter.style_dir(&format!("{label}/"))
    } else {
        formatter.style_file(label)
    };

    format!(
        "[{}] {} {name}",
        formatter.style_date(&format!("{date:<19}")),
        formatter.style_size(&format!("{size:>10}")),
    )
}
