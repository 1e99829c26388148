//! Remote management commands
//!
//! Remotes are named storage locations: a WebDAV share with its credentials,
//! or a directory on this machine.

use std::path::PathBuf;

use clap::Subcommand;
use comfy_table::{Table, presets};
use serde::Serialize;

use ca_core::{Config, ConfigManager, RemoteConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// Add or update a remote
    Add(AddArgs),

    /// List all configured remotes
    List,

    /// Remove a remote
    Remove(RemoveArgs),
}

/// Arguments for the `remote add` command
#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Remote name (e.g., "nextcloud", "home")
    pub name: String,

    /// WebDAV root URL (`https://cloud.example.com/remote.php/webdav`) or a local directory
    pub location: String,

    /// WebDAV user name
    #[arg(short, long)]
    pub username: Option<String>,

    /// WebDAV password
    #[arg(short, long, env = "CA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    pub name: String,
}

/// Remote information for JSON output (without credentials)
#[derive(Serialize)]
struct RemoteInfo {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    location: String,
}

#[derive(Serialize)]
struct RemoteListOutput {
    remotes: Vec<RemoteInfo>,
}

#[derive(Serialize)]
struct RemoteOperationOutput {
    success: bool,
    remote: String,
    message: String,
}

pub async fn execute(cmd: RemoteCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            formatter.error(&format!("Failed to locate config: {e}"));
            return ExitCode::GeneralError;
        }
    };
    let mut config = match manager.load() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("Failed to load config: {e}"));
            return ExitCode::GeneralError;
        }
    };

    let outcome = match cmd {
        RemoteCommands::Add(args) => {
            if config.remotes.contains_key(&args.name) {
                formatter.warning(&format!("Replacing existing remote '{}'", args.name));
            }
            add(args, &mut config)
        }
        RemoteCommands::List => {
            list(&config, &formatter);
            return ExitCode::Success;
        }
        RemoteCommands::Remove(args) => remove(&args.name, &mut config),
    };

    let (name, message) = match outcome {
        Ok(done) => done,
        Err((code, message)) => {
            formatter.error(&message);
            return code;
        }
    };

    if let Err(e) = manager.save(&config) {
        formatter.error(&format!("Failed to save config: {e}"));
        return ExitCode::GeneralError;
    }

    if formatter.is_json() {
        formatter.json(&RemoteOperationOutput {
            success: true,
            remote: name,
            message,
        });
    } else {
        formatter.success(&message);
    }
    ExitCode::Success
}

type Outcome = Result<(String, String), (ExitCode, String)>;

fn add(args: AddArgs, config: &mut Config) -> Outcome {
    if args.name.is_empty() || args.name.contains(':') {
        return Err((
            ExitCode::UsageError,
            "Remote name must be non-empty and must not contain ':'".to_string(),
        ));
    }

    let remote = build_remote(args.location, args.username, args.password)
        .map_err(|e| (ExitCode::UsageError, e))?;
    let message = format!("Remote '{}' ({}) configured", args.name, remote.kind());
    config.remotes.insert(args.name.clone(), remote);
    Ok((args.name, message))
}

fn remove(name: &str, config: &mut Config) -> Outcome {
    match config.remotes.remove(name) {
        Some(_) => Ok((name.to_string(), format!("Remote '{name}' removed"))),
        None => Err((ExitCode::NotFound, format!("Remote '{name}' not found"))),
    }
}

/// URLs become WebDAV remotes, anything else a local directory
fn build_remote(
    location: String,
    username: Option<String>,
    password: Option<String>,
) -> Result<RemoteConfig, String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let username = username.ok_or("WebDAV remotes need --username")?;
        let password = password.ok_or("WebDAV remotes need --password (or CA_PASSWORD)")?;
        return Ok(RemoteConfig::Webdav {
            url: location,
            username,
            password,
        });
    }

    if location.is_empty() {
        return Err("Location cannot be empty".to_string());
    }
    Ok(RemoteConfig::Local {
        root: PathBuf::from(location),
    })
}

fn list(config: &Config, formatter: &Formatter) {
    let remotes: Vec<RemoteInfo> = config
        .remotes
        .iter()
        .map(|(name, remote)| RemoteInfo {
            name: name.clone(),
            kind: remote.kind(),
            location: remote.location(),
        })
        .collect();

    if formatter.is_json() {
        formatter.json(&RemoteListOutput { remotes });
        return;
    }
    if remotes.is_empty() {
        formatter.println("No remotes configured.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_header(vec!["Name", "Type", "Location"]);
    for remote in &remotes {
        table.add_row(vec![
            formatter.style_name(&remote.name),
            remote.kind.to_string(),
            formatter.style_url(&remote.location),
        ]);
    }
    formatter.println(&table.to_string());
}
