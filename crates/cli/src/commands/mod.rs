//! Command implementations
//!
//! Each command parses its `remote:/path` arguments, opens the provider behind
//! the named remote and maps provider failures onto an [`ExitCode`].

use clap::Subcommand;

use ca_core::{CloudPath, CloudProvider, Config, ConfigManager, RemoteConfig};
use ca_localfs::LocalFsCloudProvider;
use ca_webdav::{WebDavCloudProvider, WebDavCredential};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
mod check;
mod ls;
mod mkdir;
mod mv;
mod put;
mod remote;
mod rm;
mod stat;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configured remotes
    #[command(subcommand)]
    Remote(remote::RemoteCommands),

    /// List a folder
    Ls(ls::LsArgs),

    /// Show metadata of a file or folder
    Stat(stat::StatArgs),

    /// Print a file, or a byte range of it, to stdout
    Cat(cat::CatArgs),

    /// Upload a local file
    Put(put::PutArgs),

    /// Create a folder
    Mkdir(mkdir::MkdirArgs),

    /// Delete a file or folder
    Rm(rm::RmArgs),

    /// Move or rename a file or folder
    Mv(mv::MvArgs),

    /// Check that a remote is reachable and the credentials work
    Check(check::CheckArgs),
}

pub async fn execute(command: Commands, output_config: OutputConfig) -> ExitCode {
    match command {
        Commands::Remote(cmd) => remote::execute(cmd, output_config).await,
        Commands::Ls(args) => ls::execute(args, output_config).await,
        Commands::Stat(args) => stat::execute(args, output_config).await,
        Commands::Cat(args) => cat::execute(args, output_config).await,
        Commands::Put(args) => put::execute(args, output_config).await,
        Commands::Mkdir(args) => mkdir::execute(args, output_config).await,
        Commands::Rm(args) => rm::execute(args, output_config).await,
        Commands::Mv(args) => mv::execute(args, output_config).await,
        Commands::Check(args) => check::execute(args, output_config).await,
    }
}

/// A `remote:/path` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub remote: String,
    pub path: CloudPath,
}

/// Split `remote:/path`; a bare `remote:` addresses the root
pub fn parse_target(raw: &str) -> Result<RemoteTarget, String> {
    let Some((remote, path)) = raw.split_once(':') else {
        return Err(format!("Expected remote:/path, got '{raw}'"));
    };
    if remote.is_empty() {
        return Err("Remote name is required (remote:/path)".to_string());
    }

    let path = CloudPath::new(path).map_err(|e| e.to_string())?;
    Ok(RemoteTarget {
        remote: remote.to_string(),
        path,
    })
}

/// Build the provider a remote points at
///
/// WebDAV remotes are checked for compatibility and credentials on the way.
pub async fn open_remote(
    remote: &RemoteConfig,
    config: &Config,
) -> ca_core::Result<Box<dyn CloudProvider>> {
    match remote {
        RemoteConfig::Webdav {
            url,
            username,
            password,
        } => {
            let credential = WebDavCredential::from_url(url, username, password)?;
            let provider = WebDavCloudProvider::connect(&credential, &config.timeouts).await?;
            Ok(Box::new(provider))
        }
        RemoteConfig::Local { root } => Ok(Box::new(LocalFsCloudProvider::new(root.clone()))),
    }
}

/// Parse a target and open its remote, reporting failures through `formatter`
pub async fn connect(
    raw: &str,
    formatter: &Formatter,
) -> Result<(Box<dyn CloudProvider>, CloudPath), ExitCode> {
    let target = parse_target(raw).map_err(|e| {
        formatter.error(&e);
        ExitCode::UsageError
    })?;

    let config = ConfigManager::new()
        .and_then(|manager| manager.load())
        .map_err(|e| {
            formatter.error(&format!("Failed to load config: {e}"));
            ExitCode::GeneralError
        })?;

    let remote = config.remote(&target.remote).map_err(|e| {
        formatter.error(&e.to_string());
        ExitCode::NotFound
    })?;

    tracing::debug!(remote = %target.remote, kind = remote.kind(), "Opening remote");
    let provider = open_remote(remote, &config).await.map_err(|e| {
        formatter.error(&format!("Cannot open remote '{}': {e}", target.remote));
        ExitCode::from_error(&e)
    })?;

    Ok((provider, target.path))
}

/// Report a failed provider call
pub fn report(
    formatter: &Formatter,
    action: &str,
    path: &CloudPath,
    error: &ca_core::Error,
) -> ExitCode {
    formatter.error(&format!("Failed to {action} {path}: {error}"));
    ExitCode::from_error(error)
}
