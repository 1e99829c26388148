//! ca-core: Core library for cloud-access
//!
//! This crate provides the backend-independent pieces shared by every
//! storage provider:
//! - The `CloudProvider` trait and its metadata types
//! - Virtual path parsing (`CloudPath`)
//! - The error taxonomy callers match on
//! - Progress reporting for streamed reads and writes
//! - Configuration management
//!
//! Backends (WebDAV, local filesystem) live in their own crates and only
//! depend on this one, so callers can swap them without touching their code.

pub mod config;
pub mod error;
pub mod path;
pub mod progress;
pub mod traits;

pub use config::{Config, ConfigManager, NetworkTimeouts, RemoteConfig};
pub use error::{Error, Result};
pub use path::CloudPath;
pub use progress::{NoProgress, ProgressListener, ProgressReader, no_progress};
pub use traits::{ByteStream, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider};
