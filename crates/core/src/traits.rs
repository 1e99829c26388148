//! Core traits for cloud storage operations
//!
//! These traits define the interface for interacting with a storage backend.
//! They allow for different implementations (WebDAV, local filesystem, test
//! doubles) behind one API.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::path::CloudPath;
use crate::progress::ProgressListener;

/// Byte stream handed out by `read` and consumed by `write`
///
/// Dropping the stream releases the underlying connection or file handle.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Kind of node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudItemType {
    File,
    Folder,
    /// Symlinks, devices and anything else that is neither
    Unknown,
}

impl std::fmt::Display for CloudItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudItemType::File => write!(f, "file"),
            CloudItemType::Folder => write!(f, "folder"),
            CloudItemType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Metadata for a file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudItemMetadata {
    /// Last path segment
    pub name: String,

    /// Absolute virtual path, unique within a provider
    pub path: CloudPath,

    pub item_type: CloudItemType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl CloudItemMetadata {
    /// Create metadata for a file
    pub fn file(name: impl Into<String>, path: CloudPath) -> Self {
        Self {
            name: name.into(),
            path,
            item_type: CloudItemType::File,
            last_modified: None,
            size: None,
        }
    }

    /// Create metadata for a folder
    pub fn folder(name: impl Into<String>, path: CloudPath) -> Self {
        Self {
            name: name.into(),
            path,
            item_type: CloudItemType::Folder,
            last_modified: None,
            size: None,
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<Timestamp>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == CloudItemType::Folder
    }
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudItemList {
    pub items: Vec<CloudItemMetadata>,

    /// Token for the next page, if the backend pages its listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl CloudItemList {
    pub fn new(items: Vec<CloudItemMetadata>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Backend-agnostic storage operations
///
/// Every method is an independent future; implementations hold no locks
/// across calls, so concurrent writes to one path are last-writer-wins.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Metadata of a single node
    async fn item_metadata(&self, node: &CloudPath) -> Result<CloudItemMetadata>;

    /// Immediate children of a folder
    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> Result<CloudItemList>;

    /// All descendants of a folder
    async fn list_exhaustively(&self, folder: &CloudPath) -> Result<CloudItemList>;

    /// Full content of a file
    async fn read(&self, file: &CloudPath, listener: Arc<dyn ProgressListener>)
    -> Result<ByteStream>;

    /// `count` bytes of a file starting at `offset`
    async fn read_range(
        &self,
        file: &CloudPath,
        offset: u64,
        count: u64,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ByteStream>;

    /// Upload `data` to `file` and return the stored node's metadata
    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: ByteStream,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<CloudItemMetadata>;

    async fn create_folder(&self, folder: &CloudPath) -> Result<CloudPath>;

    /// Delete a file, or a folder including its contents
    async fn delete(&self, node: &CloudPath) -> Result<()>;

    /// Move `source` to `target`, returning `target`
    async fn move_item(&self, source: &CloudPath, target: &CloudPath, replace: bool)
    -> Result<CloudPath>;
}
