use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use ca_core::{
    ByteStream, CloudItemList, CloudItemMetadata, CloudItemType, CloudPath, CloudProvider, Error,
    ProgressListener, ProgressReader, Result,
};

/// [`CloudProvider`] rooted at a local directory
///
/// `/a/b` resolves to `<root>/a/b`. Symlinks are reported as
/// [`CloudItemType::Unknown`] and never followed when listing.
#[derive(Debug, Clone)]
pub struct LocalFsCloudProvider {
    root: PathBuf,
}

impl LocalFsCloudProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &CloudPath) -> PathBuf {
        let mut resolved = self.root.clone();
        resolved.extend(path.segments());
        resolved
    }

    async fn children(&self, folder: &CloudPath) -> Result<Vec<CloudItemMetadata>> {
        let mut entries = fs::read_dir(self.resolve(folder))
            .await
            .map_err(|e| map_io_error(e, folder))?;

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, folder))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = match folder.join(&name) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(folder = %folder, name, error = %e, "Skipping unrepresentable entry");
                    continue;
                }
            };
            // DirEntry::metadata does not follow symlinks
            let meta = entry.metadata().await.map_err(|e| map_io_error(e, &path))?;
            items.push(to_metadata(path, &meta));
        }

        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}

#[async_trait]
impl CloudProvider for LocalFsCloudProvider {
    async fn item_metadata(&self, node: &CloudPath) -> Result<CloudItemMetadata> {
        let meta = fs::symlink_metadata(self.resolve(node))
            .await
            .map_err(|e| map_io_error(e, node))?;
        Ok(to_metadata(node.clone(), &meta))
    }

    async fn list(&self, folder: &CloudPath, _page_token: Option<&str>) -> Result<CloudItemList> {
        Ok(CloudItemList::new(self.children(folder).await?))
    }

    async fn list_exhaustively(&self, folder: &CloudPath) -> Result<CloudItemList> {
        let mut items = Vec::new();
        let mut pending = VecDeque::from([folder.clone()]);

        while let Some(current) = pending.pop_front() {
            let children = self.children(&current).await?;
            pending.extend(
                children
                    .iter()
                    .filter(|item| item.is_folder())
                    .map(|item| item.path.clone()),
            );
            items.extend(children);
        }

        Ok(CloudItemList::new(items))
    }

    async fn read(&self, file: &CloudPath, listener: Arc<dyn ProgressListener>) -> Result<ByteStream> {
        let handle = File::open(self.resolve(file))
            .await
            .map_err(|e| map_io_error(e, file))?;
        Ok(Box::pin(ProgressReader::new(handle, listener)))
    }

    async fn read_range(
        &self,
        file: &CloudPath,
        offset: u64,
        count: u64,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ByteStream> {
        let mut handle = File::open(self.resolve(file))
            .await
            .map_err(|e| map_io_error(e, file))?;
        handle.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::pin(ProgressReader::new(handle.take(count), listener)))
    }

    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: ByteStream,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<CloudItemMetadata> {
        let target = self.resolve(file);
        let mut options = OpenOptions::new();
        options.write(true);
        if replace {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let mut out = options.open(&target).await.map_err(|e| map_io_error(e, file))?;
        let mut reader = ProgressReader::new(data, listener);
        let written = tokio::io::copy(&mut reader, &mut out).await?;
        out.flush().await?;
        tracing::debug!(path = %file, bytes = written, "Wrote file");

        self.item_metadata(file).await
    }

    async fn create_folder(&self, folder: &CloudPath) -> Result<CloudPath> {
        fs::create_dir(self.resolve(folder))
            .await
            .map_err(|e| map_io_error(e, folder))?;
        Ok(folder.clone())
    }

    async fn delete(&self, node: &CloudPath) -> Result<()> {
        let target = self.resolve(node);
        let meta = fs::symlink_metadata(&target)
            .await
            .map_err(|e| map_io_error(e, node))?;

        let result = if meta.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };
        result.map_err(|e| map_io_error(e, node))
    }

    async fn move_item(&self, source: &CloudPath, target: &CloudPath, replace: bool) -> Result<CloudPath> {
        let from = self.resolve(source);
        let to = self.resolve(target);

        fs::symlink_metadata(&from)
            .await
            .map_err(|e| map_io_error(e, source))?;

        match fs::symlink_metadata(&to).await {
            Ok(_) if !replace => return Err(Error::AlreadyExists(target.to_string())),
            // rename cannot replace a non-empty directory
            Ok(existing) if existing.is_dir() => {
                fs::remove_dir_all(&to).await.map_err(|e| map_io_error(e, target))?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(map_io_error(e, target)),
        }

        fs::rename(&from, &to)
            .await
            .map_err(|e| map_io_error(e, target))?;
        Ok(target.clone())
    }
}

fn to_metadata(path: CloudPath, meta: &std::fs::Metadata) -> CloudItemMetadata {
    let name = path.file_name().unwrap_or_default().to_string();
    let item_type = if meta.is_dir() {
        CloudItemType::Folder
    } else if meta.is_file() {
        CloudItemType::File
    } else {
        CloudItemType::Unknown
    };
    let last_modified = meta.modified().ok().and_then(|t| Timestamp::try_from(t).ok());

    CloudItemMetadata {
        name,
        path,
        item_type,
        last_modified,
        size: Some(meta.len()),
    }
}

fn map_io_error(e: io::Error, path: &CloudPath) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
        io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
        io::ErrorKind::PermissionDenied => Error::Forbidden,
        _ => Error::Io(e),
    }
}
