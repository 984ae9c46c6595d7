use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create directory: {:?}", e);
                return Err(StorageError::IoError(e).into());
            }
        }
    }
    Ok(())
}

pub fn open_file_for_append(path: PathBuf) -> Result<File> {
    create_parent_dir_if_not_exist(&path)?;
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(|e| StorageError::PathError { path, source: e }.into())
}

/// Writes `buf` into a file that must not exist yet.
///
/// Fails with `AlreadyExists` if `path` is present, which is how a leftover
/// staged document is detected.
pub(crate) async fn write_new_file(
    path: &Path,
    buf: &[u8],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| StorageError::PathError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        })?;
    file.write_all(buf).await?;
    file.sync_all().await?;
    debug!(?path, "file written");
    Ok(())
}

/// Atomically moves `from` over `to`.
pub(crate) async fn replace_file(
    from: &Path,
    to: &Path,
) -> Result<()> {
    tokio::fs::rename(from, to).await.map_err(|e| {
        StorageError::PathError {
            path: from.to_path_buf(),
            source: e,
        }
        .into()
    })
}

/// Removes `path`, returning whether a file was there.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

/// Reads the whole file, `None` if it does not exist.
pub(crate) async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(buf) => Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}
