use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::constants::ACTIVE_CONFIG_FILE;
use crate::constants::STAGED_CONFIG_FILE;
use crate::utils::file_io::read_if_exists;
use crate::utils::file_io::remove_if_exists;
use crate::utils::file_io::replace_file;
use crate::utils::file_io::write_new_file;
use crate::ReplicationError;
use crate::Result;

/// Durable home of the active and staged clusterwide documents.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigStorage: Send + Sync + 'static {
    /// Returns the active document, if any. A leftover staged document from
    /// an interrupted commit is discarded.
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Persists `document` next to the active one without activating it.
    async fn stage(
        &self,
        version: u64,
        document: &[u8],
    ) -> Result<()>;

    /// Makes the staged document the active one.
    async fn commit(
        &self,
        version: u64,
    ) -> Result<()>;

    /// Drops the staged document.
    async fn abort(
        &self,
        version: u64,
    ) -> Result<()>;
}

/// Documents kept as two files inside the node's work directory
pub struct FileConfigStorage {
    active: PathBuf,
    staged: PathBuf,
}

impl FileConfigStorage {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            active: workdir.join(ACTIVE_CONFIG_FILE),
            staged: workdir.join(STAGED_CONFIG_FILE),
        }
    }
}

#[async_trait]
impl ConfigStorage for FileConfigStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        if remove_if_exists(&self.staged).await? {
            warn!(path = ?self.staged, "stale staged config removed");
        }
        read_if_exists(&self.active).await
    }

    async fn stage(
        &self,
        version: u64,
        document: &[u8],
    ) -> Result<()> {
        if tokio::fs::try_exists(&self.staged).await? {
            return Err(ReplicationError::TwoPhaseLocked.into());
        }
        write_new_file(&self.staged, document).await?;
        debug!(version, "config staged on disk");
        Ok(())
    }

    async fn commit(
        &self,
        version: u64,
    ) -> Result<()> {
        replace_file(&self.staged, &self.active).await?;
        debug!(version, "staged config activated on disk");
        Ok(())
    }

    async fn abort(
        &self,
        version: u64,
    ) -> Result<()> {
        remove_if_exists(&self.staged).await?;
        debug!(version, "staged config dropped");
        Ok(())
    }
}

/// In-memory storage for embedded and test nodes
#[derive(Default)]
pub struct MemConfigStorage {
    active: Mutex<Option<Vec<u8>>>,
    staged: Mutex<Option<Vec<u8>>>,
}

impl MemConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<Vec<u8>> {
        self.active.lock().clone()
    }

    pub fn has_staged(&self) -> bool {
        self.staged.lock().is_some()
    }
}

#[async_trait]
impl ConfigStorage for MemConfigStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        self.staged.lock().take();
        Ok(self.active.lock().clone())
    }

    async fn stage(
        &self,
        _version: u64,
        document: &[u8],
    ) -> Result<()> {
        let mut staged = self.staged.lock();
        if staged.is_some() {
            return Err(ReplicationError::TwoPhaseLocked.into());
        }
        *staged = Some(document.to_vec());
        Ok(())
    }

    async fn commit(
        &self,
        version: u64,
    ) -> Result<()> {
        let document = self
            .staged
            .lock()
            .take()
            .ok_or(ReplicationError::NotStaged { version })?;
        *self.active.lock() = Some(document);
        Ok(())
    }

    async fn abort(
        &self,
        _version: u64,
    ) -> Result<()> {
        self.staged.lock().take();
        Ok(())
    }
}
