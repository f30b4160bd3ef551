//! Local filesystem record store.
//!
//! One file per key below a root directory. Writes go to a temporary file in
//! the destination directory which is flushed to disk and then renamed over
//! the destination, so a crash mid-write leaves at worst an orphaned
//! dot-prefixed temporary file and never a half-written record.

use crate::error::{ErrorKind, Result};
use crate::{RecordStore, key::validate as validate_key};
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::create_dir_all as sync_create_dir;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

/// Local filesystem record store.
///
/// # Examples
///
/// ```no_run
/// use walsim_store::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalStore::new("simulate", "/absolute/path/to/images/.walsim/simulate")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalStore {
    name: String,
    root: PathBuf,
}
impl LocalStore {
    /// Create a new local store, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidKey(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidKey(root));
            }
        } else {
            // Non-async; happens once per run and isn't worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, key: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_key(key.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, key: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Blocking half of [`write`](RecordStore::write); the temporary file must
    /// live in the destination directory for the rename to be atomic.
    fn publish(directory: &Path, destination: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(directory)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(destination).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(key)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, key: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(key)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, key))?)
    }

    async fn write(&self, key: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(key)?;
        let Some(directory) = abs_path.parent().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::InvalidKey(key.to_path_buf()));
        };
        fs::create_dir_all(&directory).await.map_err(|e| Self::map_io_error(e, key))?;
        let data = data.to_vec();
        let key_for_error = key.to_path_buf();
        tokio::task::spawn_blocking(move || Self::publish(&directory, &abs_path, &data))
            .await
            .or_raise(|| ErrorKind::Backend(format!("write task for `{}` panicked", key_for_error.display())))?
            .map_err(|e| Self::map_io_error(e, key))?;
        tracing::trace!(store = %self.name, key = %key.display(), "Record published");
        Ok(())
    }

    async fn delete(&self, key: &Path) -> Result<()> {
        let abs_path = self.absolute_path(key)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, key))?)
    }
}
