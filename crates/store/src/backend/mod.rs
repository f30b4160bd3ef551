//! Record store trait and implementations.
//!
//! This module defines the [`RecordStore`] trait: the existence check,
//! atomic write, read and delete operations the batch engine needs, keyed by
//! a relative path.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalStore;
#[cfg(feature = "mock")]
pub use self::mock::MockStore;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for record stores.
///
/// Writes to different keys are independent and may happen concurrently from
/// many workers; no cross-key locking is performed or needed.
///
/// # Path Handling
/// All keys are relative to the store root and validated with
/// [`validate_key`](crate::validate_key) before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use walsim_store::{RecordStore, error::Result};
///
/// async fn replace_record(store: &dyn RecordStore, record: &[u8]) -> Result<()> {
///     let key = Path::new("cat.png.json");
///     if store.exists(key).await? {
///         let previous = store.read(key).await?;
///         tracing::debug!(bytes = previous.len(), "Replacing existing record");
///     }
///     store.write(key, record).await
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    /// Check if a record exists.
    async fn exists(&self, key: &Path) -> Result<bool>;

    /// Read a record's contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is no
    /// record for the key.
    async fn read(&self, key: &Path) -> Result<Vec<u8>>;

    /// Atomically create or replace a record.
    ///
    /// Concurrent readers (including a process restarted after a crash) see
    /// either the previous contents or the complete new contents.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn write(&self, key: &Path, data: &[u8]) -> Result<()>;

    /// Delete a record.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is no
    /// record for the key.
    async fn delete(&self, key: &Path) -> Result<()>;
}
