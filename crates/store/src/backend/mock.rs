//! In-memory record store for testing.

use crate::RecordStore;
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory record store for testing.
///
/// Records live in a `HashMap` behind a [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Writes can be made to
/// fail on demand to exercise persistence-failure handling.
///
/// # Examples
///
/// ```
/// use walsim_store::backend::MockStore;
/// use walsim_store::RecordStore;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::with_records([("a.png.json", b"{}")]);
/// assert!(store.exists(Path::new("a.png.json")).await?);
/// store.reject_writes(true);
/// assert!(store.write(Path::new("b.png.json"), b"{}").await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    records: RwLock<HashMap<PathBuf, Vec<u8>>>,
    reject_writes: AtomicBool,
}

impl MockStore {
    /// Create a mock store pre-populated with records.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_records(records: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (key, data) in records {
            let key = key.into();
            let Ok(validated) = validate_key(&key) else {
                panic!("MockStore::with_records: invalid key {}", key.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            records: RwLock::new(map),
            reject_writes: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent write (but not delete) fail with a backend error.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
impl Default for MockStore {
    fn default() -> Self {
        let records: [(&str, &[u8]); 0] = [];
        Self::with_records(records)
    }
}

#[async_trait]
impl RecordStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &Path) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.records.read().await.contains_key(&key))
    }

    async fn read(&self, key: &Path) -> Result<Vec<u8>> {
        let key = validate_key(key)?;
        self.records.read().await.get(&key).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key)))
    }

    async fn write(&self, key: &Path, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        if self.reject_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Backend(format!("write to `{}` rejected", key.display())));
        }
        self.records.write().await.insert(key, data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &Path) -> Result<()> {
        let key = validate_key(key)?;
        self.records.write().await.remove(&key).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key)))
    }
}
