use crate::error::{ErrorKind, Result};
use crate::models::{ItemResult, WorkItem};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use walsim_store::StoreHandle;
use walsim_store::error::ErrorKind as StoreErrorKind;

const RECORD_SUFFIX: &str = ".json";
/// Longest single path component accepted by common filesystems, in bytes.
const NAME_MAX: usize = 255;
const HASH_LENGTH: usize = 16;

/// Typed access to the per-item results of one namespace.
///
/// Each item's latest result is kept as pretty-printed JSON under
/// `<key>.json`. Names that would not fit in a single directory entry are
/// shortened and suffixed with a hash of the full key; the key itself is
/// always stored inside the record. Writes go through the store's atomic write, so a record is
/// always either the previous version or the new one.
#[derive(Clone)]
pub struct Records {
    store: StoreHandle,
}

impl Records {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    fn record_key(key: &str) -> PathBuf {
        let (parent, name) = key.rsplit_once('/').unwrap_or(("", key));
        let file = format!("{name}{RECORD_SUFFIX}");
        if file.len() <= NAME_MAX {
            return Path::new(parent).join(file);
        }
        let hash = blake3::hash(key.as_bytes()).to_string();
        let hash = &hash[..HASH_LENGTH];
        let mut keep = NAME_MAX - RECORD_SUFFIX.len() - HASH_LENGTH - 1;
        while !name.is_char_boundary(keep) {
            keep -= 1;
        }
        Path::new(parent).join(format!("{}~{hash}{RECORD_SUFFIX}", &name[..keep]))
    }

    /// The stored result for `key`, if there is one.
    pub async fn load(&self, key: &str) -> Result<Option<ItemResult>> {
        let error = || ErrorKind::Persistence(key.to_string());
        let bytes = match self.store.read(&Self::record_key(key)).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(&*e, StoreErrorKind::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e).or_raise(error),
        };
        let result: ItemResult = serde_json::from_slice(&bytes).or_raise(error)?;
        if let Err(reason) = result.validate() {
            tracing::warn!(key, reason, store = %self.name(), "Stored result is inconsistent");
            exn::bail!(error());
        }
        if result.key != key {
            tracing::warn!(key, stored = %result.key, store = %self.name(), "Stored result belongs to another item");
            exn::bail!(error());
        }
        Ok(Some(result))
    }

    /// Replace the stored result for `result.key`.
    pub async fn save(&self, result: &ItemResult) -> Result<()> {
        let error = || ErrorKind::Persistence(result.key.clone());
        let bytes = serde_json::to_vec_pretty(result).or_raise(error)?;
        self.store.write(&Self::record_key(&result.key), &bytes).await.or_raise(error)
    }

    /// Remove the stored result for `key`. Returns whether there was one.
    pub async fn discard(&self, key: &str) -> Result<bool> {
        match self.store.delete(&Self::record_key(key)).await {
            Ok(()) => Ok(true),
            Err(e) if matches!(&*e, StoreErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(e).or_raise(|| ErrorKind::Persistence(key.to_string())),
        }
    }

    /// The latest known state of every item, in the order given; items
    /// without a record are reported as pending.
    pub async fn snapshot(&self, items: &[WorkItem]) -> Result<Vec<ItemResult>> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(self.load(&item.key).await?.unwrap_or_else(|| ItemResult::pending(item)));
        }
        Ok(results)
    }
}
