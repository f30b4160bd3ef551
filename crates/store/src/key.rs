//! Record key validation.
//!
//! A key is the relative path of a record below the store root. Keys come
//! from file names found on disk, so they are checked like any other
//! untrusted path before they reach the filesystem.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validate a record key, returning it with `.` components and repeated
/// separators removed.
///
/// Rejected outright: absolute keys, `..` components, NUL bytes and names
/// starting with a dot (those are reserved for the temporary files of
/// in-flight atomic writes).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use walsim_store::validate_key;
/// assert!(validate_key("cat.png.json").is_ok());
/// assert!(validate_key("album/cat.png.json").is_ok());
/// assert!(validate_key("../cat.png.json").is_err());
/// assert!(validate_key(".tmpA1b2C3").is_err());
/// assert_eq!(validate_key("a/./b//c.json").unwrap(), Path::new("a/b/c.json"));
/// ```
pub fn validate(key: impl AsRef<Path>) -> Result<PathBuf> {
    let key = key.as_ref();
    let invalid = || ErrorKind::InvalidKey(key.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in key.components() {
        let Component::Normal(name) = component else {
            if component == Component::CurDir {
                continue;
            }
            exn::bail!(invalid());
        };
        let bytes = name.as_encoded_bytes();
        // NUL survives `Path::components()` but truncates the path in syscalls.
        if bytes.first() == Some(&b'.') || bytes.contains(&0) {
            exn::bail!(invalid());
        }
        normalized.push(name);
    }
    if normalized.as_os_str().is_empty() {
        exn::bail!(invalid());
    }
    Ok(normalized)
}
