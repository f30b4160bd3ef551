use crate::error::{ErrorKind, Result};
use crate::models::WorkItem;
use exn::ResultExt;
use std::path::{Component, Path};
use tokio::fs;

/// File extensions (compared case-insensitively) treated as images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["webp", "png", "jpg", "jpeg", "gif"];

/// Recursively collect every image below `root`, ordered by key.
///
/// Hidden files and directories (names starting with `.`) are skipped, which
/// also keeps the default state directory out of the listing. Symbolic links
/// are not followed.
pub async fn discover(root: &Path) -> Result<Vec<WorkItem>> {
    let error = || ErrorKind::Discovery(root.to_path_buf());
    let metadata = fs::metadata(root).await.or_raise(error)?;
    if !metadata.is_dir() {
        exn::bail!(error());
    }

    let mut items = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(directory) = pending.pop() {
        let mut entries = fs::read_dir(&directory).await.or_raise(error)?;
        while let Some(entry) = entries.next_entry().await.or_raise(error)? {
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = entry.file_type().await.or_raise(error)?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_image(&path) {
                let Some(key) = key_for(root, &path) else {
                    tracing::warn!(path = %path.display(), "Skipping image with a non UTF-8 path");
                    continue;
                };
                let size = entry.metadata().await.or_raise(error)?.len();
                items.push(WorkItem { key, path, size });
            }
        }
    }

    items.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::debug!(root = %root.display(), count = items.len(), "Discovered images");
    Ok(items)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(extension)))
}

/// `/`-joined path of `path` relative to `root`.
fn key_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
