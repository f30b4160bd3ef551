use crate::models::ItemResult;
use std::collections::{BTreeMap, BTreeSet};

/// Items whose content is byte-identical to another item's.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Duplicates {
    /// Every key whose blob ID is shared with at least one other key.
    pub keys: BTreeSet<String>,
    /// The shared blob IDs themselves.
    pub blob_ids: BTreeSet<String>,
}

/// Group successful results by blob ID and report every group with more than
/// one member.
///
/// The relation is symmetric: if `a` duplicates `b`, both keys are reported.
pub fn find_duplicates<'a>(results: impl IntoIterator<Item = &'a ItemResult>) -> Duplicates {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for result in results.into_iter().filter(|result| result.is_success()) {
        if let Some(blob_id) = result.blob_id.as_deref() {
            groups.entry(blob_id).or_default().push(&result.key);
        }
    }

    let mut duplicates = Duplicates::default();
    for (blob_id, keys) in groups.into_iter().filter(|(_, keys)| keys.len() > 1) {
        tracing::info!(blob_id, keys = ?keys, "Identical content stored under several keys");
        duplicates.blob_ids.insert(blob_id.to_string());
        duplicates.keys.extend(keys.into_iter().map(str::to_string));
    }
    duplicates
}
