//! Interpretation of `walrus store --json` output.
//!
//! The client prints either a JSON array with one entry per stored file or,
//! in older releases, a single object. Unknown fields are ignored; only what
//! ends up in an [`ItemResult`](crate::ItemResult) is read.

use crate::models::{Amount, Expiration, Stored};
use derive_more::{Display, Error};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use walsim_config::Epochs;

/// Why the output of a successful invocation could not be used.
#[derive(Debug, Display, Error)]
pub enum ParseError {
    #[display("malformed JSON: {_0}")]
    Json(serde_json::Error),
    #[display("output contains no result")]
    Empty,
    #[display("output has an empty blob ID")]
    MissingBlobId,
    #[display("blob {_0} is marked invalid")]
    MarkedInvalid(#[error(not(source))] String),
    #[display("storage client reported an error: {_0}")]
    Reported(#[error(not(source))] String),
}

/// What was asked of the client, needed to fill gaps in its answer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Request {
    pub epochs: Epochs,
    pub share: bool,
}
impl Request {
    /// Expiration when the client did not report an end epoch.
    fn fallback_expiration(self) -> Option<Expiration> {
        match self.epochs {
            Epochs::Max => Some(Expiration::Unbounded),
            Epochs::Count(_) => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn first<T: DeserializeOwned>(stdout: &str) -> Result<T, ParseError> {
    match serde_json::from_str(stdout.trim()).map_err(ParseError::Json)? {
        OneOrMany::Many(entries) => entries.into_iter().next().ok_or(ParseError::Empty),
        OneOrMany::One(entry) => Ok(entry),
    }
}

fn non_empty(blob_id: String) -> Result<String, ParseError> {
    match blob_id.trim().is_empty() {
        true => Err(ParseError::MissingBlobId),
        false => Ok(blob_id),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DryRunOutput {
    blob_id: String,
    unencoded_size: Option<u64>,
    encoded_size: Option<u64>,
    storage_cost: Amount,
    end_epoch: Option<u64>,
}

/// Parse the output of `walrus store --dry-run --json`.
///
/// `size` is used when the client does not echo the unencoded size.
pub(crate) fn dry_run(stdout: &str, size: u64, request: Request) -> Result<Stored, ParseError> {
    let output: DryRunOutput = first(stdout)?;
    Ok(Stored {
        blob_id: non_empty(output.blob_id)?,
        size: output.unencoded_size.unwrap_or(size),
        encoded_size: output.encoded_size,
        cost: output.storage_cost,
        shared: request.share,
        expires: output.end_epoch.map(Expiration::Epoch).or_else(|| request.fallback_expiration()),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreOutput {
    blob_store_result: BlobStoreResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum BlobStoreResult {
    #[serde(rename_all = "camelCase")]
    NewlyCreated {
        blob_object: BlobObject,
        cost: Amount,
        shared_blob_object: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AlreadyCertified { blob_id: String, end_epoch: Option<u64> },
    #[serde(rename_all = "camelCase")]
    MarkedInvalid { blob_id: String },
    #[serde(rename_all = "camelCase")]
    Error { blob_id: Option<String>, error_msg: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
    size: u64,
    storage: Option<StorageResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageResource {
    end_epoch: u64,
}

/// Parse the output of `walrus store --json`.
///
/// A blob the network already certified counts as stored, at no cost to
/// this run.
pub(crate) fn upload(stdout: &str, size: u64, request: Request) -> Result<Stored, ParseError> {
    let output: StoreOutput = first(stdout)?;
    match output.blob_store_result {
        BlobStoreResult::NewlyCreated { blob_object, cost, shared_blob_object } => Ok(Stored {
            blob_id: non_empty(blob_object.blob_id)?,
            size: blob_object.size,
            encoded_size: None,
            cost,
            shared: shared_blob_object.is_some(),
            expires: blob_object
                .storage
                .map(|storage| Expiration::Epoch(storage.end_epoch))
                .or_else(|| request.fallback_expiration()),
        }),
        BlobStoreResult::AlreadyCertified { blob_id, end_epoch } => Ok(Stored {
            blob_id: non_empty(blob_id)?,
            size,
            encoded_size: None,
            cost: Amount::ZERO,
            shared: request.share,
            expires: end_epoch.map(Expiration::Epoch).or_else(|| request.fallback_expiration()),
        }),
        BlobStoreResult::MarkedInvalid { blob_id } => Err(ParseError::MarkedInvalid(blob_id)),
        BlobStoreResult::Error { blob_id, error_msg } => Err(ParseError::Reported(match blob_id {
            Some(blob_id) => format!("{error_msg} (blob {blob_id})"),
            None => error_msg,
        })),
    }
}
