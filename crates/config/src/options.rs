use crate::types::{Epochs, Network, RunMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub(crate) const DEFAULT_PATH: &str = "./images";
pub(crate) const DEFAULT_STORE_TIMEOUT_SECS: u64 = 300;
pub(crate) const DEFAULT_WALLET_TIMEOUT_SECS: u64 = 60;
/// 1 MIST: any non-zero SUI balance is enough to attempt paying gas.
pub(crate) const DEFAULT_MIN_NATIVE_BALANCE: u64 = 1;

/// Raw, unvalidated configuration as merged from every source.
///
/// Turned into [`Settings`](crate::Settings) by
/// [`Settings::try_from`](crate::Settings) once all sources are merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Directory containing the images.
    pub path: PathBuf,
    pub context: Network,
    pub epochs: Epochs,
    /// Store blobs as shared blob objects (`--share`).
    pub share: bool,
    /// Concurrent external invocations; defaults to the CPU count.
    pub workers: Option<usize>,
    pub mode: RunMode,
    /// Report items that share a blob ID with another item.
    pub verify: bool,
    /// Delete per-item records once the summary has been produced.
    pub clean: bool,
    /// Embed run metadata in the written summary.
    pub log: bool,
    /// Seconds each `walrus store` invocation may run.
    pub timeout: u64,
    /// Seconds the wallet balance query may run.
    pub wallet_timeout: u64,
    /// Minimum SUI balance, in MIST, required before uploading.
    pub min_native_balance: u64,
    /// Where per-item records and summaries live; defaults to `<path>/.walsim`.
    pub state_dir: Option<PathBuf>,
    pub tools: Tools,
}
impl Default for Options {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            context: Network::default(),
            epochs: Epochs::default(),
            share: false,
            workers: None,
            mode: RunMode::default(),
            verify: true,
            clean: false,
            log: false,
            timeout: DEFAULT_STORE_TIMEOUT_SECS,
            wallet_timeout: DEFAULT_WALLET_TIMEOUT_SECS,
            min_native_balance: DEFAULT_MIN_NATIVE_BALANCE,
            state_dir: None,
            tools: Tools::default(),
        }
    }
}

/// Explicit executable locations, for when the clients are not in `PATH`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub walrus: Option<PathBuf>,
    pub sui: Option<PathBuf>,
}

/// Command-line values, merged last so they win over every other source.
///
/// Anything left as `None` falls through to the file/environment/default
/// value.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epochs: Option<Epochs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RunMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}
