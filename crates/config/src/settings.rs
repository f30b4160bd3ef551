use crate::error::{Error, ErrorKind, Result};
use crate::options::{Options, Tools};
use crate::types::{Epochs, Network, RunMode};
use exn::ResultExt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the directory (inside the image directory) holding run state.
pub const STATE_DIR_NAME: &str = ".walsim";

/// Validated configuration, passed by value into the batch engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Absolute path of the image directory.
    pub path: PathBuf,
    pub context: Network,
    pub epochs: Epochs,
    pub share: bool,
    pub workers: NonZeroUsize,
    pub mode: RunMode,
    pub verify: bool,
    pub clean: bool,
    pub log: bool,
    pub timeout: Duration,
    pub wallet_timeout: Duration,
    pub min_native_balance: u64,
    /// Absolute path of the state directory.
    pub state_dir: PathBuf,
    pub tools: Tools,
}

impl TryFrom<Options> for Settings {
    type Error = Error;
    fn try_from(options: Options) -> std::result::Result<Self, Self::Error> {
        if options.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::invalid("path", "must not be empty"));
        }
        let path = std::path::absolute(&options.path).or_raise(|| ErrorKind::invalid("path", "cannot be resolved"))?;
        let workers = match options.workers {
            Some(n) => NonZeroUsize::new(n).ok_or_else(|| exn::Exn::from(ErrorKind::invalid("workers", "must be at least 1")))?,
            None => default_workers(),
        };
        if options.timeout == 0 {
            exn::bail!(ErrorKind::invalid("timeout", "must be at least 1 second"));
        }
        if options.wallet_timeout == 0 {
            exn::bail!(ErrorKind::invalid("wallet_timeout", "must be at least 1 second"));
        }
        let state_dir = match options.state_dir {
            Some(dir) => std::path::absolute(&dir).or_raise(|| ErrorKind::invalid("state_dir", "cannot be resolved"))?,
            None => path.join(STATE_DIR_NAME),
        };
        Ok(Self {
            path,
            context: options.context,
            epochs: options.epochs,
            share: options.share,
            workers,
            mode: options.mode,
            verify: options.verify,
            clean: options.clean,
            log: options.log,
            timeout: Duration::from_secs(options.timeout),
            wallet_timeout: Duration::from_secs(options.wallet_timeout),
            min_native_balance: options.min_native_balance,
            state_dir,
            tools: options.tools,
        })
    }
}

fn default_workers() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}
