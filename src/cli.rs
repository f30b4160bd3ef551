use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use walsim_config::{Epochs, Network, Overrides, RunMode};

/// Estimate and pay for storing image folders on Walrus.
#[derive(Debug, Parser)]
#[command(name = "walsim", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file [default: walsim.toml in the user configuration
    /// directory, then in the working directory]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate storage costs with dry runs; nothing is stored or paid for
    Simulate(RunArgs),
    /// Store every image, once the wallet is known to cover the estimate
    Upload(RunArgs),
    /// Check the clients are installed and show the wallet balance
    Check,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory containing the images
    #[arg(short, long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Walrus deployment to use (mainnet or testnet)
    #[arg(long)]
    pub context: Option<Network>,

    /// Storage duration: a number of epochs, or "max"
    #[arg(long)]
    pub epochs: Option<Epochs>,

    /// Store blobs as shared objects
    #[arg(long)]
    pub share: bool,

    /// Skip images that already have a successful result (the default)
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Discard stored results and process every image again
    #[arg(long)]
    pub fresh: bool,

    /// Number of images processed at the same time [default: CPU count]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Report images with identical content
    #[arg(long, overrides_with = "no_verify")]
    pub verify: bool,

    #[arg(long, hide = true)]
    pub no_verify: bool,

    /// Delete per-image results once the summary has been written
    #[arg(long, overrides_with = "no_clean")]
    pub clean: bool,

    #[arg(long, hide = true)]
    pub no_clean: bool,

    /// Include run metadata (time, duration, options) in the summary file
    #[arg(long)]
    pub log: bool,

    /// Seconds a single client invocation may take
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Where results and the summary are kept [default: <PATH>/.walsim]
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Only what was given on the command line; everything else falls
    /// through to the other configuration sources.
    pub fn overrides(&self) -> Overrides {
        let mode = match (self.resume, self.fresh) {
            (_, true) => Some(RunMode::Fresh),
            (true, _) => Some(RunMode::Resume),
            _ => None,
        };
        Overrides {
            path: self.path.clone(),
            context: self.context,
            epochs: self.epochs,
            share: self.share.then_some(true),
            workers: self.workers,
            mode,
            verify: toggle(self.verify, self.no_verify),
            clean: toggle(self.clean, self.no_clean),
            log: self.log.then_some(true),
            timeout: self.timeout,
            state_dir: self.state_dir.clone(),
        }
    }
}

fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
