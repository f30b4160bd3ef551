mod cli;
mod error;
mod report;

use crate::cli::{Cli, Command, RunArgs};
use crate::error::{ErrorKind, Result};
use crate::report::RunLog;
use clap::Parser;
use exn::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use walsim_batch::{Amount, Batch, Gatekeeper, Mode, RunSummary, Token};
use walsim_config::{Overrides, Settings};
use walsim_gateway::{ProcessGateway, Tool, Toolchain};

/// Process exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exit {
    Success = 0,
    /// The run completed, but at least one image failed.
    ItemsFailed = 1,
    /// The run was aborted (or interrupted) before completing.
    Aborted = 2,
}
impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}
impl Exit {
    fn of(summary: &RunSummary) -> Self {
        if summary.interrupted {
            Self::Aborted
        } else if summary.has_failures() {
            Self::ItemsFailed
        } else {
            Self::Success
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::error!("{e:?}");
            Exit::Aborted.into()
        },
    }
}

/// `RUST_LOG` wins; otherwise `info`, raised by each `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<Exit> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Simulate(args) => execute(Mode::Simulate, config, &args).await,
        Command::Upload(args) => execute(Mode::Upload, config, &args).await,
        Command::Check => check(config).await,
    }
}

fn toolchain(settings: &Settings) -> Toolchain {
    let mut overrides = HashMap::new();
    if let Some(walrus) = &settings.tools.walrus {
        overrides.insert(Tool::Walrus, walrus.clone());
    }
    if let Some(sui) = &settings.tools.sui {
        overrides.insert(Tool::Sui, sui.clone());
    }
    Toolchain::discover(&overrides)
}

#[tracing::instrument(level = "debug", skip_all, fields(%mode))]
async fn execute(mode: Mode, config: Option<&Path>, args: &RunArgs) -> Result<Exit> {
    let settings = walsim_config::load(config, args.overrides()).or_raise(|| ErrorKind::Config)?;
    let gateway = ProcessGateway::new(toolchain(&settings));
    gateway.check(Tool::Walrus).or_raise(|| ErrorKind::Toolchain)?;
    if mode == Mode::Upload {
        gateway.check(Tool::Sui).or_raise(|| ErrorKind::Toolchain)?;
    }

    let batch = Batch::open(settings.clone(), Arc::new(gateway)).or_raise(|| ErrorKind::Batch)?;
    let items = batch.discover().await.or_raise(|| ErrorKind::Batch)?;
    if items.is_empty() {
        tracing::warn!(path = %settings.path.display(), "No images found");
    }
    tracing::info!(
        images = items.len(),
        context = %settings.context,
        epochs = %settings.epochs,
        workers = settings.workers.get(),
        run_mode = %settings.mode,
        "Starting {mode}"
    );

    let started = OffsetDateTime::now_utc();
    let clock = Instant::now();
    let run = async {
        match mode {
            Mode::Simulate => batch.simulate(&items).await,
            Mode::Upload => batch.upload(&items).await,
        }
    };
    // Dropping an unfinished run kills its in-flight client processes.
    let finished = tokio::select! {
        summary = run => Some(summary),
        _ = tokio::signal::ctrl_c() => None,
    };
    let summary = match finished {
        Some(summary) => summary.or_raise(|| ErrorKind::Batch)?,
        None => {
            tracing::warn!("Interrupted; summarising the results stored so far");
            batch.recover(mode, &items).await.or_raise(|| ErrorKind::Batch)?
        },
    };

    let run_log = settings.log.then(|| RunLog::new(&settings, started, clock.elapsed(), summary.interrupted));
    report::print(&summary);
    let written = report::write(&settings.state_dir, &summary, run_log.as_ref()).await?;
    tracing::info!(path = %written.display(), "Summary written");
    Ok(Exit::of(&summary))
}

async fn check(config: Option<&Path>) -> Result<Exit> {
    let settings = walsim_config::load(config, Overrides::default()).or_raise(|| ErrorKind::Config)?;
    let gateway = ProcessGateway::new(toolchain(&settings));
    let mut missing = false;
    for tool in Tool::ALL {
        match gateway.check(tool) {
            Ok(path) => tracing::info!(%tool, path = %path.display(), "Found"),
            Err(e) => {
                tracing::error!(%tool, "{}", *e);
                missing = true;
            },
        }
    }
    if missing {
        exn::bail!(ErrorKind::Toolchain);
    }

    let gatekeeper = Gatekeeper::new(
        Arc::new(gateway),
        settings.wallet_timeout,
        Amount::new(settings.min_native_balance.into()),
    );
    let balance = gatekeeper.snapshot().await.or_raise(|| ErrorKind::Batch)?;
    tracing::info!(
        sui = %Token::Sui.format(balance.native),
        wal = %Token::Wal.format(balance.storage),
        "Wallet balance"
    );
    Ok(Exit::Success)
}
