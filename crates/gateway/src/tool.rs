use crate::error::{ErrorKind, Result};
use derive_more::Display;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The external command-line clients this crate is allowed to run.
///
/// Nothing else can be executed through a [`Gateway`](crate::Gateway): the
/// executable is always resolved from one of these roles, never from
/// caller-supplied program names.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Tool {
    /// The Walrus storage-network client.
    #[display("walrus")]
    Walrus,
    /// The Sui wallet client.
    #[display("sui")]
    Sui,
}
impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Walrus, Tool::Sui];

    /// Executable name looked up in `PATH` when no explicit location is configured.
    pub fn executable(&self) -> &'static str {
        match self {
            Self::Walrus => "walrus",
            Self::Sui => "sui",
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            Self::Walrus => "https://github.com/MystenLabs/walrus",
            Self::Sui => "https://docs.sui.io/build/install",
        }
    }
}

/// Resolved executable locations for each [`Tool`].
///
/// Tools that could not be found are remembered as missing rather than
/// failing discovery outright; a simulation never needs the wallet client, so
/// its absence only matters once something tries to run it.
#[derive(Clone, Debug, Default)]
pub struct Toolchain {
    resolved: HashMap<Tool, PathBuf>,
}
impl Toolchain {
    /// Resolve every tool, preferring an explicit location from `overrides`
    /// (either a bare name searched in `PATH`, or a path to an executable).
    pub fn discover(overrides: &HashMap<Tool, PathBuf>) -> Self {
        let mut resolved = HashMap::new();
        for tool in Tool::ALL {
            let wanted = overrides.get(&tool).map(PathBuf::as_path).unwrap_or(Path::new(tool.executable()));
            match which::which(wanted) {
                Ok(path) => {
                    tracing::trace!(%tool, path = %path.display(), "Resolved external tool");
                    resolved.insert(tool, path);
                },
                Err(e) => tracing::info!(%tool, wanted = %wanted.display(), error = %e, "External tool not found"),
            }
        }
        Self { resolved }
    }

    /// Location of the tool's executable, or [`ErrorKind::Launch`] when it
    /// was not found during discovery.
    pub fn locate(&self, tool: Tool) -> Result<&Path> {
        match self.resolved.get(&tool) {
            Some(path) => Ok(path),
            None => exn::bail!(ErrorKind::Launch(tool)),
        }
    }
}
