//! Configuration loading and validation.
//!
//! Sources are merged in increasing order of precedence:
//!
//! 1. built-in defaults ([`Options::default`]),
//! 2. a TOML file: the one passed explicitly, otherwise `walsim.toml` in the
//!    user's configuration directory and then in the working directory,
//! 3. `WALSIM_*` environment variables (nested keys with `__`, for example
//!    `WALSIM_TOOLS__WALRUS=/opt/walrus`),
//! 4. command-line [`Overrides`].
//!
//! The merged [`Options`] are validated exactly once into [`Settings`].

pub mod error;
mod options;
mod settings;
mod types;

pub use crate::options::{Options, Overrides, Tools};
pub use crate::settings::{STATE_DIR_NAME, Settings};
pub use crate::types::{Epochs, Network, RunMode};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::path::Path;

pub const FILE_NAME: &str = "walsim.toml";
pub const ENV_PREFIX: &str = "WALSIM_";

/// Every configuration source except command-line overrides.
pub fn figment(file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Options::default()));
    match file {
        // An explicitly requested file has to exist.
        Some(file) => figment = figment.merge(Toml::file_exact(file)),
        None => {
            if let Some(dirs) = ProjectDirs::from("", "", "walsim") {
                figment = figment.merge(Toml::file(dirs.config_dir().join(FILE_NAME)));
            }
            figment = figment.merge(Toml::file(FILE_NAME));
        },
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load, merge and validate the configuration.
pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Settings> {
    let options: Options =
        figment(file).merge(Serialized::defaults(overrides)).extract().or_raise(|| ErrorKind::Load)?;
    tracing::debug!(?options, "Configuration loaded");
    Settings::try_from(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::num::NonZeroUsize;
    use std::path::PathBuf;

    #[test]
    fn test_file_then_env_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                FILE_NAME,
                r#"
                    path = "/srv/images"
                    context = "testnet"
                    epochs = 5
                    workers = 2
                    share = true

                    [tools]
                    walrus = "/opt/walrus/bin/walrus"
                "#,
            )?;
            jail.set_env("WALSIM_EPOCHS", "max");
            jail.set_env("WALSIM_TOOLS__SUI", "/opt/sui/bin/sui");

            let overrides = Overrides { workers: Some(8), mode: Some(RunMode::Fresh), ..Overrides::default() };
            let settings = load(None, overrides).map_err(|e| (*e).to_string())?;
            assert_eq!(settings.path, PathBuf::from("/srv/images"));
            assert_eq!(settings.context, Network::Testnet);
            assert_eq!(settings.epochs, Epochs::Max);
            assert_eq!(settings.workers, NonZeroUsize::new(8).unwrap());
            assert_eq!(settings.mode, RunMode::Fresh);
            assert!(settings.share);
            assert_eq!(settings.tools.walrus, Some(PathBuf::from("/opt/walrus/bin/walrus")));
            assert_eq!(settings.tools.sui, Some(PathBuf::from("/opt/sui/bin/sui")));
            Ok(())
        });
    }

    #[test]
    fn test_numeric_epochs_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("WALSIM_EPOCHS", "12");
            let settings = load(None, Overrides::default()).map_err(|e| (*e).to_string())?;
            assert_eq!(settings.epochs, Epochs::count(12).unwrap());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fail_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file(FILE_NAME, "epochs = 0")?;
            let err = load(None, Overrides::default()).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        Jail::expect_with(|_jail| {
            assert!(load(Some(Path::new("missing.toml")), Overrides::default()).is_err());
            Ok(())
        });
    }
}
