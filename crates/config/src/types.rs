use crate::error::ErrorKind;
use derive_more::Display;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::num::NonZeroU32;
use std::str::FromStr;

/// Which Walrus deployment to talk to (the client's `--context`).
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    #[display("mainnet")]
    Mainnet,
    #[display("testnet")]
    Testnet,
}
impl FromStr for Network {
    type Err = ErrorKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            _ => Err(ErrorKind::Network(s.to_string())),
        }
    }
}

/// Requested storage duration.
///
/// The `max` token is handed to the storage client verbatim; this crate never
/// tries to work out what the maximum currently is.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Epochs {
    #[default]
    #[display("max")]
    Max,
    #[display("{_0}")]
    Count(NonZeroU32),
}
impl Epochs {
    pub fn count(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self::Count)
    }
}
impl FromStr for Epochs {
    type Err = ErrorKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("max") {
            return Ok(Self::Max);
        }
        trimmed.parse::<NonZeroU32>().map(Self::Count).map_err(|_| ErrorKind::Epochs(s.to_string()))
    }
}
impl Serialize for Epochs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Max => serializer.serialize_str("max"),
            Self::Count(n) => serializer.serialize_u32(n.get()),
        }
    }
}
impl<'de> Deserialize<'de> for Epochs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Environment variables and TOML can hand us either form.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Token(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => u32::try_from(n)
                .ok()
                .and_then(Self::count)
                .ok_or_else(|| de::Error::custom(ErrorKind::Epochs(n.to_string()))),
            Repr::Token(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// What to do with items that already have a stored result.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Skip items whose stored result is a success; process everything else.
    #[default]
    #[display("resume")]
    Resume,
    /// Discard stored results and process every item again.
    #[display("fresh")]
    Fresh,
}
