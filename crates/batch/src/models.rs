use derive_more::Display;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;

/// Whether a run only asks for cost estimates or really stores blobs.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[display("simulate")]
    Simulate,
    #[display("upload")]
    Upload,
}
impl Mode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::Simulate)
    }

    /// Name of the record namespace (and state sub-directory) for this mode.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::Upload => "upload",
        }
    }
}

/// A single image to be processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Path relative to the image directory, always `/`-separated.
    pub key: String,
    /// Absolute path handed to the storage client.
    pub path: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[display("pending")]
    Pending,
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
}

/// A token amount in its smallest unit (FROST for WAL, MIST for SUI).
///
/// Amounts are integers all the way through; they are serialized as decimal
/// strings so that no JSON consumer ever rounds them through a float.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{_0}")]
pub struct Amount(u128);
impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn new(base_units: u128) -> Self {
        Self(base_units)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// The amount in whole tokens, always with nine decimal places.
    pub fn whole(self) -> String {
        let scale = 10u128.pow(Token::DECIMALS);
        format!("{}.{:09}", self.0 / scale, self.0 % scale)
    }
}
impl Add for Amount {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}
impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
impl FromStr for Amount {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}
impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The clients print amounts as bare integers in some places and as
        // strings in others.
        struct AmountVisitor;
        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer amount, as a number or a string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(v.into()))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u128::try_from(v).map(Amount).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }
        deserializer.deserialize_any(AmountVisitor)
    }
}

/// The two tokens a run cares about.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    /// Native token, pays for gas. Base unit: MIST.
    #[display("SUI")]
    #[serde(rename = "SUI")]
    Sui,
    /// Storage token, pays for storage. Base unit: FROST.
    #[display("WAL")]
    #[serde(rename = "WAL")]
    Wal,
}
impl Token {
    pub const DECIMALS: u32 = 9;

    pub fn base_unit(self) -> &'static str {
        match self {
            Self::Sui => "MIST",
            Self::Wal => "FROST",
        }
    }

    /// Human-readable rendering of `amount`, e.g. `1.500000000 WAL (1500000000 FROST)`.
    pub fn format(self, amount: Amount) -> String {
        format!("{} {self} ({amount} {})", amount.whole(), self.base_unit())
    }
}

/// When a stored blob stops being guaranteed available.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Expiration {
    /// The last epoch, as reported by the storage client.
    #[display("epoch {_0}")]
    Epoch(u64),
    /// Stored for the maximum duration the network allows, at the time of
    /// the request.
    #[display("unbounded")]
    Unbounded,
}
impl Serialize for Expiration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Epoch(epoch) => serializer.serialize_u64(*epoch),
            Self::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}
impl<'de> Deserialize<'de> for Expiration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Epoch(u64),
            Token(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Epoch(epoch) => Ok(Self::Epoch(epoch)),
            Repr::Token(token) if token == "unbounded" => Ok(Self::Unbounded),
            Repr::Token(token) => Err(de::Error::invalid_value(de::Unexpected::Str(&token), &"an epoch or \"unbounded\"")),
        }
    }
}

/// What the storage client reported for a successfully processed item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stored {
    pub blob_id: String,
    pub size: u64,
    pub encoded_size: Option<u64>,
    pub cost: Amount,
    pub shared: bool,
    pub expires: Option<Expiration>,
}

/// The persisted outcome of processing one [`WorkItem`].
///
/// Only [`Status::Success`] records carry a blob ID; only [`Status::Failed`]
/// records carry an error. Anything else is rejected by [`validate`](Self::validate)
/// when a record is loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub key: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    /// Unencoded size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_size: Option<u64>,
    /// Storage cost in FROST; zero unless successful.
    pub cost: Amount,
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
impl ItemResult {
    pub fn success(key: impl Into<String>, stored: Stored) -> Self {
        Self {
            key: key.into(),
            status: Status::Success,
            blob_id: Some(stored.blob_id),
            size: stored.size,
            encoded_size: stored.encoded_size,
            cost: stored.cost,
            shared: stored.shared,
            expires: stored.expires,
            error: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn failure(item: &WorkItem, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            status: Status::Failed,
            ..Self::pending(item)
        }
    }

    /// Placeholder for an item that never finished (an interrupted run).
    pub fn pending(item: &WorkItem) -> Self {
        Self {
            key: item.key.clone(),
            status: Status::Pending,
            blob_id: None,
            size: item.size,
            encoded_size: None,
            cost: Amount::ZERO,
            shared: false,
            expires: None,
            error: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Check the field combinations every record must satisfy.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self.status {
            Status::Success => {
                if self.blob_id.as_deref().is_none_or(str::is_empty) {
                    return Err("successful result without a blob ID");
                }
                if self.error.is_some() {
                    return Err("successful result with an error");
                }
            },
            Status::Failed => {
                if self.error.as_deref().is_none_or(str::is_empty) {
                    return Err("failed result without an error");
                }
                if self.blob_id.is_some() || self.cost != Amount::ZERO {
                    return Err("failed result with a blob ID or cost");
                }
            },
            Status::Pending => {
                if self.blob_id.is_some() || self.error.is_some() {
                    return Err("pending result with an outcome");
                }
            },
        }
        Ok(())
    }
}
