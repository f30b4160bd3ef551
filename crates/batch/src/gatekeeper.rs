use crate::error::{ErrorKind, Result};
use crate::models::{Amount, Token};
use exn::ResultExt;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use walsim_gateway::error::ErrorKind as GatewayErrorKind;
use walsim_gateway::{GatewayHandle, Outcome, Tool};

/// Wallet balances at one point in time, in base units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// SUI, in MIST.
    pub native: Amount,
    /// WAL, in FROST.
    pub storage: Amount,
}

/// The gatekeeper's verdict on a projected cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Authorized(BalanceSnapshot),
    InsufficientFunds { token: Token, needed: Amount, available: Amount },
}

/// Checks the wallet can fund a run before anything is paid for.
///
/// Fails closed: if the balance cannot be read or understood, nothing is
/// authorized.
#[derive(Clone)]
pub struct Gatekeeper {
    gateway: GatewayHandle,
    timeout: Duration,
    min_native: Amount,
}

impl Gatekeeper {
    pub fn new(gateway: GatewayHandle, timeout: Duration, min_native: Amount) -> Self {
        Self { gateway, timeout, min_native }
    }

    /// Query the active wallet's balances with `sui client balance --json`.
    pub async fn snapshot(&self) -> Result<BalanceSnapshot> {
        let args = ["client", "balance", "--json"].map(String::from);
        let outcome = match self.gateway.invoke(Tool::Sui, &args, self.timeout).await {
            Ok(outcome) => outcome,
            Err(e) if matches!(&*e, GatewayErrorKind::Launch(_)) => return Err(e).or_raise(|| ErrorKind::Launch),
            Err(e) => {
                let reason = (*e).to_string();
                return Err(e).or_raise(|| ErrorKind::Balance(reason.clone()));
            },
        };
        match outcome {
            Outcome::Completed { stdout, .. } => parse_balances(&stdout),
            Outcome::NonZeroExit { code, stdout, stderr } => {
                let output = if stderr.trim().is_empty() { stdout } else { stderr };
                exn::bail!(ErrorKind::Balance(format!("sui exited with {code:?}: {}", output.trim())))
            },
            Outcome::TimedOut { after } => exn::bail!(ErrorKind::Balance(format!("timed out after {}s", after.as_secs()))),
        }
    }

    /// Decide whether a run costing `projected` FROST may proceed.
    ///
    /// The storage balance must cover `projected`, and the native balance
    /// must reach the configured minimum so that gas can be paid.
    pub async fn authorize(&self, projected: Amount) -> Result<Authorization> {
        let snapshot = self.snapshot().await?;
        tracing::info!(
            sui = %Token::Sui.format(snapshot.native),
            wal = %Token::Wal.format(snapshot.storage),
            projected = %Token::Wal.format(projected),
            "Wallet balance"
        );
        if snapshot.native < self.min_native {
            return Ok(Authorization::InsufficientFunds {
                token: Token::Sui,
                needed: self.min_native,
                available: snapshot.native,
            });
        }
        if snapshot.storage < projected {
            return Ok(Authorization::InsufficientFunds {
                token: Token::Wal,
                needed: projected,
                available: snapshot.storage,
            });
        }
        Ok(Authorization::Authorized(snapshot))
    }
}

#[derive(Deserialize)]
struct CoinMetadata {
    symbol: Option<String>,
}

#[derive(Deserialize)]
struct Coin {
    balance: Amount,
}

type CoinGroup = (Option<CoinMetadata>, Vec<Coin>);

#[derive(Deserialize)]
#[serde(untagged)]
enum BalanceOutput {
    /// Groups followed by the "has more" pagination flag.
    Paged(Vec<CoinGroup>, IgnoredAny),
    Groups(Vec<CoinGroup>),
}

/// Sum every coin of SUI and WAL in `sui client balance --json` output.
///
/// A token with no coins at all has a zero balance; output that cannot be
/// understood is an error.
fn parse_balances(stdout: &str) -> Result<BalanceSnapshot> {
    let output: BalanceOutput =
        serde_json::from_str(stdout.trim()).or_raise(|| ErrorKind::Balance("unrecognised balance output".into()))?;
    let groups = match output {
        BalanceOutput::Paged(groups, _) | BalanceOutput::Groups(groups) => groups,
    };
    let mut snapshot = BalanceSnapshot { native: Amount::ZERO, storage: Amount::ZERO };
    for (metadata, coins) in groups {
        let Some(symbol) = metadata.and_then(|m| m.symbol) else {
            continue;
        };
        let total: Amount = coins.into_iter().map(|coin| coin.balance).sum();
        if symbol.eq_ignore_ascii_case("SUI") {
            snapshot.native = snapshot.native + total;
        } else if symbol.eq_ignore_ascii_case("WAL") {
            snapshot.storage = snapshot.storage + total;
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use walsim_gateway::MockGateway;

    const BALANCES: &str = r#"[
        [
            [
                {"decimals":9,"name":"Sui","symbol":"SUI","description":"","iconUrl":null,"id":null},
                [
                    {"coinType":"0x2::sui::SUI","coinObjectId":"0x1","version":"1","digest":"d","balance":"1500000000","previousTransaction":"t"},
                    {"coinType":"0x2::sui::SUI","coinObjectId":"0x2","version":"1","digest":"d","balance":"500000000","previousTransaction":"t"}
                ]
            ],
            [
                {"decimals":9,"name":"WAL Token","symbol":"WAL","description":"","iconUrl":null,"id":"0x3"},
                [
                    {"coinType":"0x356a::wal::WAL","coinObjectId":"0x4","version":"1","digest":"d","balance":"30","previousTransaction":"t"}
                ]
            ]
        ],
        false
    ]"#;

    fn gatekeeper(outcome: Outcome) -> Gatekeeper {
        let gateway = MockGateway::new(move |tool, args| {
            assert_eq!(tool, Tool::Sui);
            assert_eq!(args, ["client", "balance", "--json"]);
            Ok(outcome.clone())
        });
        Gatekeeper::new(Arc::new(gateway), Duration::from_secs(5), Amount::new(1))
    }

    #[test]
    fn test_parse_sums_every_coin() {
        let snapshot = parse_balances(BALANCES).unwrap();
        assert_eq!(snapshot.native, Amount::new(2_000_000_000));
        assert_eq!(snapshot.storage, Amount::new(30));
    }

    #[test]
    fn test_parse_missing_token_is_zero() {
        let snapshot = parse_balances(r#"[[[{"symbol":"SUI"},[{"balance":"7"}]]],false]"#).unwrap();
        assert_eq!(snapshot.native, Amount::new(7));
        assert_eq!(snapshot.storage, Amount::ZERO);
    }

    #[test]
    fn test_parse_ignores_pagination_flag() {
        let snapshot = parse_balances(r#"[[[{"symbol":"WAL"},[{"balance":"4"}]]],true]"#).unwrap();
        assert_eq!(snapshot.storage, Amount::new(4));
        let groups = parse_balances(r#"[[{"symbol":"WAL"},[{"balance":"4"}]]]"#).unwrap();
        assert_eq!(groups, snapshot);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_balances("No active address").is_err());
        assert!(parse_balances(r#"[[[{"symbol":"WAL"},[{"balance":"-3"}]]],false]"#).is_err());
    }

    #[tokio::test]
    async fn test_authorized() {
        let verdict = gatekeeper(Outcome::completed(BALANCES)).authorize(Amount::new(30)).await.unwrap();
        assert!(matches!(verdict, Authorization::Authorized(snapshot) if snapshot.storage == Amount::new(30)));
    }

    #[tokio::test]
    async fn test_insufficient_storage_token() {
        let verdict = gatekeeper(Outcome::completed(BALANCES)).authorize(Amount::new(31)).await.unwrap();
        assert_eq!(
            verdict,
            Authorization::InsufficientFunds { token: Token::Wal, needed: Amount::new(31), available: Amount::new(30) }
        );
    }

    #[tokio::test]
    async fn test_insufficient_native_token() {
        let output = r#"[[[{"symbol":"WAL"},[{"balance":"100"}]]],false]"#;
        let verdict = gatekeeper(Outcome::completed(output)).authorize(Amount::new(1)).await.unwrap();
        assert!(matches!(verdict, Authorization::InsufficientFunds { token: Token::Sui, .. }));
    }

    #[tokio::test]
    async fn test_fails_closed() {
        let err = gatekeeper(Outcome::failed(1, "Cannot find client config")).authorize(Amount::ZERO).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Balance(_)));

        let err = gatekeeper(Outcome::TimedOut { after: Duration::from_secs(60) }).authorize(Amount::ZERO).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Balance("timed out after 60s".into()));

        let err = gatekeeper(Outcome::completed("{}")).authorize(Amount::ZERO).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Balance(_)));
    }
}
