use crate::application::engine::BalancePolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replays a CSV script of ledger commands and prints the resulting accounts.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ledger command CSV file
    pub script: PathBuf,

    /// JSON-lines quote feed applied to the price cache before the script runs
    #[arg(long, env = "FXLEDGER_QUOTES")]
    pub quotes: Option<PathBuf>,

    /// Symbols with a feed consumer
    #[arg(
        long,
        env = "FXLEDGER_SYMBOLS",
        value_delimiter = ',',
        default_value = "USDKRW,EURUSD,BTCUSD"
    )]
    pub symbols: Vec<String>,

    /// Currency catalog seeded into the store
    #[arg(
        long,
        env = "FXLEDGER_CURRENCIES",
        value_delimiter = ',',
        default_value = "USD,KRW,EUR,BTC"
    )]
    pub currencies: Vec<String>,

    /// Reject withdrawals and trade debits larger than the balance
    #[arg(long, env = "FXLEDGER_REQUIRE_SUFFICIENT_BALANCE")]
    pub require_sufficient_balance: bool,

    /// Seconds to wait for each feed worker at shutdown
    #[arg(long, env = "FXLEDGER_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub drain_timeout_secs: u64,

    /// Bound of each per-symbol feed queue
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub feed_capacity: u64,

    /// PostgreSQL connection string. Requires the `storage-postgres` feature.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub script: PathBuf,
    pub quotes: Option<PathBuf>,
    pub symbols: Vec<String>,
    pub currencies: Vec<String>,
    pub balance_policy: BalancePolicy,
    pub drain_timeout: Duration,
    pub feed_capacity: usize,
    pub database_url: Option<String>,
}

impl From<Cli> for LedgerConfig {
    fn from(cli: Cli) -> Self {
        let balance_policy = if cli.require_sufficient_balance {
            BalancePolicy::RequireSufficient
        } else {
            BalancePolicy::AllowNegative
        };

        Self {
            script: cli.script,
            quotes: cli.quotes,
            symbols: normalize(cli.symbols),
            currencies: normalize(cli.currencies),
            balance_policy,
            drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
            feed_capacity: usize::try_from(cli.feed_capacity).unwrap_or(usize::MAX),
            database_url: cli.database_url.filter(|url| !url.trim().is_empty()),
        }
    }
}

// Trims, upper-cases and dedups while keeping first-seen order.
fn normalize(codes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim().to_ascii_uppercase();
        if !code.is_empty() && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}
