use clap::Parser;
use fxledger::application::engine::LedgerEngine;
use fxledger::application::price_cache::PriceCache;
use fxledger::application::supervisor::TaskSupervisor;
use fxledger::config::{Cli, LedgerConfig};
use fxledger::domain::ports::LedgerStoreBox;
use fxledger::error::LedgerError;
use fxledger::infrastructure::in_memory::InMemoryLedgerStore;
use fxledger::interfaces::csv::account_writer::AccountWriter;
use fxledger::interfaces::csv::command_reader::{CommandReader, LedgerCommand};
use fxledger::interfaces::feed::consumer::PriceFeedConsumer;
use fxledger::interfaces::feed::router::{FeedRouter, ReplayStats};
use fxledger::interfaces::feed::shutdown::Shutdown;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "storage-postgres")]
async fn open_store(config: &LedgerConfig) -> Result<LedgerStoreBox> {
    use fxledger::infrastructure::postgres::{DbPoolConfig, PostgresLedgerStore};

    if let Some(url) = &config.database_url {
        let store = PostgresLedgerStore::connect(url, DbPoolConfig::from_env())
            .await
            .into_diagnostic()?;
        store.ensure_schema().await.into_diagnostic()?;
        store
            .seed_currencies(&config.currencies)
            .await
            .into_diagnostic()?;
        return Ok(Box::new(store));
    }
    Ok(in_memory_store(config))
}

#[cfg(not(feature = "storage-postgres"))]
async fn open_store(config: &LedgerConfig) -> Result<LedgerStoreBox> {
    if config.database_url.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --database-url, but 'storage-postgres' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_store(config))
}

fn in_memory_store(config: &LedgerConfig) -> LedgerStoreBox {
    Box::new(InMemoryLedgerStore::with_currencies(
        config.currencies.iter().cloned(),
    ))
}

async fn execute(engine: &LedgerEngine, command: LedgerCommand) -> fxledger::error::Result<()> {
    match command {
        LedgerCommand::Create {
            owner,
            currency,
            name,
        } => {
            engine.create_account(&owner, &currency, &name).await?;
        }
        LedgerCommand::Deposit { account, amount } => engine.deposit(account, &amount).await?,
        LedgerCommand::Withdraw { account, amount } => engine.withdraw(account, &amount).await?,
        LedgerCommand::Delete { account } => engine.delete_account(account).await?,
        LedgerCommand::List { owner } => {
            let accounts = engine.list_accounts(&owner).await?;
            let ids: Vec<i64> = accounts.iter().map(|a| a.id.0).collect();
            info!(%owner, accounts = ?ids, "Listed accounts");
        }
        LedgerCommand::Order(req) => {
            engine.market_order(&req).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = LedgerConfig::from(Cli::parse());

    let store = open_store(&config).await?;
    let prices = Arc::new(PriceCache::new());
    let engine =
        LedgerEngine::new(store, Arc::clone(&prices)).with_policy(config.balance_policy);

    // Feed consumers, one per tracked symbol
    let supervisor = TaskSupervisor::new();
    let shutdown = Shutdown::new();
    let (router, deliveries) = FeedRouter::new(config.symbols.iter().cloned(), config.feed_capacity);
    PriceFeedConsumer::new(Arc::clone(&prices)).start(deliveries, &shutdown, &supervisor);

    // Replay the quote feed, then close it so every worker applies its backlog and exits.
    let quotes = config.quotes.clone();
    let warm_up = async move {
        let stats = match quotes {
            Some(path) => {
                let file = tokio::fs::File::open(&path).await?;
                router.replay(BufReader::new(file)).await?
            }
            None => ReplayStats::default(),
        };
        drop(router);
        Ok::<_, LedgerError>(stats)
    };

    let interrupted = tokio::select! {
        stats = warm_up => {
            let stats = stats.into_diagnostic()?;
            info!(routed = stats.routed, dropped = stats.dropped, "Quote feed closed");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping feed consumers");
            shutdown.trigger();
            true
        }
    };

    let report = supervisor.drain_all(config.drain_timeout).await;
    if !report.is_clean() {
        warn!(stuck = ?report.timed_out, "Some feed workers did not stop in time");
    }
    if interrupted {
        return Ok(());
    }
    info!(symbols = ?prices.symbols(), "Price cache ready");

    // Process ledger commands
    let file = File::open(&config.script).into_diagnostic()?;
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                if let Err(e) = execute(&engine, command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Output final state
    let accounts = engine.all_accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
