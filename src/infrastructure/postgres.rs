use crate::domain::account::{Account, AccountId, Balance, NewAccount};
use crate::domain::entry::{LedgerLogEntry, TransferLogEntry};
use crate::domain::ports::{LedgerStore, LedgerTx, LedgerTxBox};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Statements applied by [`PostgresLedgerStore::ensure_schema`]. Every statement is
/// idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS currency (
        code TEXT PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS account (
        id BIGSERIAL PRIMARY KEY,
        owner TEXT NOT NULL,
        currency TEXT NOT NULL REFERENCES currency (code),
        name TEXT NOT NULL,
        balance NUMERIC(21, 8) NOT NULL DEFAULT 0,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS deposit_and_withdrawal_log (
        id BIGSERIAL PRIMARY KEY,
        account BIGINT NOT NULL REFERENCES account (id),
        amount NUMERIC(21, 8) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS transfer_log (
        id BIGSERIAL PRIMARY KEY,
        from_account BIGINT NOT NULL REFERENCES account (id),
        to_account BIGINT NOT NULL REFERENCES account (id),
        exchange_rate NUMERIC(21, 8) NOT NULL,
        from_amount NUMERIC(21, 8) NOT NULL,
        to_amount NUMERIC(21, 8) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

const ACCOUNT_COLUMNS: &str = "id, owner, currency, name, balance, is_deleted";

type AccountRow = (i64, String, String, String, Decimal, bool);

fn account_from_row((id, owner, currency, name, balance, is_deleted): AccountRow) -> Account {
    Account {
        id: AccountId(id),
        owner,
        currency,
        name,
        balance: Balance::new(balance),
        is_deleted,
    }
}

/// Connection pool settings.
#[derive(Clone, Debug)]
pub struct DbPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DbPoolConfig {
    /// Reads the `DB_POOL_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            max_connections: std::env::var("DB_POOL_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            max_lifetime: Duration::from_secs(
                std::env::var("DB_POOL_MAX_LIFETIME_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1800),
            ),
            idle_timeout: Duration::from_secs(
                std::env::var("DB_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            acquire_timeout: Duration::from_secs(
                std::env::var("DB_POOL_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// A ledger store backed by PostgreSQL.
///
/// Each [`LedgerTx`] wraps one database transaction at the default isolation level.
/// Account reads take a row lock (`FOR UPDATE`), so two operations on the same
/// account serialize on the database instead of losing updates.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str, config: DbPoolConfig) -> Result<Self> {
        info!(
            max = config.max_connections,
            min = config.min_connections,
            "Creating database pool"
        );
        let options = PgConnectOptions::from_str(database_url)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the ledger tables when they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Adds `codes` to the currency catalog, skipping codes already present.
    pub async fn seed_currencies<I, S>(&self, codes: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for code in codes {
            sqlx::query("INSERT INTO currency (code) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(code.as_ref())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<LedgerTxBox> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn currency_exists(&mut self, code: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM currency WHERE code = $1)")
                .bind(code)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_account(&mut self, account: NewAccount) -> Result<Account> {
        let row: AccountRow = sqlx::query_as(&format!(
            "INSERT INTO account (owner, currency, name) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&account.owner)
        .bind(&account.currency)
        .bind(&account.name)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(account_from_row(row))
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(account_from_row))
    }

    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(account_from_row).collect())
    }

    async fn accounts_by_owner(&mut self, owner: &str) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account \
             WHERE owner = $1 AND is_deleted = FALSE ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(account_from_row).collect())
    }

    async fn all_accounts(&mut self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM account ORDER BY id"))
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows.into_iter().map(account_from_row).collect())
    }

    async fn mark_deleted(&mut self, id: AccountId) -> Result<()> {
        let done = sqlx::query("UPDATE account SET is_deleted = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(done.rows_affected(), id)
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<()> {
        let done = sqlx::query("UPDATE account SET balance = balance + $1 WHERE id = $2")
            .bind(delta)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(done.rows_affected(), id)
    }

    async fn append_ledger_log(&mut self, entry: &LedgerLogEntry) -> Result<()> {
        sqlx::query("INSERT INTO deposit_and_withdrawal_log (account, amount) VALUES ($1, $2)")
            .bind(entry.account.0)
            .bind(entry.amount)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_transfer_log(&mut self, entry: &TransferLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO transfer_log (from_account, to_account, exchange_rate, from_amount, to_amount) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.from_account.0)
        .bind(entry.to_account.0)
        .bind(entry.exchange_rate)
        .bind(entry.from_amount)
        .bind(entry.to_amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn expect_one_row(affected: u64, id: AccountId) -> Result<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(LedgerError::internal(format!(
            "expected one account row for {id}, updated {affected}"
        )))
    }
}
