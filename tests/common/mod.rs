#![allow(dead_code)]

use async_trait::async_trait;
use fxledger::application::engine::LedgerEngine;
use fxledger::application::price_cache::PriceCache;
use fxledger::domain::account::{Account, AccountId, NewAccount};
use fxledger::domain::entry::{LedgerLogEntry, TransferLogEntry};
use fxledger::domain::ports::{LedgerStore, LedgerTx, LedgerTxBox};
use fxledger::error::{LedgerError, Result};
use fxledger::infrastructure::in_memory::InMemoryLedgerStore;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const CURRENCIES: [&str; 4] = ["USD", "KRW", "EUR", "BTC"];

pub struct Harness {
    pub store: InMemoryLedgerStore,
    pub prices: Arc<PriceCache>,
    pub engine: LedgerEngine,
}

pub fn harness() -> Harness {
    let store = InMemoryLedgerStore::with_currencies(CURRENCIES);
    let prices = Arc::new(PriceCache::new());
    let engine = LedgerEngine::new(Box::new(store.clone()), Arc::clone(&prices));
    Harness {
        store,
        prices,
        engine,
    }
}

impl Harness {
    pub async fn open(&self, owner: &str, currency: &str) -> Account {
        self.engine
            .create_account(owner, currency, &format!("{currency} wallet"))
            .await
            .unwrap()
    }

    /// Full committed state, used to assert that a failed call changed nothing.
    pub async fn snapshot(&self) -> (Vec<Account>, Vec<LedgerLogEntry>, Vec<TransferLogEntry>) {
        (
            self.engine.all_accounts().await.unwrap(),
            self.store.ledger_log().await,
            self.store.transfer_log().await,
        )
    }
}

/// Delegates to an in-memory store but fails every commit, rolling the work back.
#[derive(Clone)]
pub struct FailingCommitStore {
    inner: InMemoryLedgerStore,
}

impl FailingCommitStore {
    pub fn new(inner: InMemoryLedgerStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LedgerStore for FailingCommitStore {
    async fn begin(&self) -> Result<LedgerTxBox> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingCommitTx { inner }))
    }
}

struct FailingCommitTx {
    inner: LedgerTxBox,
}

#[async_trait]
impl LedgerTx for FailingCommitTx {
    async fn currency_exists(&mut self, code: &str) -> Result<bool> {
        self.inner.currency_exists(code).await
    }

    async fn insert_account(&mut self, account: NewAccount) -> Result<Account> {
        self.inner.insert_account(account).await
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        self.inner.find_account(id).await
    }

    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>> {
        self.inner.lock_accounts(ids).await
    }

    async fn accounts_by_owner(&mut self, owner: &str) -> Result<Vec<Account>> {
        self.inner.accounts_by_owner(owner).await
    }

    async fn all_accounts(&mut self) -> Result<Vec<Account>> {
        self.inner.all_accounts().await
    }

    async fn mark_deleted(&mut self, id: AccountId) -> Result<()> {
        self.inner.mark_deleted(id).await
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<()> {
        self.inner.adjust_balance(id, delta).await
    }

    async fn append_ledger_log(&mut self, entry: &LedgerLogEntry) -> Result<()> {
        self.inner.append_ledger_log(entry).await
    }

    async fn append_transfer_log(&mut self, entry: &TransferLogEntry) -> Result<()> {
        self.inner.append_transfer_log(entry).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let FailingCommitTx { inner } = *self;
        inner.rollback().await?;
        Err(LedgerError::internal("connection closed during COMMIT"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let FailingCommitTx { inner } = *self;
        inner.rollback().await
    }
}
