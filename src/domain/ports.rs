use super::account::{Account, AccountId, NewAccount};
use super::entry::{LedgerLogEntry, TransferLogEntry};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A relational store that hands out ACID transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<LedgerTxBox>;
}

/// One open store transaction.
///
/// Writes become visible to other transactions only after [`LedgerTx::commit`]
/// succeeds. Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait LedgerTx: Send {
    async fn currency_exists(&mut self, code: &str) -> Result<bool>;
    async fn insert_account(&mut self, account: NewAccount) -> Result<Account>;
    /// Reads an account row without locking it.
    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>>;
    /// Reads and locks the given account rows for the rest of the transaction.
    ///
    /// Rows are locked and returned in ascending id order whatever the order of
    /// `ids`. Missing ids are left out of the result.
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>>;
    async fn accounts_by_owner(&mut self, owner: &str) -> Result<Vec<Account>>;
    async fn all_accounts(&mut self) -> Result<Vec<Account>>;
    async fn mark_deleted(&mut self, id: AccountId) -> Result<()>;
    /// Adds a signed `delta` to the account balance.
    async fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<()>;
    async fn append_ledger_log(&mut self, entry: &LedgerLogEntry) -> Result<()>;
    async fn append_transfer_log(&mut self, entry: &TransferLogEntry) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type LedgerTxBox = Box<dyn LedgerTx>;
