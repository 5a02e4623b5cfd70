use crate::domain::account::{Account, AccountId, Balance, NewAccount, to_numeric};
use crate::domain::entry::{LedgerLogEntry, TransferLogEntry};
use crate::domain::ports::{LedgerStore, LedgerTx, LedgerTxBox};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    currencies: HashSet<String>,
    accounts: BTreeMap<AccountId, Account>,
    last_id: i64,
    ledger_log: Vec<LedgerLogEntry>,
    transfer_log: Vec<TransferLogEntry>,
}

/// A transactional in-memory ledger store.
///
/// Transactions are serialized: `begin` takes an exclusive lock on the whole state and
/// works on a staged copy that replaces the shared state only on commit. Ideal for
/// testing and the CLI where persistence is not required.
///
/// The inspection helpers (`ledger_log`, `transfer_log`) take the same lock, so they
/// must not be awaited while a transaction is open on the same task.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store with an empty currency catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose currency catalog holds `codes`.
    pub fn with_currencies<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = LedgerState {
            currencies: codes.into_iter().map(Into::into).collect(),
            ..LedgerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn add_currency(&self, code: impl Into<String>) {
        self.state.lock().await.currencies.insert(code.into());
    }

    /// Committed deposit/withdrawal journal, oldest first.
    pub async fn ledger_log(&self) -> Vec<LedgerLogEntry> {
        self.state.lock().await.ledger_log.clone()
    }

    /// Committed transfer journal, oldest first.
    pub async fn transfer_log(&self) -> Vec<TransferLogEntry> {
        self.state.lock().await.transfer_log.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<LedgerTxBox> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(InMemoryTx { guard, staged }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

impl InMemoryTx {
    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.staged
            .accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::internal(format!("account row {id} does not exist")))
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn currency_exists(&mut self, code: &str) -> Result<bool> {
        Ok(self.staged.currencies.contains(code))
    }

    async fn insert_account(&mut self, account: NewAccount) -> Result<Account> {
        if !self.staged.currencies.contains(&account.currency) {
            return Err(LedgerError::internal(format!(
                "foreign key violation: currency {}",
                account.currency
            )));
        }
        self.staged.last_id += 1;
        let account = Account::open(AccountId(self.staged.last_id), account);
        self.staged.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.staged.accounts.get(&id).cloned())
    }

    // The whole store is already held by this transaction.
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.staged.accounts.get(&id).cloned())
            .collect())
    }

    async fn accounts_by_owner(&mut self, owner: &str) -> Result<Vec<Account>> {
        Ok(self
            .staged
            .accounts
            .values()
            .filter(|a| a.owner == owner && !a.is_deleted)
            .cloned()
            .collect())
    }

    async fn all_accounts(&mut self) -> Result<Vec<Account>> {
        Ok(self.staged.accounts.values().cloned().collect())
    }

    async fn mark_deleted(&mut self, id: AccountId) -> Result<()> {
        self.account_mut(id)?.is_deleted = true;
        Ok(())
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Decimal) -> Result<()> {
        let account = self.account_mut(id)?;
        let updated = to_numeric(account.balance.0 + delta)
            .map_err(|e| LedgerError::internal(format!("numeric field overflow: {e}")))?;
        account.balance = Balance::new(updated);
        Ok(())
    }

    async fn append_ledger_log(&mut self, entry: &LedgerLogEntry) -> Result<()> {
        self.staged.ledger_log.push(entry.clone());
        Ok(())
    }

    async fn append_transfer_log(&mut self, entry: &TransferLogEntry) -> Result<()> {
        self.staged.transfer_log.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
