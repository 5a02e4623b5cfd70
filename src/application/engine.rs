use crate::application::price_cache::PriceCache;
use crate::domain::account::{Account, AccountId, Amount, NewAccount, to_numeric};
use crate::domain::entry::{LedgerLogEntry, TransferLogEntry};
use crate::domain::ports::{LedgerStoreBox, LedgerTx, LedgerTxBox};
use crate::domain::trade::{OrderType, Side, TradeRequest};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether debits may take a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancePolicy {
    /// Withdrawals and trade debits are applied regardless of the current balance.
    #[default]
    AllowNegative,
    /// Debits larger than the balance read inside the transaction fail with
    /// `InsufficientFunds`.
    RequireSufficient,
}

/// The ledger and settlement engine.
///
/// Every operation runs in exactly one store transaction: it is committed when the
/// operation succeeds and rolled back on any failure, so a failed call never leaves a
/// partial change behind. Concurrent operations on the same account are isolated by
/// the store, not by the engine.
pub struct LedgerEngine {
    store: LedgerStoreBox,
    prices: Arc<PriceCache>,
    policy: BalancePolicy,
}

impl LedgerEngine {
    /// Creates a new `LedgerEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The transactional store holding accounts and journals.
    /// * `prices` - The quote cache read by market orders.
    pub fn new(store: LedgerStoreBox, prices: Arc<PriceCache>) -> Self {
        Self {
            store,
            prices,
            policy: BalancePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BalancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// Opens an account in `currency` for `owner`. Fails with `NotFound` when the
    /// currency is not in the catalog.
    pub async fn create_account(&self, owner: &str, currency: &str, name: &str) -> Result<Account> {
        let mut tx = self.begin("create_account").await?;
        let result = async {
            if !tx.currency_exists(currency).await? {
                return Err(LedgerError::NotFound(format!("currency {currency}")));
            }
            tx.insert_account(NewAccount {
                owner: owner.to_string(),
                currency: currency.to_string(),
                name: name.to_string(),
            })
            .await
        }
        .await;

        let account = self.finish("create_account", tx, result).await?;
        info!(account = %account.id, owner, currency, "Account created");
        Ok(account)
    }

    /// Credits `amount` to the account and journals it.
    pub async fn deposit(&self, account: AccountId, amount: &str) -> Result<()> {
        let amount = Amount::parse(amount)?;

        let mut tx = self.begin("deposit").await?;
        let result = async {
            active_account(&mut *tx, account).await?;
            tx.append_ledger_log(&LedgerLogEntry::deposit(account, amount.value()))
                .await?;
            tx.adjust_balance(account, amount.value()).await
        }
        .await;

        self.finish("deposit", tx, result).await?;
        debug!(%account, amount = %amount.value(), "Deposit applied");
        Ok(())
    }

    /// Debits `amount` from the account and journals it as a negative entry.
    ///
    /// The balance is only checked under [`BalancePolicy::RequireSufficient`].
    pub async fn withdraw(&self, account: AccountId, amount: &str) -> Result<()> {
        let amount = Amount::parse(amount)?;

        let mut tx = self.begin("withdraw").await?;
        let result = async {
            let row = active_account(&mut *tx, account).await?;
            self.ensure_covers(&row, amount.value())?;
            tx.append_ledger_log(&LedgerLogEntry::withdrawal(account, amount.value()))
                .await?;
            tx.adjust_balance(account, -amount.value()).await
        }
        .await;

        self.finish("withdraw", tx, result).await?;
        debug!(%account, amount = %amount.value(), "Withdrawal applied");
        Ok(())
    }

    /// Soft-deletes the account. Its balance and journal rows are kept.
    pub async fn delete_account(&self, account: AccountId) -> Result<()> {
        let mut tx = self.begin("delete_account").await?;
        let result = async {
            active_account(&mut *tx, account).await?;
            tx.mark_deleted(account).await
        }
        .await;

        self.finish("delete_account", tx, result).await?;
        info!(%account, "Account deleted");
        Ok(())
    }

    /// Non-deleted accounts owned by `owner`.
    pub async fn list_accounts(&self, owner: &str) -> Result<Vec<Account>> {
        let mut tx = self.begin("list_accounts").await?;
        let result = tx.accounts_by_owner(owner).await;
        self.finish("list_accounts", tx, result).await
    }

    /// The current row of one account, deleted or not.
    pub async fn account(&self, account: AccountId) -> Result<Account> {
        let mut tx = self.begin("account").await?;
        let result = async {
            tx.find_account(account)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("account {account}")))
        }
        .await;
        self.finish("account", tx, result).await
    }

    /// Every account in the store, ordered by id.
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        let mut tx = self.begin("all_accounts").await?;
        let result = tx.all_accounts().await;
        self.finish("all_accounts", tx, result).await
    }

    /// Validates a trade request and settles it at the cached quote.
    ///
    /// The quote is a snapshot taken before the settlement transaction starts; it may
    /// be superseded by the time the settlement commits.
    pub async fn market_order(&self, req: &TradeRequest) -> Result<TransferLogEntry> {
        let (base, quote) = self.resolve_pair(req).await?;

        let expected = format!("{}{}", base.currency, quote.currency);
        if req.symbol != expected {
            return Err(LedgerError::CurrencyMismatch {
                symbol: req.symbol.clone(),
                expected,
            });
        }
        if base.id == quote.id || base.currency == quote.currency {
            return Err(LedgerError::Validation(format!(
                "trade needs two accounts of different currencies, got {} and {}",
                base.id, quote.id
            )));
        }

        if req.r#type != OrderType::Market {
            return Err(LedgerError::Unsupported(format!(
                "order type {}",
                req.r#type
            )));
        }

        let quantity = Amount::parse(&req.quantity)?;
        if quantity.is_zero() {
            return Err(LedgerError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }

        if req.side == Side::Sell {
            return Err(LedgerError::Unsupported(format!("order side {}", req.side)));
        }

        let snapshot = self
            .prices
            .lookup(&req.symbol)
            .ok_or_else(|| LedgerError::NotFound(format!("symbol {}", req.symbol)))?;

        self.settle_buy(
            req.base_account,
            req.quote_account,
            quantity,
            snapshot.current_price,
        )
        .await
    }

    /// Settles a buy of `quantity` base units at `price` quote units each.
    ///
    /// Credits `quantity` to `base`, debits `price × quantity` from `quote` and records
    /// one transfer row, all in one transaction. The caller is responsible for checking
    /// that the accounts form the traded symbol.
    pub async fn settle_buy(
        &self,
        base: AccountId,
        quote: AccountId,
        quantity: Amount,
        price: Decimal,
    ) -> Result<TransferLogEntry> {
        if base == quote {
            return Err(LedgerError::Validation(format!(
                "cannot trade account {base} against itself"
            )));
        }
        if quantity.is_zero() {
            return Err(LedgerError::Validation(
                "quantity must be greater than zero".to_string(),
            ));
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "price must be positive, got {price}"
            )));
        }

        let product = price.checked_mul(quantity.value()).ok_or_else(|| {
            LedgerError::Validation(format!("{price} × {} overflows", quantity.value()))
        })?;
        let amount = to_numeric(product)?;
        // Rounded independently of the amount.
        let exchange_rate = product
            .checked_div(quantity.value())
            .ok_or_else(|| LedgerError::Validation("exchange rate is undefined".to_string()))
            .and_then(to_numeric)?;

        let entry = TransferLogEntry {
            from_account: quote,
            to_account: base,
            exchange_rate,
            from_amount: amount,
            to_amount: quantity.value(),
        };

        let mut tx = self.begin("settle_buy").await?;
        let result = async {
            let locked = tx.lock_accounts(&[base, quote]).await?;
            let buyer = pick_active(&locked, base)?;
            let payer = pick_active(&locked, quote)?;
            if buyer.currency == payer.currency {
                return Err(LedgerError::Validation(format!(
                    "accounts {base} and {quote} share currency {}",
                    payer.currency
                )));
            }
            self.ensure_covers(payer, amount)?;

            tx.append_transfer_log(&entry).await?;
            tx.adjust_balance(base, entry.to_amount).await?;
            tx.adjust_balance(quote, -entry.from_amount).await
        }
        .await;

        self.finish("settle_buy", tx, result).await?;
        info!(
            %base,
            %quote,
            quantity = %entry.to_amount,
            amount = %entry.from_amount,
            rate = %entry.exchange_rate,
            "Trade settled"
        );
        Ok(entry)
    }

    /// Reads both sides of a trade in a read-only transaction without locking them.
    async fn resolve_pair(&self, req: &TradeRequest) -> Result<(Account, Account)> {
        let mut tx = self.begin("market_order").await?;
        let result = async {
            let base = read_active(&mut *tx, req.base_account).await?;
            let quote = read_active(&mut *tx, req.quote_account).await?;
            Ok((base, quote))
        }
        .await;

        if let Err(e) = tx.rollback().await {
            error!(op = "market_order", error = ?e, "Failed to release read transaction");
        }
        result.map_err(|e| surface("market_order", e))
    }

    fn ensure_covers(&self, account: &Account, debit: Decimal) -> Result<()> {
        if self.policy == BalancePolicy::RequireSufficient && account.balance.0 < debit {
            return Err(LedgerError::InsufficientFunds {
                account: account.id.0,
                balance: account.balance.0,
                requested: debit,
            });
        }
        Ok(())
    }

    async fn begin(&self, op: &'static str) -> Result<LedgerTxBox> {
        self.store.begin().await.map_err(|e| surface(op, e))
    }

    /// Commits on success and rolls back on failure.
    async fn finish<T>(&self, op: &'static str, tx: LedgerTxBox, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(e) => Err(surface(op, e)),
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(op, error = ?rollback_err, "Failed to roll back transaction");
                }
                Err(surface(op, e))
            }
        }
    }
}

/// Logs infrastructure failures with full detail before they reach the caller,
/// whose view is limited to the generic message.
fn surface(op: &'static str, e: LedgerError) -> LedgerError {
    if let LedgerError::Internal(source) = &e {
        error!(op, error = %source, detail = ?source, "Ledger operation failed");
    }
    e
}

/// Locks one account row and checks it can be written.
async fn active_account(tx: &mut dyn LedgerTx, id: AccountId) -> Result<Account> {
    let locked = tx.lock_accounts(&[id]).await?;
    pick_active(&locked, id).cloned()
}

async fn read_active(tx: &mut dyn LedgerTx, id: AccountId) -> Result<Account> {
    let account = tx
        .find_account(id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("account {id}")))?;
    account.ensure_active()?;
    Ok(account)
}

fn pick_active(accounts: &[Account], id: AccountId) -> Result<&Account> {
    let account = accounts
        .iter()
        .find(|a| a.id == id)
        .ok_or_else(|| LedgerError::NotFound(format!("account {id}")))?;
    account.ensure_active()?;
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Balance;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn engine_with(store: &InMemoryLedgerStore) -> LedgerEngine {
        LedgerEngine::new(Box::new(store.clone()), Arc::new(PriceCache::new()))
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw() {
        let store = InMemoryLedgerStore::with_currencies(["USD"]);
        let engine = engine_with(&store);
        let account = engine.create_account("u1", "USD", "main").await.unwrap();

        engine.deposit(account.id, "100.0").await.unwrap();
        engine.withdraw(account.id, "40.5").await.unwrap();

        let account = engine.account(account.id).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(59.5)));

        let log = store.ledger_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].amount, dec!(-40.5));
    }

    #[tokio::test]
    async fn test_withdraw_may_go_negative_by_default() {
        let store = InMemoryLedgerStore::with_currencies(["USD"]);
        let engine = engine_with(&store);
        let account = engine.create_account("u1", "USD", "main").await.unwrap();

        engine.withdraw(account.id, "5").await.unwrap();
        let account = engine.account(account.id).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(-5)));
    }

    #[tokio::test]
    async fn test_require_sufficient_rejects_overdraft() {
        let store = InMemoryLedgerStore::with_currencies(["USD"]);
        let engine = engine_with(&store).with_policy(BalancePolicy::RequireSufficient);
        let account = engine.create_account("u1", "USD", "main").await.unwrap();
        engine.deposit(account.id, "10").await.unwrap();

        let err = engine.withdraw(account.id, "10.00000001").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        engine.withdraw(account.id, "10").await.unwrap();
        let account = engine.account(account.id).await.unwrap();
        assert_eq!(account.balance, Balance::ZERO);
        assert_eq!(store.ledger_log().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let store = InMemoryLedgerStore::with_currencies(["USD"]);
        let engine = engine_with(&store);

        assert!(matches!(
            engine.deposit(AccountId(99), "1").await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            engine.delete_account(AccountId(99)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(store.ledger_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_settle_buy_with_injected_quote() {
        let store = InMemoryLedgerStore::with_currencies(["BTC", "USD"]);
        let engine = engine_with(&store);
        let btc = engine.create_account("u1", "BTC", "cold").await.unwrap();
        let usd = engine.create_account("u1", "USD", "cash").await.unwrap();

        let entry = engine
            .settle_buy(btc.id, usd.id, Amount::parse("0.5").unwrap(), dec!(64000.123456789))
            .await
            .unwrap();

        assert_eq!(entry.from_amount, dec!(32000.06172839));
        assert_eq!(entry.to_amount, dec!(0.5));
        assert_eq!(entry.exchange_rate, dec!(64000.12345679));
        assert_eq!(
            engine.account(btc.id).await.unwrap().balance,
            Balance::new(dec!(0.5))
        );
        assert_eq!(
            engine.account(usd.id).await.unwrap().balance,
            Balance::new(dec!(-32000.06172839))
        );
    }

    #[tokio::test]
    async fn test_settle_buy_rejects_zero_quantity() {
        let store = InMemoryLedgerStore::with_currencies(["BTC", "USD"]);
        let engine = engine_with(&store);
        let btc = engine.create_account("u1", "BTC", "cold").await.unwrap();
        let usd = engine.create_account("u1", "USD", "cash").await.unwrap();

        let err = engine
            .settle_buy(btc.id, usd.id, Amount::parse("0").unwrap(), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(store.transfer_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_settle_buy_rejects_single_currency_pair() {
        let store = InMemoryLedgerStore::with_currencies(["USD"]);
        let engine = engine_with(&store);
        let a = engine.create_account("u1", "USD", "a").await.unwrap();
        let b = engine.create_account("u1", "USD", "b").await.unwrap();
        let qty = || Amount::parse("10").unwrap();

        for (base, quote) in [(a.id, a.id), (a.id, b.id)] {
            let err = engine.settle_buy(base, quote, qty(), dec!(2)).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "{base}/{quote}: {err:?}");
        }
        assert!(store.transfer_log().await.is_empty());
        assert_eq!(engine.account(a.id).await.unwrap().balance, Balance::ZERO);
        assert_eq!(engine.account(b.id).await.unwrap().balance, Balance::ZERO);
    }
}
