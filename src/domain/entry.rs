use super::account::AccountId;
use rust_decimal::Decimal;
use serde::Serialize;

/// One row of the deposit/withdrawal journal. Positive amounts are deposits,
/// negative amounts are withdrawals.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct LedgerLogEntry {
    pub account: AccountId,
    pub amount: Decimal,
}

impl LedgerLogEntry {
    pub fn deposit(account: AccountId, amount: Decimal) -> Self {
        Self { account, amount }
    }

    pub fn withdrawal(account: AccountId, amount: Decimal) -> Self {
        Self {
            account,
            amount: -amount,
        }
    }
}

/// One settled trade. `from_account` pays `from_amount`, `to_account` receives
/// `to_amount`, and `exchange_rate` is `from_amount / to_amount`.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct TransferLogEntry {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub exchange_rate: Decimal,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_withdrawal_is_negative() {
        let entry = LedgerLogEntry::withdrawal(AccountId(1), dec!(2.5));
        assert_eq!(entry.amount, dec!(-2.5));
        let entry = LedgerLogEntry::deposit(AccountId(1), dec!(2.5));
        assert_eq!(entry.amount, dec!(2.5));
    }
}
