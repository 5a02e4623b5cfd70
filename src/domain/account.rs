use crate::error::{LedgerError, Result};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::LazyLock;

/// Total digits of the `numeric(21,8)` balance column.
pub const NUMERIC_PRECISION: u32 = 21;
/// Fractional digits of the `numeric(21,8)` balance column.
pub const NUMERIC_SCALE: u32 = 8;

static NUMERIC_21_8: LazyLock<Regex> = LazyLock::new(|| {
    let int_digits = NUMERIC_PRECISION - NUMERIC_SCALE;
    Regex::new(&format!(
        r"^[0-9]{{1,{int_digits}}}(\.[0-9]{{1,{NUMERIC_SCALE}}})?$"
    ))
    .expect("numeric pattern is valid")
});

/// Largest magnitude a `numeric(21,8)` column can hold.
fn numeric_limit() -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(NUMERIC_PRECISION) - 1, NUMERIC_SCALE)
}

/// Rounds `value` the way a `numeric(21,8)` column stores it and checks the range.
pub fn to_numeric(value: Decimal) -> Result<Decimal> {
    let rounded = value.round_dp_with_strategy(NUMERIC_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded.abs() > numeric_limit() {
        return Err(LedgerError::Validation(format!(
            "{value} is out of numeric({NUMERIC_PRECISION},{NUMERIC_SCALE}) range"
        )));
    }
    Ok(rounded)
}

/// Store-assigned account identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative amount that is representable as `numeric(21,8)`.
///
/// Only constructed from its textual form, so a value that passed validation is the
/// exact value the store will persist.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Amount(Decimal);

impl Amount {
    pub fn parse(raw: &str) -> Result<Self> {
        if !NUMERIC_21_8.is_match(raw) {
            return Err(LedgerError::Validation(format!(
                "invalid value: {raw} must be a valid numeric({NUMERIC_PRECISION},{NUMERIC_SCALE}) value"
            )));
        }
        raw.parse::<Decimal>()
            .map(Self)
            .map_err(|e| LedgerError::Validation(format!("invalid value: {raw}: {e}")))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Account balance as held by the store.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Everything needed to open an account; the id and balance come from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub owner: String,
    pub currency: String,
    pub name: String,
}

/// An account row.
///
/// `currency` never changes after creation and `is_deleted` is terminal: a deleted
/// account keeps its balance and history but accepts no further operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub currency: String,
    pub name: String,
    pub balance: Balance,
    #[serde(rename = "deleted")]
    pub is_deleted: bool,
}

impl Account {
    pub fn open(id: AccountId, new: NewAccount) -> Self {
        Self {
            id,
            owner: new.owner,
            currency: new.currency,
            name: new.name,
            balance: Balance::ZERO,
            is_deleted: false,
        }
    }

    /// Fails with `Conflict` once the account has been soft-deleted.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_deleted {
            Err(LedgerError::Conflict(format!("account: {}", self.id)))
        } else {
            Ok(())
        }
    }
}
