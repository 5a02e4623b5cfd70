use super::account::AccountId;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

/// A request to trade the base currency against the quote currency.
///
/// `symbol` must be the base account's currency followed by the quote account's
/// currency, e.g. `USDKRW` for a USD base account and a KRW quote account. A buy
/// credits `quantity` units of base currency and debits `price × quantity` units of
/// quote currency.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TradeRequest {
    #[serde(rename = "base_account_id")]
    pub base_account: AccountId,
    #[serde(rename = "quote_account_id")]
    pub quote_account: AccountId,
    pub symbol: String,
    pub side: Side,
    pub r#type: OrderType,
    pub quantity: String,
    /// Ignored for market orders.
    #[serde(default)]
    pub price: Option<String>,
}

/// The last known price of a symbol.
#[derive(Debug, PartialEq, Clone)]
pub struct Quote {
    pub symbol: String,
    pub current_price: Decimal,
}
