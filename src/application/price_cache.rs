use crate::domain::trade::Quote;
use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Latest quote per traded symbol.
///
/// The map lock only guards structural changes: adding a symbol takes the write
/// lock, while updating or reading an existing symbol takes the shared lock and swaps
/// the price cell atomically. Per symbol, the last write wins.
#[derive(Debug, Default)]
pub struct PriceCache {
    // symbol -> current price
    prices: RwLock<HashMap<String, AtomicCell<Decimal>>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the quote for `symbol`.
    pub fn update_price(&self, symbol: &str, price: Decimal) {
        debug!(symbol, %price, "Update price");

        if let Some(cell) = self.prices.read().get(symbol) {
            cell.store(price);
            return;
        }

        let mut prices = self.prices.write();
        // Another writer may have created the entry since the read probe.
        if let Some(cell) = prices.get(symbol) {
            cell.store(price);
            return;
        }
        prices.insert(symbol.to_string(), AtomicCell::new(price));
    }

    /// Returns the latest stored quote for `symbol`.
    pub fn lookup(&self, symbol: &str) -> Option<Quote> {
        self.prices.read().get(symbol).map(|cell| Quote {
            symbol: symbol.to_string(),
            current_price: cell.load(),
        })
    }

    /// Symbols with a live quote, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
