//! Application layer: the ledger engine, the quote cache it prices trades from, and
//! the supervisor that tracks background workers until shutdown.

pub mod engine;
pub mod price_cache;
pub mod supervisor;
