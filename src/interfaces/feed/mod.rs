//! Market data feed side: routing raw quote events to per-symbol queues and the
//! workers that apply them to the price cache.

pub mod consumer;
pub mod router;
pub mod shutdown;
