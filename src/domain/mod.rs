//! Domain types: accounts, journal entries, trade requests and the store port.

pub mod account;
pub mod entry;
pub mod ports;
pub mod trade;
