//! Service layer of the `chainvault` binary: configuration, logging, the
//! content store, the ledger stand-in and the vault operations built on
//! `chainvault-core`.

pub mod config;
pub mod ledger;
pub mod store;
pub mod telemetry;
pub mod vault;
