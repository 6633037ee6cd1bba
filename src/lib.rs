//! Quotaledger - Daily Quota Accounting and Allow-List Admission
//!
//! This crate keeps per-day usage counters, a capped set of registered
//! identities and an allow-list in a shared key-value store (Redis in
//! production, an in-memory store for tests and local runs). Counters roll
//! over at a configurable day boundary and expire on their own.

pub mod calendar;
pub mod config;
pub mod error;
pub mod ledger;
pub mod store;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result, StoreError};
pub use ledger::{FailurePolicy, Identity, Ledger, Scope};
