//! Seller payout service: balance ledger, withdrawal state machine and
//! gateway reconciliation.

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod ledger;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod payouts;
pub mod services;
pub mod workers;
