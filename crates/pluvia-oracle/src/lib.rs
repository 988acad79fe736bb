//! Pluvia Oracle
//!
//! Polls a weather API for accumulated rainfall and triggers parametric
//! insurance payouts for every monitored policy whose threshold is exceeded.
//!
//! Provides:
//! - The poll loop that drives coordination passes
//! - One Call measurement source and ledger submitters
//! - Operator commands for policies and the trigger journal
//! - A mock weather API for local runs

pub mod admin;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod mock;
pub mod poll;
pub mod weather;

pub use config::OracleConfig;
pub use ledger::{build_ledger, DryRunLedger, RelayLedger};
pub use poll::{PollLoop, TickOutcome};
pub use weather::OneCallSource;
