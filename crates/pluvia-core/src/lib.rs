//! Pluvia Core
//!
//! Core types and error handling shared across the Pluvia oracle crates.
//!
//! This crate provides:
//! - The persisted `Policy` record and its registration payload
//! - Trigger requests and ledger transaction references
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    format_timestamp, now_timestamp, Policy, PolicyDraft, PolicyId, Timestamp, TriggerRequest,
    TxRef, SECONDS_PER_DAY,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Policy, PolicyDraft, PolicyId, Timestamp, TriggerRequest, TxRef};
}
