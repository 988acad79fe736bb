//! Pluvia Telemetry
//!
//! Trigger journal and metric definitions for the Pluvia oracle.
//!
//! Provides:
//! - A SHA-256 hash-chained, append-only journal of trigger outcomes
//! - Query, export and chain verification over the journal
//! - Metric names shared by the coordinator and the poll loop

pub mod chain;
pub mod journal;
pub mod metrics;

pub use chain::{find_chain_break, EntryKind, HashChain, JournalEntry, Severity};
pub use journal::{
    ExportFormat, JournalConfig, JournalQuery, JournalReader, JournalWriter, TriggerJournal,
};
pub use metrics::describe_metrics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chain::{EntryKind, JournalEntry, Severity};
    pub use crate::journal::{JournalConfig, JournalQuery, JournalReader, TriggerJournal};
}
