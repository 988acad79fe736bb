//! Pluvia Policy Store
//!
//! Durable source of truth for policy records and the monitored index.
//!
//! Provides:
//! - The `PolicyStore` trait with compare-and-commit trigger updates
//! - An in-memory store for tests
//! - A JSON-file store with atomic writes and cross-process locking

pub mod file;
pub mod file_lock;
pub mod memory;
pub mod traits;

pub use file::FilePolicyStore;
pub use file_lock::FileLock;
pub use memory::MemoryPolicyStore;
pub use traits::{PolicyStore, TriggerCommit};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::file::FilePolicyStore;
    pub use crate::memory::MemoryPolicyStore;
    pub use crate::traits::{PolicyStore, TriggerCommit};
}
