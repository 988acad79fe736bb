//! Pluvia Policy Engine
//!
//! Decides which parametric policies trigger for a rainfall measurement and
//! coordinates the resulting ledger submissions.
//!
//! Provides:
//! - A pure eligibility evaluator
//! - The measurement source and ledger submitter seams
//! - The trigger coordinator with compare-and-commit and journaling

pub mod coordinator;
pub mod eligibility;
pub mod ledger;
pub mod measurement;

pub use coordinator::{PassReport, PolicyOutcome, PolicyReport, TriggerCoordinator};
pub use eligibility::{evaluate, Eligibility, IneligibleReason};
pub use ledger::LedgerSubmitter;
pub use measurement::MeasurementSource;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::coordinator::{PassReport, PolicyOutcome, TriggerCoordinator};
    pub use crate::eligibility::{evaluate, Eligibility, IneligibleReason};
    pub use crate::ledger::LedgerSubmitter;
    pub use crate::measurement::MeasurementSource;
}
