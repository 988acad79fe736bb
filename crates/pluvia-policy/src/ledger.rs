//! Ledger submitter abstraction

use async_trait::async_trait;
use pluvia_core::{Result, TriggerRequest, TxRef};

/// Submits payout-initiating trigger requests to the external ledger.
///
/// Called at most once per eligible policy per pass. A failed call must be
/// safe to repeat on a later pass; the coordinator only retries while the
/// policy is still eligible.
#[async_trait]
pub trait LedgerSubmitter: Send + Sync {
    /// Submit one trigger and return the ledger's transaction reference
    async fn submit_trigger(&self, request: &TriggerRequest) -> Result<TxRef>;

    /// Submitter name, for logs
    fn name(&self) -> &str;
}
