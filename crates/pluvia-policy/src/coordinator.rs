//! Trigger coordination
//!
//! One pass takes a single measurement, evaluates every monitored policy,
//! submits a trigger for each eligible one and commits the successful
//! submissions back to the store through compare-and-commit.
//!
//! Policies are independent: a failure for one never aborts the rest of the
//! pass. Ineligible policies cause no side effect at all.

use futures::stream::{self, StreamExt};
use pluvia_core::{Error, Policy, PolicyId, Result, Timestamp, TriggerRequest, TxRef};
use pluvia_store::{PolicyStore, TriggerCommit};
use pluvia_telemetry::metrics::{
    INELIGIBLE_TOTAL, POLICIES_EVALUATED_TOTAL, SUBMISSION_LATENCY_MS, TRIGGERS_TOTAL,
};
use pluvia_telemetry::{EntryKind, JournalEntry, TriggerJournal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::eligibility::{evaluate, Eligibility, IneligibleReason};
use crate::ledger::LedgerSubmitter;

/// Default number of submissions allowed in flight within one pass
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What happened to one policy during a pass
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    /// Not eligible; nothing was submitted or written
    Ineligible(IneligibleReason),

    /// Submitted and committed
    Triggered { tx_ref: TxRef, trigger_count: u32 },

    /// The ledger call failed or timed out; the record is untouched
    SubmissionFailed { error: String },

    /// The ledger accepted the trigger but the record changed underneath it
    CommitConflict { tx_ref: TxRef, reason: String },

    /// The ledger accepted the trigger but persisting the commit failed
    CommitFailed { tx_ref: TxRef, error: String },
}

impl PolicyOutcome {
    /// Conditions an operator must look at: an accepted trigger without a
    /// matching local commit
    pub fn is_operational_error(&self) -> bool {
        matches!(
            self,
            Self::CommitConflict { .. } | Self::CommitFailed { .. }
        )
    }
}

/// Outcome for one policy id
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyReport {
    pub policy_id: PolicyId,
    pub outcome: PolicyOutcome,
}

/// Summary of one coordination pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Measurement the pass evaluated
    pub measurement_mm: f64,

    /// Evaluation time shared by every policy in the pass
    pub at: Timestamp,

    /// Per-policy outcomes, ordered by policy id
    pub outcomes: Vec<PolicyReport>,

    /// Wall time of the pass in milliseconds
    pub duration_ms: u64,
}

impl PassReport {
    /// Number of policies evaluated
    pub fn evaluated(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of policies triggered and committed
    pub fn triggered(&self) -> usize {
        self.count(|o| matches!(o, PolicyOutcome::Triggered { .. }))
    }

    /// Number of failed submissions
    pub fn submission_failures(&self) -> usize {
        self.count(|o| matches!(o, PolicyOutcome::SubmissionFailed { .. }))
    }

    /// Number of accepted triggers that could not be committed
    pub fn operational_errors(&self) -> usize {
        self.count(PolicyOutcome::is_operational_error)
    }

    /// Outcome for a given policy, if it was part of the pass
    pub fn outcome(&self, policy_id: PolicyId) -> Option<&PolicyOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.policy_id == policy_id)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&PolicyOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Runs coordination passes against a store and a ledger
pub struct TriggerCoordinator {
    store: Arc<dyn PolicyStore>,
    ledger: Arc<dyn LedgerSubmitter>,
    journal: Option<Arc<TriggerJournal>>,
    submit_timeout: Option<Duration>,
    max_concurrency: usize,
}

impl TriggerCoordinator {
    /// Create a coordinator with no journal, no submission timeout and the
    /// default concurrency
    pub fn new(store: Arc<dyn PolicyStore>, ledger: Arc<dyn LedgerSubmitter>) -> Self {
        Self {
            store,
            ledger,
            journal: None,
            submit_timeout: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Record submissions and commit outcomes in `journal`
    pub fn with_journal(mut self, journal: Arc<TriggerJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Bound every ledger call by `timeout`
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = Some(timeout);
        self
    }

    /// Limit submissions in flight within one pass (at least 1)
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Run one pass over the monitored policies.
    ///
    /// Fails only when the monitored set cannot be listed. Per-policy
    /// failures are reported in the returned [`PassReport`].
    pub async fn run_pass(&self, measurement_mm: f64, now: Timestamp) -> Result<PassReport> {
        let start = Instant::now();
        let policies = self.store.list_monitored()?;

        debug!(
            policies = policies.len(),
            measurement_mm,
            now,
            "Starting coordination pass"
        );

        let mut outcomes = Vec::with_capacity(policies.len());
        let mut eligible = Vec::new();

        for policy in policies {
            metrics::counter!(POLICIES_EVALUATED_TOTAL).increment(1);

            match evaluate(&policy, measurement_mm, now) {
                Eligibility::Eligible => eligible.push(policy),
                Eligibility::Ineligible(reason) => {
                    metrics::counter!(INELIGIBLE_TOTAL, "reason" => reason.as_str()).increment(1);
                    debug!(policy_id = policy.id, reason = %reason, "Policy not eligible");
                    outcomes.push(PolicyReport {
                        policy_id: policy.id,
                        outcome: PolicyOutcome::Ineligible(reason),
                    });
                }
            }
        }

        let triggered: Vec<PolicyReport> = stream::iter(eligible)
            .map(|policy| self.trigger(policy, measurement_mm, now))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        outcomes.extend(triggered);
        outcomes.sort_by_key(|r| r.policy_id);

        let report = PassReport {
            measurement_mm,
            at: now,
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            evaluated = report.evaluated(),
            triggered = report.triggered(),
            submission_failures = report.submission_failures(),
            operational_errors = report.operational_errors(),
            duration_ms = report.duration_ms,
            "Coordination pass complete"
        );

        Ok(report)
    }

    /// Submit and commit one eligible policy
    async fn trigger(&self, snapshot: Policy, measurement_mm: f64, now: Timestamp) -> PolicyReport {
        let policy_id = snapshot.id;
        let request = TriggerRequest {
            policy_id,
            measurement_mm,
            timestamp: now,
        };

        let outcome = match self.submit(&request).await {
            Err(e) => {
                metrics::counter!(TRIGGERS_TOTAL, "outcome" => "submission_failed").increment(1);
                warn!(
                    policy_id,
                    ledger = self.ledger.name(),
                    error = %e,
                    "Trigger submission failed, will retry on a later pass"
                );
                self.journal(
                    JournalEntry::new(EntryKind::SubmissionFailed, policy_id, measurement_mm, now)
                        .with_detail(e.to_string()),
                );
                PolicyOutcome::SubmissionFailed {
                    error: e.to_string(),
                }
            }
            Ok(tx_ref) => {
                self.journal(
                    JournalEntry::new(EntryKind::TriggerSubmitted, policy_id, measurement_mm, now)
                        .with_tx_ref(tx_ref.clone()),
                );
                self.commit(&snapshot, measurement_mm, now, tx_ref).await
            }
        };

        PolicyReport { policy_id, outcome }
    }

    async fn submit(&self, request: &TriggerRequest) -> Result<TxRef> {
        let start = Instant::now();

        let result = match self.submit_timeout {
            Some(limit) => tokio::time::timeout(limit, self.ledger.submit_trigger(request))
                .await
                .unwrap_or(Err(Error::Timeout)),
            None => self.ledger.submit_trigger(request).await,
        };

        metrics::histogram!(SUBMISSION_LATENCY_MS).record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn commit(
        &self,
        snapshot: &Policy,
        measurement_mm: f64,
        now: Timestamp,
        tx_ref: TxRef,
    ) -> PolicyOutcome {
        let policy_id = snapshot.id;
        let commit = TriggerCommit::from_snapshot(snapshot, now, tx_ref.clone());
        let entry = |kind| {
            JournalEntry::new(kind, policy_id, measurement_mm, now).with_tx_ref(tx_ref.clone())
        };

        match self.commit_blocking(commit).await {
            Ok(updated) => {
                metrics::counter!(TRIGGERS_TOTAL, "outcome" => "committed").increment(1);
                info!(
                    policy_id,
                    tx_ref = %tx_ref,
                    trigger_count = updated.trigger_count,
                    measurement_mm,
                    "Policy triggered"
                );
                self.journal(entry(EntryKind::TriggerCommitted));
                PolicyOutcome::Triggered {
                    tx_ref,
                    trigger_count: updated.trigger_count,
                }
            }
            Err(Error::Conflict { reason, .. }) => {
                metrics::counter!(TRIGGERS_TOTAL, "outcome" => "commit_conflict").increment(1);
                error!(
                    policy_id,
                    tx_ref = %tx_ref,
                    reason = %reason,
                    "Ledger accepted a trigger the store rejected"
                );
                self.journal(entry(EntryKind::CommitConflict).with_detail(reason.clone()));
                PolicyOutcome::CommitConflict { tx_ref, reason }
            }
            Err(e) => {
                metrics::counter!(TRIGGERS_TOTAL, "outcome" => "commit_failed").increment(1);
                error!(
                    policy_id,
                    tx_ref = %tx_ref,
                    error = %e,
                    "Failed to persist an accepted trigger"
                );
                self.journal(entry(EntryKind::CommitFailed).with_detail(e.to_string()));
                PolicyOutcome::CommitFailed {
                    tx_ref,
                    error: e.to_string(),
                }
            }
        }
    }

    // The file store takes a cross-process lock and fsyncs, so keep it off
    // the runtime threads that drive the other submissions.
    async fn commit_blocking(&self, commit: TriggerCommit) -> Result<Policy> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.commit_trigger(&commit))
            .await
            .map_err(|e| Error::internal(format!("commit task failed: {}", e)))?
    }

    // Journal failures are logged; they never change a policy outcome.
    fn journal(&self, entry: JournalEntry) {
        let Some(journal) = &self.journal else {
            return;
        };
        let kind = entry.kind;
        let policy_id = entry.policy_id;
        if let Err(e) = journal.record(entry) {
            error!(policy_id, kind = kind.as_str(), error = %e, "Failed to write journal entry");
        }
    }
}
