//! Store trait and the compare-and-commit trigger update

use pluvia_core::{Error, Policy, PolicyDraft, PolicyId, Result, Timestamp, TxRef};

/// Durable policy records plus the monitored index.
///
/// Implementations must serialize every mutation of a given policy id with
/// respect to any other access to that id. `commit_trigger` is the only
/// operation allowed to touch `trigger_count`, `last_triggered_at` and
/// `last_tx_ref`.
pub trait PolicyStore: Send + Sync {
    /// Live records whose ids are in the monitored index, in index order.
    /// Index entries without a live record are skipped.
    fn list_monitored(&self) -> Result<Vec<Policy>>;

    /// Every live (non-archived) record, monitored or not, ordered by id
    fn list_live(&self) -> Result<Vec<Policy>>;

    /// Every archived record, ordered by id
    fn list_archived(&self) -> Result<Vec<Policy>>;

    /// Load a record by id, preferring the live copy over the archive
    fn load(&self, id: PolicyId) -> Result<Policy>;

    /// Apply a successful trigger after re-validating the stored record
    fn commit_trigger(&self, commit: &TriggerCommit) -> Result<Policy>;

    /// Validate and persist a new policy, returning its assigned id
    fn register(&self, draft: PolicyDraft) -> Result<PolicyId>;

    /// Archive a live policy and drop it from the monitored index
    fn deactivate(&self, id: PolicyId) -> Result<Policy>;

    /// Bring an archived policy back to life and re-monitor it
    fn restore(&self, id: PolicyId) -> Result<Policy>;

    /// Add or remove a live policy from the monitored index without archiving it
    fn set_monitored(&self, id: PolicyId, monitored: bool) -> Result<()>;
}

/// Compare-and-commit argument for [`PolicyStore::commit_trigger`].
///
/// Carries the values observed in the snapshot that was evaluated so the
/// store can detect a record that changed while the submission was in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCommit {
    pub policy_id: PolicyId,
    pub now: Timestamp,
    pub tx_ref: TxRef,
    pub expected_trigger_count: u32,
    pub expected_last_triggered_at: Option<Timestamp>,
}

impl TriggerCommit {
    /// Build a commit from the snapshot the coordinator evaluated
    pub fn from_snapshot(snapshot: &Policy, now: Timestamp, tx_ref: TxRef) -> Self {
        Self {
            policy_id: snapshot.id,
            now,
            tx_ref,
            expected_trigger_count: snapshot.trigger_count,
            expected_last_triggered_at: snapshot.last_triggered_at,
        }
    }

    /// Re-check the stored record against this commit
    pub fn validate(&self, current: &Policy) -> Result<()> {
        let id = self.policy_id;

        if !current.active {
            return Err(Error::conflict(id, "policy is no longer active"));
        }
        if current.is_expired_at(self.now) {
            return Err(Error::conflict(
                id,
                format!("policy expired at {}", current.expires_at),
            ));
        }
        if current.cap_reached() {
            return Err(Error::conflict(
                id,
                format!("trigger cap of {} already reached", current.trigger_cap),
            ));
        }
        if current.trigger_count != self.expected_trigger_count {
            return Err(Error::conflict(
                id,
                format!(
                    "trigger_count changed from {} to {}",
                    self.expected_trigger_count, current.trigger_count
                ),
            ));
        }
        if current.last_triggered_at != self.expected_last_triggered_at {
            return Err(Error::conflict(id, "last_triggered_at changed since snapshot"));
        }
        if let Some(last) = current.last_triggered_at {
            if self.now < last {
                return Err(Error::conflict(
                    id,
                    format!("commit time {} precedes last trigger at {}", self.now, last),
                ));
            }
        }

        Ok(())
    }

    /// Mutate exactly the trigger-related fields
    pub fn apply(&self, policy: &mut Policy) {
        policy.trigger_count += 1;
        policy.last_triggered_at = Some(self.now);
        policy.last_tx_ref = Some(self.tx_ref.clone());
    }
}

/// Next id after every live and archived id, starting at 1
pub(crate) fn next_policy_id(ids: impl IntoIterator<Item = PolicyId>) -> PolicyId {
    ids.into_iter().max().map_or(1, |max| max + 1)
}
