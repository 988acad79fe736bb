//! Hash-chained journal entries

use pluvia_core::{PolicyId, Timestamp, TxRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What happened to a policy trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The ledger accepted a trigger; the local commit has not happened yet
    TriggerSubmitted,
    /// The trigger was committed to the policy store
    TriggerCommitted,
    /// The store rejected the commit after the ledger accepted the trigger
    CommitConflict,
    /// Persisting the commit failed after the ledger accepted the trigger
    CommitFailed,
    /// The ledger call failed or timed out; nothing was committed
    SubmissionFailed,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TriggerSubmitted => "trigger_submitted",
            Self::TriggerCommitted => "trigger_committed",
            Self::CommitConflict => "commit_conflict",
            Self::CommitFailed => "commit_failed",
            Self::SubmissionFailed => "submission_failed",
        }
    }

    /// Default severity for this kind of entry
    pub fn severity(&self) -> Severity {
        match self {
            Self::TriggerSubmitted | Self::TriggerCommitted => Severity::Info,
            Self::SubmissionFailed => Severity::Warning,
            // A payment went out with no matching local record
            Self::CommitConflict | Self::CommitFailed => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A single journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID
    pub id: String,

    pub kind: EntryKind,

    pub severity: Severity,

    pub policy_id: PolicyId,

    /// Measurement the decision was based on
    pub measurement_mm: f64,

    /// Evaluation time of the pass that produced this entry
    pub at: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,

    /// Free-form context (error message, conflict reason)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Hash of the previous entry (for chaining)
    pub previous_hash: Option<String>,

    /// Hash of this entry
    pub hash: Option<String>,
}

impl JournalEntry {
    /// Create a new, not yet chained, entry
    pub fn new(kind: EntryKind, policy_id: PolicyId, measurement_mm: f64, at: Timestamp) -> Self {
        Self {
            id: format!("jrn_{}", uuid::Uuid::new_v4()),
            kind,
            severity: kind.severity(),
            policy_id,
            measurement_mm,
            at,
            tx_ref: None,
            detail: None,
            previous_hash: None,
            hash: None,
        }
    }

    /// Set the transaction reference
    pub fn with_tx_ref(mut self, tx_ref: TxRef) -> Self {
        self.tx_ref = Some(tx_ref);
        self
    }

    /// Set the detail message
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Compute the hash of this entry (excluding the hash field itself)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.id.as_bytes());
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(self.policy_id.to_le_bytes());
        hasher.update(self.measurement_mm.to_le_bytes());
        hasher.update(self.at.to_le_bytes());
        if let Some(ref tx_ref) = self.tx_ref {
            hasher.update(tx_ref.as_str().as_bytes());
        }
        if let Some(ref detail) = self.detail {
            hasher.update(detail.as_bytes());
        }
        if let Some(ref prev) = self.previous_hash {
            hasher.update(prev.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

/// Running head of a hash chain
#[derive(Debug, Clone, Default)]
pub struct HashChain {
    head: Option<String>,
}

impl HashChain {
    /// Start a new chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a chain whose last hash is `head`
    pub fn resume(head: Option<String>) -> Self {
        Self { head }
    }

    /// Current head hash
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Link an entry to the chain and advance the head
    pub fn link(&mut self, mut entry: JournalEntry) -> JournalEntry {
        entry.previous_hash = self.head.clone();
        let hash = entry.compute_hash();
        entry.hash = Some(hash.clone());
        self.head = Some(hash);
        entry
    }
}

/// Index of the first entry that breaks the chain, if any
pub fn find_chain_break<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Option<usize> {
    let mut prev_hash: Option<&String> = None;

    for (index, entry) in entries.into_iter().enumerate() {
        if index > 0 && entry.previous_hash.as_ref() != prev_hash {
            return Some(index);
        }
        if entry.hash.as_deref() != Some(entry.compute_hash().as_str()) {
            return Some(index);
        }
        prev_hash = entry.hash.as_ref();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntryKind) -> JournalEntry {
        JournalEntry::new(kind, 1, 150.0, 1_700_000_000)
    }

    #[test]
    fn test_chain_links_entries() {
        let mut chain = HashChain::new();

        let first = chain.link(entry(EntryKind::TriggerSubmitted).with_tx_ref(TxRef::new("0x1")));
        let second = chain.link(entry(EntryKind::TriggerCommitted));

        assert!(first.previous_hash.is_none());
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(chain.head(), second.hash.as_deref());
        assert_eq!(find_chain_break(&[first, second]), None);
    }

    #[test]
    fn test_tamper_detection() {
        let mut chain = HashChain::new();
        let mut entries = vec![
            chain.link(entry(EntryKind::TriggerSubmitted)),
            chain.link(entry(EntryKind::TriggerCommitted)),
            chain.link(entry(EntryKind::SubmissionFailed)),
        ];

        entries[1].measurement_mm = 10.0;
        assert_eq!(find_chain_break(&entries), Some(1));
    }

    #[test]
    fn test_removed_entry_breaks_chain() {
        let mut chain = HashChain::new();
        let mut entries = vec![
            chain.link(entry(EntryKind::TriggerSubmitted)),
            chain.link(entry(EntryKind::TriggerCommitted)),
            chain.link(entry(EntryKind::TriggerSubmitted)),
        ];

        entries.remove(1);
        assert_eq!(find_chain_break(&entries), Some(1));
    }

    #[test]
    fn test_conflicts_are_critical() {
        assert_eq!(EntryKind::CommitConflict.severity(), Severity::Critical);
        assert_eq!(EntryKind::TriggerCommitted.severity(), Severity::Info);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
    }
}
