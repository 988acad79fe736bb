//! Policy records and trigger request types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique, immutable policy identifier
pub type PolicyId = u64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Seconds in one cooldown day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Current wall-clock time as a unix timestamp
pub fn now_timestamp() -> Timestamp {
    Utc::now().timestamp()
}

/// Render a timestamp as RFC 3339, falling back to the raw number
pub fn format_timestamp(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// A parametric insurance policy under (possible) monitoring
///
/// Serde aliases accept the record files written by the earlier
/// Portuguese-language tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique identifier, assigned once
    #[serde(alias = "policy_id")]
    pub id: PolicyId,

    /// Free-text location label
    #[serde(alias = "local")]
    pub location: String,

    /// Accumulated rain must exceed this to trigger
    #[serde(alias = "limite_chuva")]
    pub rain_threshold_mm: f64,

    /// Minimum days between consecutive triggers
    #[serde(alias = "duracao_dias", alias = "dias_chuva", default)]
    pub cooldown_days: u32,

    /// Payout in the smallest settlement unit
    #[serde(alias = "valor_indemnizacao")]
    pub indemnity_amount: u128,

    /// Permanently ineligible after this instant
    #[serde(alias = "expiration")]
    pub expires_at: Timestamp,

    /// Maximum lifetime triggers, 0 for unlimited
    #[serde(alias = "limite_acionamentos", default)]
    pub trigger_cap: u32,

    /// Successful triggers so far
    #[serde(alias = "acionamentos", default)]
    pub trigger_count: u32,

    /// When the most recent trigger was committed
    #[serde(alias = "ultima_atualizacao", default)]
    pub last_triggered_at: Option<Timestamp>,

    /// Excluded from evaluation when false
    #[serde(alias = "ativo", default = "default_true")]
    pub active: bool,

    /// Transaction reference of the most recent successful submission
    #[serde(alias = "tx_hash", default)]
    pub last_tx_ref: Option<TxRef>,

    /// Payout address of the policy holder
    #[serde(alias = "contratante", default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<String>,

    /// Registration time
    #[serde(alias = "timestamp_criacao", default)]
    pub created_at: Timestamp,
}

impl Policy {
    /// Build a fresh record from a registration payload
    pub fn from_draft(id: PolicyId, draft: PolicyDraft) -> Self {
        Self {
            id,
            location: draft.location,
            rain_threshold_mm: draft.rain_threshold_mm,
            cooldown_days: draft.cooldown_days,
            indemnity_amount: draft.indemnity_amount,
            expires_at: draft.expires_at,
            trigger_cap: draft.trigger_cap,
            trigger_count: 0,
            last_triggered_at: None,
            active: true,
            last_tx_ref: None,
            beneficiary: draft.beneficiary,
            created_at: draft.created_at,
        }
    }

    /// Cooldown window length in seconds
    pub fn cooldown_secs(&self) -> i64 {
        i64::from(self.cooldown_days).saturating_mul(SECONDS_PER_DAY)
    }

    /// Whether the policy has a finite trigger cap that is already used up
    pub fn cap_reached(&self) -> bool {
        self.trigger_cap > 0 && self.trigger_count >= self.trigger_cap
    }

    /// Whether the policy is past its expiry at `now`
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Triggers left before the cap, `None` when unlimited
    pub fn remaining_triggers(&self) -> Option<u32> {
        (self.trigger_cap > 0).then(|| self.trigger_cap.saturating_sub(self.trigger_count))
    }
}

fn default_true() -> bool {
    true
}

/// Registration payload for a new policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub location: String,
    pub rain_threshold_mm: f64,
    pub cooldown_days: u32,
    pub indemnity_amount: u128,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub trigger_cap: u32,
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl PolicyDraft {
    /// Check the fields that registration refuses to store
    pub fn validate(&self) -> crate::Result<()> {
        if self.location.trim().is_empty() {
            return Err(crate::Error::invalid("location must not be empty"));
        }
        if !self.rain_threshold_mm.is_finite() || self.rain_threshold_mm < 0.0 {
            return Err(crate::Error::invalid(format!(
                "rain threshold must be a finite, non-negative number of millimetres (got {})",
                self.rain_threshold_mm
            )));
        }
        Ok(())
    }
}

/// External transaction reference returned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payout-initiating request handed to the ledger submitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub policy_id: PolicyId,
    pub measurement_mm: f64,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PolicyDraft {
        PolicyDraft {
            location: "Barcarena-PA".to_string(),
            rain_threshold_mm: 100.0,
            cooldown_days: 10,
            indemnity_amount: 1_000_000_000_000_000_000,
            expires_at: 2_000_000_000,
            trigger_cap: 3,
            beneficiary: None,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_from_draft_starts_fresh() {
        let policy = Policy::from_draft(4, draft());
        assert_eq!(policy.id, 4);
        assert_eq!(policy.trigger_count, 0);
        assert!(policy.active);
        assert!(policy.last_triggered_at.is_none());
        assert!(policy.last_tx_ref.is_none());
        assert_eq!(policy.remaining_triggers(), Some(3));
    }

    #[test]
    fn test_cap_reached() {
        let mut policy = Policy::from_draft(1, draft());
        assert!(!policy.cap_reached());
        policy.trigger_count = 3;
        assert!(policy.cap_reached());

        policy.trigger_cap = 0;
        assert!(!policy.cap_reached());
        assert_eq!(policy.remaining_triggers(), None);
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate().is_ok());

        let mut bad = draft();
        bad.location = "  ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.rain_threshold_mm = f64::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_reads_legacy_record() {
        let json = r#"{
            "policy_id": 2,
            "local": "Belem-PA",
            "duracao_dias": 5,
            "limite_chuva": 120,
            "valor_indemnizacao": 1000000000000000000,
            "expiration": 1900000000,
            "contratante": "erd1qqqq"
        }"#;

        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.id, 2);
        assert_eq!(policy.location, "Belem-PA");
        assert_eq!(policy.cooldown_days, 5);
        assert_eq!(policy.rain_threshold_mm, 120.0);
        assert!(policy.active);
        assert_eq!(policy.trigger_cap, 0);
        assert_eq!(policy.beneficiary.as_deref(), Some("erd1qqqq"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
