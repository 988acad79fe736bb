//! Eligibility evaluation
//!
//! A pure function of the policy snapshot, the measurement and the
//! evaluation time. Checks short-circuit in a fixed order: policy-local
//! state first, then the threshold, then the history-dependent cooldown.

use pluvia_core::{Policy, Timestamp};
use std::fmt;

/// Result of evaluating one policy against one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Why a policy will not trigger on this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IneligibleReason {
    Inactive,
    Expired,
    CapReached,
    ThresholdNotMet,
    CooldownActive,
}

impl IneligibleReason {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::CapReached => "cap_reached",
            Self::ThresholdNotMet => "threshold_not_met",
            Self::CooldownActive => "cooldown_active",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `policy` should trigger for `measurement_mm` at `now`.
///
/// A NaN measurement never exceeds the threshold.
pub fn evaluate(policy: &Policy, measurement_mm: f64, now: Timestamp) -> Eligibility {
    use IneligibleReason::*;

    if !policy.active {
        return Eligibility::Ineligible(Inactive);
    }
    if policy.is_expired_at(now) {
        return Eligibility::Ineligible(Expired);
    }
    if policy.cap_reached() {
        return Eligibility::Ineligible(CapReached);
    }
    if !(measurement_mm > policy.rain_threshold_mm) {
        return Eligibility::Ineligible(ThresholdNotMet);
    }
    if let Some(last) = policy.last_triggered_at {
        if now.saturating_sub(last) < policy.cooldown_secs() {
            return Eligibility::Ineligible(CooldownActive);
        }
    }

    Eligibility::Eligible
}
