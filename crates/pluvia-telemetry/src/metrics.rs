//! Metric names and descriptions
//!
//! Recording goes through the `metrics` facade; whichever recorder the
//! binary installs (Prometheus or none) receives the values.

/// Poll ticks, labelled `outcome` = completed | measurement_unavailable | store_failed
pub const TICKS_TOTAL: &str = "pluvia_ticks_total";

/// Policies run through the eligibility evaluator
pub const POLICIES_EVALUATED_TOTAL: &str = "pluvia_policies_evaluated_total";

/// Ineligible evaluations, labelled `reason`
pub const INELIGIBLE_TOTAL: &str = "pluvia_ineligible_total";

/// Trigger attempts, labelled `outcome` = committed | submission_failed | commit_conflict | commit_failed
pub const TRIGGERS_TOTAL: &str = "pluvia_triggers_total";

/// Ledger submission latency
pub const SUBMISSION_LATENCY_MS: &str = "pluvia_submission_latency_ms";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    ::metrics::describe_counter!(TICKS_TOTAL, "Total number of poll ticks by outcome");
    ::metrics::describe_counter!(
        POLICIES_EVALUATED_TOTAL,
        "Total number of policy eligibility evaluations"
    );
    ::metrics::describe_counter!(
        INELIGIBLE_TOTAL,
        "Total number of ineligible evaluations by reason"
    );
    ::metrics::describe_counter!(TRIGGERS_TOTAL, "Total number of trigger attempts by outcome");
    ::metrics::describe_histogram!(
        SUBMISSION_LATENCY_MS,
        ::metrics::Unit::Milliseconds,
        "Ledger submission latency in milliseconds"
    );
}
