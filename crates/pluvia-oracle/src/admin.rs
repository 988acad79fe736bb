//! Operator commands over the policy store and the trigger journal
//!
//! Every command returns the text to print so the binary stays a thin
//! dispatcher. Trigger-related fields are never written here; only
//! `PolicyStore::commit_trigger` touches them.

use pluvia_core::{
    format_timestamp, Error, Policy, PolicyDraft, PolicyId, Result, Timestamp, SECONDS_PER_DAY,
};
use pluvia_store::PolicyStore;
use pluvia_telemetry::{JournalEntry, JournalQuery, JournalReader};
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::info;

use crate::cli::{JournalArgs, PolicyCommand, RegisterArgs};

/// Build a registration payload from CLI arguments
pub fn build_draft(args: &RegisterArgs, now: Timestamp) -> PolicyDraft {
    PolicyDraft {
        location: args.location.trim().to_string(),
        rain_threshold_mm: args.threshold_mm,
        cooldown_days: args.cooldown_days,
        indemnity_amount: args.indemnity,
        expires_at: now + i64::from(args.valid_days) * SECONDS_PER_DAY,
        trigger_cap: args.trigger_cap,
        beneficiary: args.beneficiary.clone(),
        created_at: now,
    }
}

/// Execute a `policy` subcommand
pub fn run_policy_command(
    store: &dyn PolicyStore,
    command: &PolicyCommand,
    now: Timestamp,
) -> Result<String> {
    match command {
        PolicyCommand::Register(args) => {
            let id = store.register(build_draft(args, now))?;
            info!(policy_id = id, location = %args.location, "Policy registered");
            Ok(format!("Registered policy {} and added it to monitoring", id))
        }
        PolicyCommand::Remove { id } => {
            let policy = store.deactivate(*id)?;
            info!(policy_id = id, "Policy archived");
            Ok(format!(
                "Archived policy {} ({}); it is no longer monitored",
                id, policy.location
            ))
        }
        PolicyCommand::Restore { id } => {
            let policy = store.restore(*id)?;
            info!(policy_id = id, "Policy restored");
            Ok(format!(
                "Restored policy {} ({}) and resumed monitoring",
                id, policy.location
            ))
        }
        PolicyCommand::Show { id } => render_policy(&store.load(*id)?),
        PolicyCommand::List { archived } => {
            let policies = if *archived {
                store.list_archived()?
            } else {
                store.list_live()?
            };
            let monitored: HashSet<PolicyId> =
                store.list_monitored()?.iter().map(|p| p.id).collect();
            Ok(render_table(&policies, &monitored, now))
        }
        PolicyCommand::Pause { id } => {
            store.set_monitored(*id, false)?;
            Ok(format!("Policy {} will not be evaluated until resumed", id))
        }
        PolicyCommand::Resume { id } => {
            store.set_monitored(*id, true)?;
            Ok(format!("Policy {} is monitored again", id))
        }
    }
}

/// Full record as YAML
pub fn render_policy(policy: &Policy) -> Result<String> {
    serde_yaml::to_string(policy).map_err(|e| Error::internal(e.to_string()))
}

fn status(policy: &Policy, monitored: &HashSet<PolicyId>, now: Timestamp) -> &'static str {
    if !policy.active {
        "archived"
    } else if policy.is_expired_at(now) {
        "expired"
    } else if policy.cap_reached() {
        "capped"
    } else if !monitored.contains(&policy.id) {
        "paused"
    } else {
        "monitored"
    }
}

/// Tabular listing of policy records
pub fn render_table(policies: &[Policy], monitored: &HashSet<PolicyId>, now: Timestamp) -> String {
    if policies.is_empty() {
        return "No policies found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<20} {:>10} {:>9} {:>9} {:<26} {:<26} {:<10}",
        "ID", "LOCATION", "THRESHOLD", "COOLDOWN", "TRIGGERS", "LAST TRIGGER", "EXPIRES", "STATUS"
    );

    for policy in policies {
        let triggers = match policy.trigger_cap {
            0 => format!("{}/-", policy.trigger_count),
            cap => format!("{}/{}", policy.trigger_count, cap),
        };
        let last = policy
            .last_triggered_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());

        let _ = writeln!(
            out,
            "{:<5} {:<20} {:>8.1}mm {:>8}d {:>9} {:<26} {:<26} {:<10}",
            policy.id,
            truncate(&policy.location, 20),
            policy.rain_threshold_mm,
            policy.cooldown_days,
            triggers,
            last,
            format_timestamp(policy.expires_at),
            status(policy, monitored, now)
        );
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max - 1).collect();
        cut.push('~');
        cut
    }
}

/// Execute the `journal` subcommand
pub fn run_journal_command(reader: &JournalReader, args: &JournalArgs) -> Result<String> {
    if args.verify {
        return Ok(match reader.verify_chain()? {
            None => format!(
                "Journal chain intact ({} entries)",
                reader.count(&JournalQuery::new())?
            ),
            Some(index) => format!("Journal chain broken at entry {}", index),
        });
    }

    let mut query = JournalQuery::new().limit(args.limit);
    if let Some(id) = args.policy {
        query = query.policy(id);
    }

    if let Some(path) = &args.export {
        let count = reader.export_to_file(&query, path, args.format)?;
        return Ok(format!("Exported {} entries to {}", count, path.display()));
    }

    let entries = reader.query(&query)?;
    Ok(render_journal(&entries))
}

fn render_journal(entries: &[JournalEntry]) -> String {
    if entries.is_empty() {
        return "No journal entries found.\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {:<18} policy={:<5} {:>8.1}mm  {}{}",
            format_timestamp(entry.at),
            entry.kind.as_str(),
            entry.policy_id,
            entry.measurement_mm,
            entry.tx_ref.as_ref().map(|t| t.as_str()).unwrap_or("-"),
            entry
                .detail
                .as_deref()
                .map(|d| format!("  ({})", d))
                .unwrap_or_default()
        );
    }
    out
}
