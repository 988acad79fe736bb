use clap::{Args, Parser, Subcommand};
use pluvia_core::PolicyId;
use pluvia_telemetry::ExportFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pluvia-oracle")]
#[command(
    author,
    version,
    about = "Parametric rainfall insurance oracle and policy tooling"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "PLUVIA_CONFIG", default_value = "pluvia.yaml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the poll loop
    Run,

    /// Manage policy records
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Inspect, verify or export the trigger journal
    Journal(JournalArgs),

    /// Serve a mock One Call weather API
    MockWeather {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        /// Listen port
        #[arg(short, long, default_value = "5050")]
        port: u16,

        /// Rain per day (mm) reported until changed with POST /set
        #[arg(long, default_value = "0")]
        initial_mm: f64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Register a new policy and start monitoring it
    Register(RegisterArgs),

    /// Archive a policy and stop monitoring it
    Remove { id: PolicyId },

    /// Bring an archived policy back and monitor it again
    Restore { id: PolicyId },

    /// Print one policy record
    Show { id: PolicyId },

    /// List policies
    List {
        /// List archived policies instead of live ones
        #[arg(long)]
        archived: bool,
    },

    /// Stop evaluating a live policy without archiving it
    Pause { id: PolicyId },

    /// Resume evaluating a paused policy
    Resume { id: PolicyId },
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Free-text location label (e.g. Barcarena-PA)
    #[arg(long)]
    pub location: String,

    /// Accumulated rain (mm) that must be exceeded to trigger
    #[arg(long)]
    pub threshold_mm: f64,

    /// Minimum days between two triggers
    #[arg(long)]
    pub cooldown_days: u32,

    /// Payout in the smallest settlement unit
    #[arg(long)]
    pub indemnity: u128,

    /// Days from now until the policy expires
    #[arg(long)]
    pub valid_days: u32,

    /// Maximum lifetime triggers (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub trigger_cap: u32,

    /// Payout address of the policy holder
    #[arg(long)]
    pub beneficiary: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct JournalArgs {
    /// Only entries for this policy
    #[arg(long)]
    pub policy: Option<PolicyId>,

    /// Maximum entries to print or export
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Check the hash chain instead of listing entries
    #[arg(long)]
    pub verify: bool,

    /// Write matching entries to this file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export format: jsonl, json or csv
    #[arg(long, default_value = "jsonl", value_parser = parse_format)]
    pub format: ExportFormat,
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse()
}
