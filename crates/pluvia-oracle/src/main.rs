//! Pluvia Oracle binary

use anyhow::Result;
use clap::Parser;
use pluvia_core::now_timestamp;
use pluvia_oracle::admin;
use pluvia_oracle::cli::{Cli, Commands};
use pluvia_oracle::config::{LoggingConfig, OracleConfig};
use pluvia_oracle::{build_ledger, mock, OneCallSource, PollLoop};
use pluvia_policy::TriggerCoordinator;
use pluvia_store::FilePolicyStore;
use pluvia_telemetry::{JournalReader, TriggerJournal};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::MockWeather {
        address,
        port,
        initial_mm,
    } = &cli.command
    {
        init_tracing(cli.verbose, &LoggingConfig::default());

        let addr: SocketAddr = format!("{}:{}", address, port).parse()?;
        println!("Mock weather API on http://{}/onecall", addr);
        println!("  Change rain: curl -X POST 'http://{}/set?value=12.3'", addr);

        let shutdown = shutdown_token();
        mock::run(addr, *initial_mm, shutdown).await?;
        return Ok(());
    }

    let config = OracleConfig::load(&cli.config)?;
    init_tracing(cli.verbose, &config.logging);

    match cli.command {
        Commands::Run => run_oracle(config).await,
        Commands::Policy { command } => {
            let store = FilePolicyStore::open(&config.store.data_dir)?;
            let output = admin::run_policy_command(&store, &command, now_timestamp())?;
            println!("{}", output.trim_end());
            Ok(())
        }
        Commands::Journal(args) => {
            let reader = JournalReader::new(config.journal.to_journal_config());
            let output = admin::run_journal_command(&reader, &args)?;
            println!("{}", output.trim_end());
            Ok(())
        }
        Commands::MockWeather { .. } => Ok(()),
    }
}

async fn run_oracle(config: OracleConfig) -> Result<()> {
    info!("Starting Pluvia oracle");

    if let Some(listen) = &config.metrics.listen {
        init_metrics(listen.parse()?)?;
    }

    let store = Arc::new(FilePolicyStore::open(&config.store.data_dir)?);
    info!(data_dir = ?config.store.data_dir, "Policy store opened");

    let ledger = build_ledger(&config.ledger)?;
    info!(ledger = ledger.name(), "Ledger submitter ready");

    let mut coordinator = TriggerCoordinator::new(store, ledger)
        .with_submit_timeout(config.ledger.submit_timeout())
        .with_max_concurrency(config.poll.max_concurrent_submissions);

    if config.journal.enabled {
        let journal = TriggerJournal::open(config.journal.to_journal_config())?;
        coordinator = coordinator.with_journal(Arc::new(journal));
    } else {
        warn!("Trigger journal disabled; accepted triggers are only recorded in the store");
    }

    let source = Arc::new(OneCallSource::new(config.weather.clone())?);
    let poll = PollLoop::new(source, coordinator, config.poll.interval());

    let shutdown = shutdown_token();
    poll.run(shutdown).await;

    info!("Oracle shutdown complete");
    Ok(())
}

/// Token cancelled on SIGINT or SIGTERM
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, finishing current pass...");
        trigger.cancel();
    });
    token
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("pluvia_oracle=debug,pluvia_policy=debug,pluvia_store=debug,pluvia_telemetry=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("pluvia_oracle=info,pluvia_policy=info,pluvia_store=info,pluvia_telemetry=info")
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Install the Prometheus exporter on `addr`
fn init_metrics(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    pluvia_telemetry::describe_metrics();

    info!(%addr, "Metrics exporter listening");
    Ok(())
}
