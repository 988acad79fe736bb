//! Periodic driver for coordination passes
//!
//! Each tick fetches one measurement and, if it is usable, runs one pass
//! over the monitored policies. Ticks never overlap: the next sleep starts
//! only after the pass, including every submission, has finished.

use pluvia_core::{now_timestamp, Error, Timestamp};
use pluvia_policy::{MeasurementSource, PassReport, TriggerCoordinator};
use pluvia_telemetry::metrics::TICKS_TOTAL;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Result of a single tick
#[derive(Debug)]
pub enum TickOutcome {
    /// No usable measurement; the pass was skipped
    MeasurementUnavailable(Error),
    /// The pass ran
    Completed(PassReport),
    /// The monitored set could not be read
    StoreFailed(Error),
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::MeasurementUnavailable(_) => "measurement_unavailable",
            Self::Completed(_) => "completed",
            Self::StoreFailed(_) => "store_failed",
        }
    }
}

/// Fetch, evaluate, sleep, repeat
pub struct PollLoop {
    source: Arc<dyn MeasurementSource>,
    coordinator: TriggerCoordinator,
    interval: Duration,
    clock: Clock,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        coordinator: TriggerCoordinator,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            coordinator,
            interval,
            clock: Arc::new(now_timestamp),
        }
    }

    /// Replace the wall clock used for evaluation time
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Run a single tick
    pub async fn tick(&self) -> TickOutcome {
        let measurement = self.source.get_measurement().await;
        self.complete_tick(measurement).await
    }

    /// Tick until `shutdown` fires, returning the number of ticks run.
    ///
    /// Cancellation is observed while fetching and while sleeping. A pass
    /// that has started always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        info!(
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            "Poll loop started"
        );

        let mut ticks = 0;
        loop {
            let measurement = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                m = self.source.get_measurement() => m,
            };

            self.complete_tick(measurement).await;
            ticks += 1;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(ticks, "Poll loop stopped");
        ticks
    }

    async fn complete_tick(&self, measurement: pluvia_core::Result<f64>) -> TickOutcome {
        let outcome = match measurement {
            Ok(mm) if mm.is_finite() && mm >= 0.0 => {
                info!(measurement_mm = mm, "Measurement fetched");
                let now = (self.clock)();
                match self.coordinator.run_pass(mm, now).await {
                    Ok(report) => TickOutcome::Completed(report),
                    Err(e) => {
                        error!(error = %e, "Failed to list monitored policies");
                        TickOutcome::StoreFailed(e)
                    }
                }
            }
            Ok(mm) => {
                let e = Error::measurement(format!("source returned an invalid amount: {}", mm));
                warn!(error = %e, "Skipping tick");
                TickOutcome::MeasurementUnavailable(e)
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Measurement unavailable, skipping tick");
                TickOutcome::MeasurementUnavailable(e)
            }
        };

        metrics::counter!(TICKS_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }
}
