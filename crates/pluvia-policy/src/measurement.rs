//! Measurement source abstraction

use async_trait::async_trait;
use pluvia_core::Result;

/// Produces the accumulated rainfall the policies are evaluated against.
///
/// Implementations return a non-negative number of millimetres, or
/// `Error::MeasurementUnavailable` when no trustworthy value exists for this
/// tick. Callers never fall back to a previous value.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fetch the current measurement
    async fn get_measurement(&self) -> Result<f64>;

    /// Source name, for logs
    fn name(&self) -> &str;
}
