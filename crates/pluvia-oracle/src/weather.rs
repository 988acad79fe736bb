//! One Call weather API measurement source

use async_trait::async_trait;
use pluvia_core::{Error, Result};
use pluvia_policy::MeasurementSource;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::WeatherConfig;

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    daily: Vec<DailyEntry>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    #[serde(default)]
    rain: Option<f64>,
}

/// Accumulated rain over the first `lookback_days` daily entries.
///
/// A day without a `rain` field counts as zero.
fn accumulated_rain(response: &OneCallResponse, lookback_days: usize) -> Result<f64> {
    let total: f64 = response
        .daily
        .iter()
        .take(lookback_days)
        .map(|day| day.rain.unwrap_or(0.0))
        .sum();

    if !total.is_finite() || total < 0.0 {
        return Err(Error::measurement(format!(
            "accumulated rain is not a valid amount: {}",
            total
        )));
    }
    Ok(total)
}

/// Measurement source backed by a One Call compatible HTTP endpoint
pub struct OneCallSource {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl OneCallSource {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("pluvia-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build weather client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl MeasurementSource for OneCallSource {
    async fn get_measurement(&self) -> Result<f64> {
        let mut query = vec![
            ("lat", self.config.latitude.to_string()),
            ("lon", self.config.longitude.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            query.push(("appid", key.clone()));
        }

        let response = self
            .client
            .get(&self.config.url)
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::measurement(format!("weather request failed: {}", e)))?;

        let body: OneCallResponse = response
            .json()
            .await
            .map_err(|e| Error::measurement(format!("malformed weather response: {}", e)))?;

        let total = accumulated_rain(&body, self.config.lookback_days)?;
        debug!(
            days = body.daily.len().min(self.config.lookback_days),
            total_mm = total,
            "Weather measurement fetched"
        );
        Ok(total)
    }

    fn name(&self) -> &str {
        "onecall"
    }
}
