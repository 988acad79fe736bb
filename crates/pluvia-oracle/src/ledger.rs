//! Ledger submitter implementations
//!
//! Both build the same contract call; the dry run only logs it, the relay
//! hands it to an external signer that owns keys and nonces.

use async_trait::async_trait;
use pluvia_core::{Error, Result, TriggerRequest, TxRef};
use pluvia_policy::LedgerSubmitter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{LedgerConfig, LedgerMode};

/// Contract endpoint that pays out a triggered policy
pub const TRIGGER_FUNCTION: &str = "triggerPayment";

/// Even-length lowercase hex, as the contract argument encoding expects
fn hex_arg(value: u64) -> String {
    let hex = format!("{:x}", value);
    if hex.len() % 2 == 1 {
        format!("0{}", hex)
    } else {
        hex
    }
}

/// Contract call data for a trigger request.
///
/// The contract takes whole millimetres, so the measurement is truncated.
pub fn trigger_call_data(request: &TriggerRequest) -> String {
    let millimetres = request.measurement_mm.max(0.0) as u64;
    let timestamp = u64::try_from(request.timestamp).unwrap_or(0);

    format!(
        "{}@{}@{}@{}",
        TRIGGER_FUNCTION,
        hex_arg(request.policy_id),
        hex_arg(millimetres),
        hex_arg(timestamp)
    )
}

/// Logs the call it would make and returns a synthetic reference
pub struct DryRunLedger {
    contract: Option<String>,
}

impl DryRunLedger {
    pub fn new(contract: Option<String>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl LedgerSubmitter for DryRunLedger {
    async fn submit_trigger(&self, request: &TriggerRequest) -> Result<TxRef> {
        let data = trigger_call_data(request);
        let tx_ref = TxRef::new(format!("dryrun-{}", uuid::Uuid::new_v4()));

        info!(
            contract = self.contract.as_deref().unwrap_or("<unset>"),
            policy_id = request.policy_id,
            data = %data,
            tx_ref = %tx_ref,
            "Dry run: trigger not sent"
        );
        Ok(tx_ref)
    }

    fn name(&self) -> &str {
        "dry_run"
    }
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    contract: Option<&'a str>,
    function: &'static str,
    policy_id: u64,
    measurement_mm: f64,
    timestamp: i64,
    data: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    tx_hash: String,
}

/// Forwards triggers to a signing relay over HTTP
pub struct RelayLedger {
    client: reqwest::Client,
    relay_url: String,
    contract: Option<String>,
}

impl RelayLedger {
    pub fn new(relay_url: impl Into<String>, contract: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build relay client: {}", e)))?;

        Ok(Self {
            client,
            relay_url: relay_url.into(),
            contract,
        })
    }
}

#[async_trait]
impl LedgerSubmitter for RelayLedger {
    async fn submit_trigger(&self, request: &TriggerRequest) -> Result<TxRef> {
        let body = RelayRequest {
            contract: self.contract.as_deref(),
            function: TRIGGER_FUNCTION,
            policy_id: request.policy_id,
            measurement_mm: request.measurement_mm,
            timestamp: request.timestamp,
            data: trigger_call_data(request),
        };

        debug!(policy_id = request.policy_id, relay = %self.relay_url, "Submitting trigger to relay");

        let response = self
            .client
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::submission(format!("relay request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::submission(format!("relay returned {}: {}", status, text)));
        }

        let parsed: RelayResponse = response
            .json()
            .await
            .map_err(|e| Error::submission(format!("malformed relay response: {}", e)))?;

        if parsed.tx_hash.trim().is_empty() {
            return Err(Error::submission("relay returned an empty transaction hash"));
        }
        Ok(TxRef::new(parsed.tx_hash))
    }

    fn name(&self) -> &str {
        "relay"
    }
}

/// Build the submitter selected by `config.mode`
pub fn build_ledger(config: &LedgerConfig) -> Result<Arc<dyn LedgerSubmitter>> {
    match config.mode {
        LedgerMode::DryRun => Ok(Arc::new(DryRunLedger::new(config.contract_address.clone()))),
        LedgerMode::Relay => {
            let url = config
                .relay_url
                .clone()
                .ok_or_else(|| Error::config("ledger.relay_url is required in relay mode"))?;
            Ok(Arc::new(RelayLedger::new(
                url,
                config.contract_address.clone(),
                config.submit_timeout(),
            )?))
        }
    }
}
