//! Mock One Call weather server for local runs
//!
//! Every day in the forecast reports the same rain amount, which can be
//! changed at runtime with `POST /set?value=<mm>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Days in every forecast
pub const FORECAST_DAYS: i64 = 10;

/// Shared mock state
pub struct MockWeather {
    rain_per_day: RwLock<f64>,
}

impl MockWeather {
    pub fn new(initial_mm: f64) -> Self {
        Self {
            rain_per_day: RwLock::new(initial_mm),
        }
    }

    pub fn rain_per_day(&self) -> f64 {
        *self.rain_per_day.read()
    }

    pub fn set_rain_per_day(&self, mm: f64) {
        *self.rain_per_day.write() = mm;
    }
}

/// Build the mock router
pub fn router(state: Arc<MockWeather>) -> Router {
    Router::new()
        .route("/onecall", get(onecall))
        .route("/set", post(set_rain))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<MockWeather>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, "Mock weather API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Bind `addr` and serve until `shutdown` fires
pub async fn run(addr: SocketAddr, initial_mm: f64, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, Arc::new(MockWeather::new(initial_mm)), shutdown).await
}

async fn onecall(State(state): State<Arc<MockWeather>>) -> Json<Value> {
    let rain = state.rain_per_day();
    let now = pluvia_core::now_timestamp();

    let daily: Vec<Value> = (0..FORECAST_DAYS)
        .map(|i| json!({ "dt": now + i * pluvia_core::SECONDS_PER_DAY, "rain": rain }))
        .collect();

    Json(json!({
        "lat": -23.5505,
        "lon": -46.6333,
        "timezone": "America/Sao_Paulo",
        "timezone_offset": -10800,
        "daily": daily,
    }))
}

#[derive(Debug, Deserialize)]
struct SetParams {
    value: Option<String>,
}

async fn set_rain(
    State(state): State<Arc<MockWeather>>,
    Query(params): Query<SetParams>,
) -> (StatusCode, Json<Value>) {
    let Some(raw) = params.value else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing ?value=<mm> parameter" })),
        );
    };

    match raw.trim().parse::<f64>() {
        Ok(mm) if mm.is_finite() => {
            state.set_rain_per_day(mm);
            info!(rain_per_day_mm = mm, "Mock rain updated");
            (
                StatusCode::OK,
                Json(json!({ "message": format!("rain set to {} mm/day", mm), "rain": mm })),
            )
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid value '{}', expected a number", raw) })),
        ),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
