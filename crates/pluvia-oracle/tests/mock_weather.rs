//! One Call source against the mock weather server over real HTTP

use pluvia_oracle::config::WeatherConfig;
use pluvia_oracle::mock::{self, MockWeather};
use pluvia_oracle::OneCallSource;
use pluvia_policy::MeasurementSource;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn start_mock(initial_mm: f64) -> (SocketAddr, Arc<MockWeather>, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(MockWeather::new(initial_mm));
    let shutdown = CancellationToken::new();

    tokio::spawn(mock::serve(listener, state.clone(), shutdown.clone()));
    (addr, state, shutdown)
}

fn source(addr: SocketAddr, lookback_days: usize) -> OneCallSource {
    OneCallSource::new(WeatherConfig {
        url: format!("http://{}/onecall", addr),
        lookback_days,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_measurement_sums_forecast_days() {
    let (addr, _state, shutdown) = start_mock(12.5).await;

    assert_eq!(source(addr, 10).get_measurement().await.unwrap(), 125.0);
    assert_eq!(source(addr, 4).get_measurement().await.unwrap(), 50.0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_set_endpoint_changes_the_measurement() {
    let (addr, state, shutdown) = start_mock(0.0).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/set?value=20", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(state.rain_per_day(), 20.0);
    assert_eq!(source(addr, 10).get_measurement().await.unwrap(), 200.0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_set_endpoint_rejects_bad_values() {
    let (addr, state, shutdown) = start_mock(3.0).await;
    let client = reqwest::Client::new();

    for path in ["/set", "/set?value=lots"] {
        let response = client
            .post(format!("http://{}{}", addr, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }
    assert_eq!(state.rain_per_day(), 3.0);

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert!(health.status().is_success());

    shutdown.cancel();
}

#[tokio::test]
async fn test_unreachable_api_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = source(addr, 10).get_measurement().await.unwrap_err();
    assert!(err.is_transient());
}
