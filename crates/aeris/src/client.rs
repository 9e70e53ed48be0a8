//! AERIS HTTP API client.
//!
//! Three endpoints are used: current observations, the precipitation
//! summary and forecasts. Each call either yields the decoded JSON body or a
//! [`AerisError::Transport`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::aggregate::ForecastInterval;
use crate::error::{AerisError, Result};

// ── Request description ─────────────────────────────────────────────

/// Provider endpoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Observations,
    PrecipSummary,
    Forecasts,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Observations => "observations",
            Endpoint::PrecipSummary => "observations/summary",
            Endpoint::Forecasts => "forecasts",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Query parameters shared by all endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub location: String,
    pub client_id: String,
    pub client_secret: String,
    /// Forecast days requested.
    pub limit: usize,
    pub interval: ForecastInterval,
}

/// Build the request URL for an endpoint.
pub fn request_url(base: &str, endpoint: Endpoint, query: &QueryParams) -> String {
    let mut url = format!(
        "{}/{}/{}?client_id={}&client_secret={}",
        base.trim_end_matches('/'),
        endpoint.path(),
        query.location,
        query.client_id,
        query.client_secret
    );
    match endpoint {
        Endpoint::Forecasts => match query.interval {
            ForecastInterval::Daily => {
                url.push_str(&format!("&filter=mdnt2mdnt&precise&limit={}", query.limit))
            }
            ForecastInterval::ThreeHour => {
                url.push_str(&format!("&filter=3hr&precise&limit={}", query.limit * 8))
            }
        },
        Endpoint::PrecipSummary => url.push_str("&fields=periods.summary.precip"),
        Endpoint::Observations => {}
    }
    url
}

// ── Fetcher ─────────────────────────────────────────────────────────

/// Source of raw provider payloads.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, endpoint: Endpoint, query: &QueryParams) -> Result<Value>;
}

/// reqwest-backed client for the live API.
pub struct AerisClient {
    client: reqwest::Client,
    base_url: String,
}

impl AerisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl WeatherFetcher for AerisClient {
    async fn fetch(&self, endpoint: Endpoint, query: &QueryParams) -> Result<Value> {
        let url = request_url(&self.base_url, endpoint, query);
        log::debug!("GET {}/{}/{}", self.base_url, endpoint, query.location);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AerisError::Transport(format!(
                "{} returned status {}",
                endpoint,
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| AerisError::Transport(format!("{} returned non-JSON body: {}", endpoint, e)))
    }
}

// ── Mock ────────────────────────────────────────────────────────────

/// Scripted fetcher for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns a fixed payload per endpoint. Endpoints without a payload fail
    /// with a transport error.
    #[derive(Default)]
    pub struct MockFetcher {
        responses: Mutex<HashMap<Endpoint, Value>>,
        calls: Mutex<Vec<(Endpoint, QueryParams)>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, endpoint: Endpoint, body: Value) -> Self {
            self.respond(endpoint, body);
            self
        }

        pub fn respond(&self, endpoint: Endpoint, body: Value) {
            if let Ok(mut responses) = self.responses.lock() {
                responses.insert(endpoint, body);
            }
        }

        /// Make an endpoint fail from now on.
        pub fn fail(&self, endpoint: Endpoint) {
            if let Ok(mut responses) = self.responses.lock() {
                responses.remove(&endpoint);
            }
        }

        pub fn calls(&self) -> Vec<(Endpoint, QueryParams)> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn call_count(&self, endpoint: Endpoint) -> usize {
            self.calls().iter().filter(|(e, _)| *e == endpoint).count()
        }
    }

    #[async_trait]
    impl WeatherFetcher for MockFetcher {
        async fn fetch(&self, endpoint: Endpoint, query: &QueryParams) -> Result<Value> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((endpoint, query.clone()));
            }
            self.responses
                .lock()
                .ok()
                .and_then(|r| r.get(&endpoint).cloned())
                .ok_or_else(|| AerisError::Transport(format!("{} unavailable", endpoint)))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
