//! HTTP REST client for the Binance spot API.
//!
//! This module provides the [`RestClient`] used to fetch depth snapshots
//! from `GET /api/v3/depth`. Market data endpoints need no authentication.
//!
//! # Example
//!
//! ```rust,no_run
//! use binance_depth::client::RestClient;
//! use binance_depth::Config;
//!
//! # async fn example() -> binance_depth::Result<()> {
//! let rest = RestClient::new(&Config::new())?;
//! let snapshot = rest.depth("BNBBTC", 1000).await?;
//! println!("lastUpdateId = {}", snapshot.last_update_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, VALID_DEPTH_LIMITS};
use crate::error::{ApiError, Error};
use crate::sync::SnapshotFetcher;
use crate::types::messages::DepthSnapshotResponse;
use crate::types::Snapshot;

/// Binance error body: `{"code": -1121, "msg": "Invalid symbol."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

/// HTTP client for the Binance REST API
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    depth_limit: u16,
}

impl RestClient {
    /// Create a new REST client
    ///
    /// # Errors
    ///
    /// Returns an error if the configured snapshot depth limit is not accepted
    /// by the API, or the HTTP client cannot be initialized.
    pub fn new(config: &Config) -> Result<Self, Error> {
        validate_depth_limit(config.snapshot_depth_limit())?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.rest_base_url().to_string(),
            depth_limit: config.snapshot_depth_limit(),
        })
    }

    /// Make a GET request to the API
    ///
    /// # Arguments
    ///
    /// * `path` - API path (without base URL), e.g. `/v3/depth`
    /// * `query` - Query string parameters
    ///
    /// # Returns
    ///
    /// Deserialized response body
    pub async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        self.handle_response(response).await
    }

    /// Fetch the order book snapshot for `symbol`
    ///
    /// # Arguments
    ///
    /// * `symbol` - Exchange symbol, any case
    /// * `limit` - Levels per side; one of [`VALID_DEPTH_LIMITS`]
    pub async fn depth(&self, symbol: &str, limit: u16) -> Result<Snapshot, Error> {
        validate_depth_limit(limit)?;
        let symbol = symbol.to_ascii_uppercase();

        let query = [("symbol", symbol.clone()), ("limit", limit.to_string())];
        let response: DepthSnapshotResponse = self.get("/v3/depth", &query).await?;

        debug!(
            symbol = %symbol,
            last_update_id = response.last_update_id,
            bids = response.bids.len(),
            asks = response.asks.len(),
            "received depth snapshot"
        );
        Ok(response.into_snapshot(&symbol))
    }

    /// Handle the HTTP response, checking for errors
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();

        // 429 is a rate limit, 418 an IP ban for ignoring one
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);

            return Err(Error::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => ApiError::with_code(status.as_u16(), parsed.code, parsed.msg),
                Err(_) => ApiError::new(status.as_u16(), body),
            };
            return Err(Error::Api(error));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Error::from)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Depth limit used for sync snapshots
    pub fn depth_limit(&self) -> u16 {
        self.depth_limit
    }
}

#[async_trait]
impl SnapshotFetcher for RestClient {
    async fn fetch(&self, symbol: &str) -> Result<Snapshot, Error> {
        self.depth(symbol, self.depth_limit).await
    }
}

fn validate_depth_limit(limit: u16) -> Result<(), Error> {
    if VALID_DEPTH_LIMITS.contains(&limit) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid depth limit {}; expected one of {:?}",
            limit, VALID_DEPTH_LIMITS
        )))
    }
}
