//! Source of authoritative depth snapshots.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::types::Snapshot;

/// Fetches a full order book snapshot for a symbol.
///
/// [`RestClient`](crate::client::RestClient) implements this against the
/// `/api/v3/depth` endpoint. Tests substitute in-memory sources.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch the current snapshot for `symbol` (upper case)
    async fn fetch(&self, symbol: &str) -> Result<Snapshot, Error>;
}

/// Run one fetch bounded by `timeout`; an elapsed timeout is [`Error::Timeout`]
pub async fn fetch_with_timeout(
    fetcher: &dyn SnapshotFetcher,
    symbol: &str,
    timeout: Duration,
) -> Result<Snapshot, Error> {
    tokio::time::timeout(timeout, fetcher.fetch(symbol)).await?
}
