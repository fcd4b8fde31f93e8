//! Configuration for the Binance depth client.
//!
//! This module provides [`Config`] for endpoints and HTTP settings, and
//! [`SyncConfig`] for the order book synchronization thresholds.

use std::time::Duration;

/// API environment (production or testnet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production environment
    #[default]
    Production,
    /// Spot testnet (`testnet.binance.vision`)
    Testnet,
}

impl Environment {
    /// Get the base URL for REST API
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://api.binance.com/api",
            Environment::Testnet => "https://testnet.binance.vision/api",
        }
    }

    /// Get the WebSocket stream URL
    pub fn websocket_url(&self) -> &'static str {
        match self {
            Environment::Production => "wss://stream.binance.com:9443/ws",
            Environment::Testnet => "wss://testnet.binance.vision/ws",
        }
    }
}

/// Update speed of the diff depth stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthSpeed {
    /// One update per second (`<symbol>@depth`)
    Ms1000,
    /// One update per 100ms (`<symbol>@depth@100ms`)
    #[default]
    Ms100,
}

impl DepthSpeed {
    /// Stream name for `symbol` at this speed
    pub fn stream_name(&self, symbol: &str) -> String {
        let symbol = symbol.to_ascii_lowercase();
        match self {
            DepthSpeed::Ms1000 => format!("{}@depth", symbol),
            DepthSpeed::Ms100 => format!("{}@depth@100ms", symbol),
        }
    }
}

/// Depth limits accepted by the snapshot endpoint
pub const VALID_DEPTH_LIMITS: [u16; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];

/// Configuration for the Binance depth client
///
/// # Example
///
/// ```rust
/// use binance_depth::Config;
/// use binance_depth::config::{Environment, SyncConfig};
///
/// let config = Config::new()
///     .with_environment(Environment::Testnet)
///     .with_timeout(std::time::Duration::from_secs(5))
///     .with_sync(SyncConfig::default().with_max_resync_attempts(3));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// API environment
    environment: Environment,

    /// HTTP request timeout
    timeout: Duration,

    /// Number of levels per side requested from the snapshot endpoint
    snapshot_depth_limit: u16,

    /// Diff stream update speed
    depth_speed: DepthSpeed,

    /// Synchronization thresholds
    sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a configuration for the production environment
    pub fn new() -> Self {
        Self {
            environment: Environment::default(),
            timeout: Duration::from_secs(10),
            snapshot_depth_limit: 1000,
            depth_speed: DepthSpeed::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Set the API environment (production or testnet)
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the snapshot depth limit
    ///
    /// Must be one of [`VALID_DEPTH_LIMITS`]; other values are rejected when
    /// the snapshot is requested.
    #[must_use]
    pub fn with_snapshot_depth_limit(mut self, limit: u16) -> Self {
        self.snapshot_depth_limit = limit;
        self
    }

    /// Set the diff stream update speed
    #[must_use]
    pub fn with_depth_speed(mut self, speed: DepthSpeed) -> Self {
        self.depth_speed = speed;
        self
    }

    /// Set the synchronization thresholds
    #[must_use]
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Get the environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Get the REST API base URL
    pub fn rest_base_url(&self) -> &'static str {
        self.environment.rest_base_url()
    }

    /// Get the WebSocket URL
    pub fn websocket_url(&self) -> &'static str {
        self.environment.websocket_url()
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the snapshot depth limit
    pub fn snapshot_depth_limit(&self) -> u16 {
        self.snapshot_depth_limit
    }

    /// Get the diff stream update speed
    pub fn depth_speed(&self) -> DepthSpeed {
        self.depth_speed
    }

    /// Get the synchronization thresholds
    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }
}

/// Thresholds for the per-symbol synchronization engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum diff events buffered while a snapshot is outstanding
    pub max_buffered_events_per_symbol: usize,
    /// Resyncs allowed before the subscription is closed
    pub max_resync_attempts: u32,
    /// Timeout for a single snapshot fetch
    pub snapshot_fetch_timeout: Duration,
    /// Delay before each re-fetch
    pub snapshot_retry_backoff: BackoffConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_buffered_events_per_symbol: 1000,
            max_resync_attempts: 5,
            snapshot_fetch_timeout: Duration::from_secs(10),
            snapshot_retry_backoff: BackoffConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Set the buffer capacity per symbol
    #[must_use]
    pub fn with_max_buffered_events(mut self, max: usize) -> Self {
        self.max_buffered_events_per_symbol = max;
        self
    }

    /// Set the number of resyncs allowed before giving up
    #[must_use]
    pub fn with_max_resync_attempts(mut self, attempts: u32) -> Self {
        self.max_resync_attempts = attempts;
        self
    }

    /// Set the snapshot fetch timeout
    #[must_use]
    pub fn with_snapshot_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_fetch_timeout = timeout;
        self
    }

    /// Set the re-fetch backoff
    #[must_use]
    pub fn with_snapshot_retry_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.snapshot_retry_backoff = backoff;
        self
    }
}

/// Exponential backoff between snapshot re-fetches
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay between attempts
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Create a backoff config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial delay in milliseconds
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given retry attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.snapshot_depth_limit(), 1000);
        assert_eq!(config.sync().max_buffered_events_per_symbol, 1000);
        assert_eq!(config.sync().max_resync_attempts, 5);
    }

    #[test]
    fn test_testnet_environment() {
        let config = Config::new().with_environment(Environment::Testnet);
        assert!(config.rest_base_url().contains("testnet"));
        assert!(config.websocket_url().contains("testnet"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = Config::new()
            .with_timeout(Duration::from_secs(30))
            .with_snapshot_depth_limit(100)
            .with_depth_speed(DepthSpeed::Ms1000)
            .with_sync(
                SyncConfig::default()
                    .with_max_buffered_events(3)
                    .with_max_resync_attempts(1),
            );

        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.snapshot_depth_limit(), 100);
        assert_eq!(config.depth_speed(), DepthSpeed::Ms1000);
        assert_eq!(config.sync().max_buffered_events_per_symbol, 3);
        assert_eq!(config.sync().max_resync_attempts, 1);
    }

    #[test]
    fn test_stream_name() {
        assert_eq!(DepthSpeed::Ms100.stream_name("BNBBTC"), "bnbbtc@depth@100ms");
        assert_eq!(DepthSpeed::Ms1000.stream_name("BNBBTC"), "bnbbtc@depth");
    }

    #[test]
    fn test_delay_calculation() {
        let backoff = BackoffConfig::new()
            .initial_delay_ms(100)
            .backoff_multiplier(2.0)
            .max_delay_ms(1000);

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(800));
        // Should cap at max_delay_ms
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_millis(1000));
    }
}
