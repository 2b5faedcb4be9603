//! Test configuration helpers for mocked and live sandboxes

use cuckoo_dl::{Config, RetryConfig, Sandbox};
use std::time::Duration;
use wiremock::MockServer;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Sandbox pointed at a mock server, polling fast and never retrying
pub fn mock_sandbox(server: &MockServer) -> Sandbox {
    let mut config = Config::new(server.uri());
    config.retry = RetryConfig::disabled();
    config.polling.interval = Duration::from_millis(5);
    config.polling.timeout = Some(Duration::from_secs(10));
    Sandbox::new(config).unwrap()
}

/// Load the live sandbox configuration from environment variables
///
/// Required environment variables:
/// - `CUCKOO_URL` - Base URL of the sandbox REST API
///
/// Optional environment variables:
/// - `CUCKOO_API_KEY` - API key
/// - `CUCKOO_TIMEOUT_SECS` - Give up waiting for a task after this long (default: 900)
pub fn load_live_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let url = std::env::var("CUCKOO_URL")
        .map_err(|_| ConfigError("CUCKOO_URL not set in environment".to_string()))?;

    let timeout_secs: u64 = std::env::var("CUCKOO_TIMEOUT_SECS")
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(900);

    let mut config = Config::new(url);
    config.api_key = std::env::var("CUCKOO_API_KEY").ok();
    config.polling.timeout = Some(Duration::from_secs(timeout_secs));
    Ok(config)
}

/// Check whether live sandbox settings are available
pub fn has_live_sandbox() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("CUCKOO_URL").is_ok()
}
