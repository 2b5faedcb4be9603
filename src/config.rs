//! Configuration types for cuckoo-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Proxy settings applied to every request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy for plain HTTP requests
    #[serde(default)]
    pub http: Option<String>,

    /// Proxy for HTTPS requests
    #[serde(default)]
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Whether no proxy is configured at all
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }
}

/// Main configuration for the sandbox client
///
/// Everything here is fixed when the client is built. The only post-construction change
/// is the proxy, through [`crate::SandboxClient::set_proxy`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the sandbox REST API (trailing slash is stripped)
    pub base_url: String,

    /// API key (reserved, not sent by the current API)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Verify TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Time allowed to establish a connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Total time allowed for a JSON request or a submission (default: 300 seconds).
    /// Memory dump and dropped-file downloads are not bounded by it.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Task status polling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Dropped-files extraction
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_base_url())
    }
}

impl Config {
    /// Create a configuration for the given base URL with defaults for everything else
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            api_key: None,
            proxy: ProxyConfig::default(),
            verify_tls: true,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check that the URLs in this configuration are usable
    pub fn validate(&self) -> Result<()> {
        if self.base_url().is_empty() {
            return Err(Error::Config {
                message: "base URL must not be empty".to_string(),
                key: Some("base_url".to_string()),
            });
        }

        url::Url::parse(self.base_url()).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.base_url, e),
            key: Some("base_url".to_string()),
        })?;

        for (key, value) in [
            ("proxy.http", &self.proxy.http),
            ("proxy.https", &self.proxy.https),
        ] {
            if let Some(proxy) = value {
                url::Url::parse(proxy).map_err(|e| Error::Config {
                    message: format!("invalid proxy URL '{}': {}", proxy, e),
                    key: Some(key.to_string()),
                })?;
            }
        }

        if self.polling.interval.is_zero() {
            return Err(Error::Config {
                message: "polling interval must be greater than zero".to_string(),
                key: Some("polling.interval".to_string()),
            });
        }

        Ok(())
    }
}

/// Strip the trailing slash from a base URL
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Task status polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between two status polls (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Give up once this much time has passed (default: wait forever)
    #[serde(default, with = "option_duration_serde")]
    pub timeout: Option<Duration>,

    /// Fail after this many polls in a row return no status (default: 15, None = never)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            timeout: None,
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Dropped-files extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Remove the outer archive and first-level zips after a successful extraction (default: true)
    #[serde(default = "default_true")]
    pub remove_archives: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            remove_archives: true,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_consecutive_failures() -> Option<u32> {
    Some(15)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
