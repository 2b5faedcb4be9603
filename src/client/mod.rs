//! HTTP transport for the sandbox REST API
//!
//! [`SandboxClient`] turns domain calls into HTTP requests and normalizes every outcome
//! into [`crate::Result`]: a non-200 answer becomes [`Error::Http`], a body that is not JSON
//! becomes [`Error::Decode`], and nothing ever panics into the caller. Failures are logged
//! here, at the transport layer, so higher layers only decide what to do with them.
//!
//! The endpoint bindings (task status, reports, memory dumps, dropped files, machines,
//! submission) live in the [`api`] submodule.

mod api;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::{Config, ProxyConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Client for one sandbox API endpoint
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted.
#[derive(Clone, Debug)]
pub struct SandboxClient {
    http: reqwest::Client,
    config: Config,
}

impl SandboxClient {
    /// Build a client from the given configuration
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid or the HTTP client
    /// cannot be built (e.g. an unusable proxy URL).
    pub fn new(mut config: Config) -> Result<Self> {
        config.base_url = crate::config::normalize_base_url(&config.base_url);
        config.validate()?;
        let http = build_http_client(&config)?;
        Ok(Self { http, config })
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the proxy settings and rebuild the HTTP client
    ///
    /// Passing `None` for both clears the proxy. On error the previous settings stay in effect.
    pub fn set_proxy(&mut self, http: Option<String>, https: Option<String>) -> Result<()> {
        let mut config = self.config.clone();
        config.proxy = ProxyConfig { http, https };
        config.validate()?;
        self.http = build_http_client(&config)?;
        self.config = config;
        debug!(proxy = ?self.config.proxy, "proxy settings updated");
        Ok(())
    }

    /// Absolute URL for an API path (`path` starts with `/`)
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// GET a JSON document
    ///
    /// # Errors
    /// - [`Error::Http`] for any status other than 200
    /// - [`Error::Decode`] if the body is not valid JSON
    /// - [`Error::Network`] if the request could not be completed
    pub async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = self.url(path);
        let response = self
            .get_ok(&url, params, Some(self.config.request_timeout))
            .await?;

        let body = response.bytes().await.map_err(|e| {
            error!(url = %url, error = %e, "failed to read response body");
            Error::Network(e)
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            error!(url = %url, error = %e, "failed to decode JSON response");
            debug!(url = %url, body = %String::from_utf8_lossy(&body), "undecodable response body");
            Error::Decode {
                url: url.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// GET a raw body as a read-once chunked stream
    ///
    /// Only the connection is time limited; the body may take as long as it needs.
    ///
    /// # Errors
    /// Same as [`SandboxClient::get_json`], minus decoding.
    pub async fn get_stream(&self, path: &str, params: &[(&str, &str)]) -> Result<ByteStream> {
        let url = self.url(path);
        let response = self.get_ok(&url, params, None).await?;
        Ok(ByteStream { response, url })
    }

    /// POST a file as multipart form data plus text fields, returning the decoded JSON answer
    ///
    /// The file is streamed from disk rather than read into memory.
    pub async fn post_file(
        &self,
        path: &str,
        file: &Path,
        fields: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = self.url(path);

        let handle = tokio::fs::File::open(file).await?;
        let length = handle.metadata().await?.len();
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sample")
            .to_string();

        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(handle));
        let part = reqwest::multipart::Part::stream_with_length(body, length).file_name(file_name);

        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (name, value) in fields {
            form = form.text(name.to_string(), value.clone());
        }

        debug!(url = %url, file = ?file, size = length, "POST request");
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "POST request failed");
                Error::Network(e)
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            error!(url = %url, status = status.as_u16(), "received a non-200 response for POST request");
            return Err(Error::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            error!(url = %url, error = %e, "failed to decode JSON response");
            Error::Decode {
                url,
                reason: e.to_string(),
            }
        })
    }

    /// Send a GET and insist on HTTP 200, retrying transient failures
    async fn get_ok(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        with_retry(&self.config.retry, || {
            let mut request = self.http.get(url).query(params);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            async move {
                debug!(url = %url, "GET request");
                let response = request.send().await.map_err(|e| {
                    error!(url = %url, error = %e, "GET request failed");
                    Error::Network(e)
                })?;

                let status = response.status();
                if status != reqwest::StatusCode::OK {
                    error!(url = %url, status = status.as_u16(), "received a non-200 response for GET request");
                    return Err(Error::Http {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Ok(response)
            }
        })
        .await
    }
}

/// A read-once body of a successful GET
///
/// Chunks arrive as the network delivers them; nothing is buffered beyond one chunk.
#[derive(Debug)]
pub struct ByteStream {
    response: reqwest::Response,
    url: String,
}

impl ByteStream {
    /// The URL this stream was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Content length announced by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Next chunk of the body, `None` once exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.response.chunk().await.map_err(|e| {
            error!(url = %self.url, error = %e, "failed to read response chunk");
            Error::Network(e)
        })
    }

    /// Write the whole body to `dest`, creating parent directories, and return the byte count
    ///
    /// A partially written file is left in place if the transfer fails.
    pub async fn write_to(mut self, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk().await? {
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url = %self.url, ?dest, bytes = written, "stream written to disk");
        Ok(written)
    }
}

fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!("cuckoo-dl/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(!config.verify_tls);

    if let Some(http) = &config.proxy.http {
        let proxy = reqwest::Proxy::http(http).map_err(|e| Error::Config {
            message: format!("invalid HTTP proxy '{}': {}", http, e),
            key: Some("proxy.http".to_string()),
        })?;
        builder = builder.proxy(proxy);
    }
    if let Some(https) = &config.proxy.https {
        let proxy = reqwest::Proxy::https(https).map_err(|e| Error::Config {
            message: format!("invalid HTTPS proxy '{}': {}", https, e),
            key: Some("proxy.https".to_string()),
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}
