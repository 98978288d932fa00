use std::time::Duration;

use anyhow::{Result, anyhow};
use axum::body::Body;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Proxy, StatusCode};
use thiserror::Error;

use crate::stream::is_manifest_path;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to read body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/**
    HTTP client for the origin.

    Connect and read are each bounded by the configured timeout, so a
    long segment can still stream as long as bytes keep arriving.
*/
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout);

        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| anyhow!("Invalid proxy URL '{}': {}", proxy_url, e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }

    /// GET `url` with `headers`; non-success statuses are errors.
    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(UpstreamResponse {
            url: url.to_string(),
            inner: response,
        })
    }
}

pub struct UpstreamResponse {
    url: String,
    inner: reqwest::Response,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.inner
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    /// HLS playlists are recognised by content type or by a `.m3u8` path.
    pub fn is_manifest(&self) -> bool {
        let by_type = self
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("mpegurl"));
        by_type || is_manifest_path(&self.url)
    }

    pub async fn text(self) -> Result<String, FetchError> {
        let url = self.url;
        self.inner
            .text()
            .await
            .map_err(|source| FetchError::Body { url, source })
    }

    /// Stream the body through unchanged.
    pub fn into_body(self) -> Body {
        Body::from_stream(self.inner.bytes_stream())
    }
}
