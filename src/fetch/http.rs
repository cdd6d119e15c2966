use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use super::{DecodedImage, ImageFetcher};
use crate::error::FetchError;

/// Default User-Agent sent with tile requests.
///
/// Public tile servers (OpenStreetMap in particular) reject requests without one.
pub const DEFAULT_USER_AGENT: &str = concat!("tile-canvas/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on a tile response body (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// HTTP-backed implementation of ImageFetcher.
///
/// Issues a GET per tile, maps the status code onto [`FetchError`], and decodes
/// the body on the blocking thread pool so large PNGs never stall the runtime.
/// Bodies larger than the size limit are rejected with
/// [`FetchError::TooLarge`] before they are buffered.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpImageFetcher {
    /// Create a fetcher with the default user agent and timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(DEFAULT_USER_AGENT, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher with a custom user agent and request timeout.
    pub fn with_settings(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Set the largest response body accepted, in bytes.
    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Read the body, failing as soon as it exceeds the size limit.
    async fn read_body(&self, url: &str, mut resp: Response) -> Result<Vec<u8>, FetchError> {
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_body_bytes,
        };

        // Trust an advertised length for the early reject only
        if resp.content_length().is_some_and(|len| len > self.max_body_bytes) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<DecodedImage, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = self.read_body(url, resp).await?;

        tokio::task::spawn_blocking(move || DecodedImage::decode(&body))
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?
    }
}
