// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! HTTP transport for the explorer REST API.
//!
//! Bodies are decoded with the wire codec and HTTP failures are mapped onto [`FetchError`] so
//! callers (the coalescer and the degrading fetch) can react to size-limit and not-found errors.

use std::time::Duration;

use explorer_common::{codec::WireCodec, models::ErrorResponse};
use reqwest::{
    StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    error::{FetchError, FetchResult, SIZE_LIMIT_SIGNATURE},
    pending::PendingRequests,
};

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest request URL the transport will send.
pub const DEFAULT_MAX_URL_BYTES: usize = 8 * 1024;

/// Configuration for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Base URL all request paths are resolved against (e.g. `http://host/api/v1/`).
    pub base_url: String,
    /// Headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Per-request deadline.
    pub timeout: Duration,
    /// Largest encoded URL accepted before the request is rejected as too large.
    pub max_url_bytes: usize,
}

impl HttpTransportConfig {
    /// Creates a config for `base_url` with default limits and no extra headers.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_url_bytes: DEFAULT_MAX_URL_BYTES,
        }
    }
}

/// Codec-aware HTTP client with cancellable in-flight requests.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
    max_url_bytes: usize,
    codec: WireCodec,
    pending: PendingRequests,
}

impl HttpTransport {
    /// Creates a new [`HttpTransport`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a header is invalid, or the client cannot be built.
    pub fn new(config: HttpTransportConfig, codec: WireCodec) -> anyhow::Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            headers,
            timeout: config.timeout,
            max_url_bytes: config.max_url_bytes,
            codec,
            pending: PendingRequests::default(),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the in-flight request registry.
    #[must_use]
    pub const fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Builds the absolute URL for `path` with repeated `query` parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be joined onto the base URL.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> FetchResult<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FetchError::Transport(format!("Invalid request path '{path}': {e}")))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }

    /// Sends a GET request and decodes the response body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SizeLimitExceeded`] if the URL is too long or the server rejects it,
    /// [`FetchError::NotFound`] on 404, [`FetchError::Unauthorized`] on 401,
    /// [`FetchError::Http`] on other failure statuses, [`FetchError::Timeout`] when the deadline
    /// elapses and [`FetchError::Cancelled`] if the request is aborted.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> FetchResult<T> {
        let url = self.url(path, query)?;

        let length = url.as_str().len();
        if length > self.max_url_bytes {
            return Err(FetchError::SizeLimitExceeded(format!(
                "{SIZE_LIMIT_SIGNATURE} ({length} bytes)"
            )));
        }

        let guard = self.pending.register(url.as_str());
        tracing::trace!("GET {url}");

        let request = async {
            let response = self
                .client
                .get(url.clone())
                .headers(self.headers.clone())
                .timeout(self.timeout)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            self.handle_response(status, &body)
        };

        tokio::select! {
            () = guard.token().cancelled() => Err(FetchError::Cancelled),
            result = request => result,
        }
    }

    fn handle_response<T: DeserializeOwned>(&self, status: StatusCode, body: &str) -> FetchResult<T> {
        if status.is_success() {
            return Ok(self.codec.decode(body)?);
        }

        let message = self
            .codec
            .decode::<ErrorResponse>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .map_or_else(|| body.to_string(), str::to_string)
            });

        tracing::debug!(status = status.as_u16(), "Request failed: {message}");

        Err(match status {
            StatusCode::NOT_FOUND => FetchError::NotFound(message),
            StatusCode::UNAUTHORIZED => FetchError::Unauthorized(message),
            StatusCode::URI_TOO_LONG | StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE => {
                FetchError::SizeLimitExceeded(message)
            }
            other => FetchError::Http {
                status: other.as_u16(),
                message,
            },
        })
    }
}
