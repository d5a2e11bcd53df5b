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

//! Explorer client configuration structures.

use std::time::Duration;

use explorer_common::{consts::API_MAJOR_VERSION, network::NetworkConfig};
use explorer_network::{
    http::{DEFAULT_REQUEST_TIMEOUT, HttpTransportConfig},
    websocket::{
        WebSocketConfig,
        config::{
            DEFAULT_ACK_TIMEOUT, DEFAULT_PING_INTERVAL, DEFAULT_READINESS_TIMEOUT,
            DEFAULT_RECONNECT_DELAY,
        },
    },
};
use url::Url;

use crate::error::{ExplorerClientError, ExplorerClientResult};

/// Default explorer API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://explorer.test.keeta.com/";

/// Network selected when none is configured.
pub const DEFAULT_NETWORK_ALIAS: &str = "test";

/// Timing options for the real-time socket.
#[derive(Clone, Debug)]
pub struct WebSocketOptions {
    /// Interval between application level pings.
    pub ping_interval: Duration,
    /// Whether to reconnect after the transport closes.
    pub reconnect: bool,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum wait for the transport before a subscribe/unsubscribe fails.
    pub readiness_timeout: Duration,
    /// Maximum wait for a subscribe/unsubscribe acknowledgement.
    pub ack_timeout: Duration,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Configuration for [`crate::ExplorerClient`].
#[derive(Clone, Debug)]
pub struct ExplorerClientConfig {
    /// Explorer API base URL. A bare host resolves to `/api/v1/`.
    pub base_url: String,
    /// Network announced with every request.
    pub network: NetworkConfig,
    /// HTTP request deadline in milliseconds.
    pub timeout_ms: u64,
    /// Socket timings.
    pub websocket: WebSocketOptions,
}

impl Default for ExplorerClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            network: NetworkConfig::new(DEFAULT_NETWORK_ALIAS),
            timeout_ms: u64::try_from(DEFAULT_REQUEST_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            websocket: WebSocketOptions::default(),
        }
    }
}

impl ExplorerClientConfig {
    /// Creates a config for `base_url` with the default network and timings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Returns the normalized API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or not `http`/`https`.
    pub fn api_url(&self) -> ExplorerClientResult<Url> {
        format_api_url(&self.base_url)
    }

    /// Builds the HTTP transport config announcing `self.network`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn http_config(&self) -> ExplorerClientResult<HttpTransportConfig> {
        let mut config = HttpTransportConfig::new(self.api_url()?.to_string());
        config.headers = self.network.to_headers();
        config.timeout = Duration::from_millis(self.timeout_ms);
        Ok(config)
    }

    /// Builds the socket config: `<api>/ws` with the network as query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn websocket_config(&self) -> ExplorerClientResult<WebSocketConfig> {
        let api = self.api_url()?;
        let mut url = api
            .join("ws")
            .map_err(|e| ExplorerClientError::Config(format!("Invalid socket URL: {e}")))?;

        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ExplorerClientError::Config(format!("Cannot use scheme {scheme}")))?;

        url.query_pairs_mut()
            .extend_pairs(self.network.to_query_pairs());

        let options = &self.websocket;
        let mut config = WebSocketConfig::new(url.to_string());
        config.ping_interval = options.ping_interval;
        config.reconnect = options.reconnect;
        config.reconnect_delay = options.reconnect_delay;
        config.readiness_timeout = options.readiness_timeout;
        config.ack_timeout = options.ack_timeout;
        Ok(config)
    }
}

/// Normalizes an explorer API URL.
///
/// Only `http` and `https` are accepted. A bare root path becomes `/api/v{major}/`.
///
/// # Errors
///
/// Returns an error if `input` is not a URL or uses another scheme.
pub fn format_api_url(input: &str) -> ExplorerClientResult<Url> {
    let mut url = Url::parse(input)
        .map_err(|e| ExplorerClientError::Config(format!("Invalid URL '{input}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExplorerClientError::Config(format!(
            "Invalid protocol specified in URL: {}:",
            url.scheme()
        )));
    }

    if url.path() == "/" {
        url.set_path(&format!("/api/v{API_MAJOR_VERSION}/"));
    }

    Ok(url)
}
