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

//! Entry point of the explorer client SDK.

use std::time::Duration;

use explorer_common::{
    codec::WireCodec,
    models::{NetworkSettingsResponse, TokenDetails},
    network::NetworkConfig,
};
use explorer_network::{
    error::FetchResult,
    http::HttpTransport,
    pending::DEFAULT_STALE_TOLERANCE,
};

use crate::{
    batcher::TokenBatcher,
    config::ExplorerClientConfig,
    error::{ExplorerClientError, ExplorerClientResult},
    websocket::ExplorerWebSocketClient,
};

/// Network settings endpoint relative to the API base URL.
pub const NETWORK_SETTINGS_PATH: &str = "network/settings";

/// Explorer API client combining coalesced HTTP lookups and real-time subscriptions.
#[derive(Debug)]
pub struct ExplorerClient {
    config: ExplorerClientConfig,
    codec: WireCodec,
    http: HttpTransport,
    tokens: TokenBatcher,
    ws: ExplorerWebSocketClient,
}

/// Token lookups bound to an [`ExplorerClient`].
#[derive(Clone, Copy, Debug)]
pub struct Tokens<'a> {
    batcher: &'a TokenBatcher,
}

impl Tokens<'_> {
    /// Fetches the token `public_key` through the coalescing batcher.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the token does not exist, or the bulk request error.
    pub async fn get(&self, public_key: &str, flush_now: bool) -> FetchResult<TokenDetails> {
        self.batcher.get(public_key, flush_now).await
    }
}

impl ExplorerClient {
    /// Builds the HTTP transport, the token batcher and a connecting socket for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or network headers are invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(config: ExplorerClientConfig) -> ExplorerClientResult<Self> {
        Self::connect_with_codec(config, WireCodec::default())
    }

    /// Same as [`Self::connect`] with an explicit wire codec (e.g. [`WireCodec::lenient`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or network headers are invalid.
    pub fn connect_with_codec(
        config: ExplorerClientConfig,
        codec: WireCodec,
    ) -> ExplorerClientResult<Self> {
        let http = HttpTransport::new(config.http_config()?, codec.clone())?;
        let tokens = TokenBatcher::new(http.clone());
        let ws = ExplorerWebSocketClient::connect(config.websocket_config()?, codec.clone());

        tracing::debug!(
            base_url = %http.base_url(),
            network = %config.network.network_alias,
            "Explorer client created"
        );

        Ok(Self {
            config,
            codec,
            http,
            tokens,
            ws,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExplorerClientConfig {
        &self.config
    }

    /// Returns the HTTP transport.
    #[must_use]
    pub const fn http(&self) -> &HttpTransport {
        &self.http
    }

    /// Returns the token lookups.
    #[must_use]
    pub const fn tokens(&self) -> Tokens<'_> {
        Tokens {
            batcher: &self.tokens,
        }
    }

    /// Returns the subscription channel manager.
    #[must_use]
    pub const fn websocket(&self) -> &ExplorerWebSocketClient {
        &self.ws
    }

    /// Fetches the settings of the active network.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn network_settings(&self) -> FetchResult<NetworkSettingsResponse> {
        self.http.get(NETWORK_SETTINGS_PATH, &[]).await
    }

    /// Switches to `network` after checking that the explorer serves it.
    ///
    /// The transport, batcher and socket are rebuilt. The previous socket is closed, so its
    /// subscriptions and listeners do not carry over.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerClientError::InvalidNetwork`] if the settings probe fails.
    pub async fn update_network_config(&mut self, network: NetworkConfig) -> ExplorerClientResult<()> {
        let mut config = self.config.clone();
        config.network = network;

        let probe = HttpTransport::new(config.http_config()?, self.codec.clone())?;
        if let Err(e) = probe
            .get::<NetworkSettingsResponse>(NETWORK_SETTINGS_PATH, &[])
            .await
        {
            tracing::warn!(
                network = %config.network.network_alias,
                "Network validation failed: {e}"
            );
            return Err(ExplorerClientError::InvalidNetwork(
                config.network.network_alias,
            ));
        }

        let ws = ExplorerWebSocketClient::connect(config.websocket_config()?, self.codec.clone());
        let previous = std::mem::replace(&mut self.ws, ws);
        previous.close().await;

        self.tokens = TokenBatcher::new(probe.clone());
        self.http = probe;
        self.config = config;

        tracing::info!(network = %self.config.network.network_alias, "Network config updated");
        Ok(())
    }

    /// Aborts every in-flight HTTP request. Returns the number aborted.
    pub fn abort_all_pending_requests(&self) -> usize {
        self.http.pending().abort_all()
    }

    /// Aborts in-flight requests whose URL starts with `url_prefix` and that were sent more than
    /// `tolerance` ago (default 1 s). Returns the number aborted.
    pub fn abort_stale_requests(&self, url_prefix: &str, tolerance: Option<Duration>) -> usize {
        self.http
            .pending()
            .abort_stale(url_prefix, tolerance.unwrap_or(DEFAULT_STALE_TOLERANCE))
    }

    /// Closes the socket.
    pub async fn close(&self) {
        self.ws.close().await;
    }
}
