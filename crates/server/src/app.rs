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

//! Shared server state and the Axum router.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use axum::{
    Router,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use explorer_common::{
    codec::WireCodec,
    models::{NetworkIdentity, NetworkSettingsResponse},
    network::NetworkConfig,
};
use explorer_network::degrading::DegradingFetch;
use serde::Serialize;

use crate::{
    batcher::AccountInfoBatcher,
    cache::NetworkCache,
    config::ServerConfig,
    error::{ApiError, ApiResult},
    ledger::{LedgerClient, LedgerError, LedgerFactory},
    tokens, websocket,
};

/// Ledger client and account batcher of one network.
#[derive(Clone, Debug)]
pub struct NetworkHandle {
    pub ledger: Arc<dyn LedgerClient>,
    pub accounts: AccountInfoBatcher,
}

impl NetworkHandle {
    /// Creates a new [`NetworkHandle`] instance.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            accounts: AccountInfoBatcher::new(ledger.clone()),
            ledger,
        }
    }
}

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub codec: WireCodec,
    pub degrading: DegradingFetch,
    factory: Arc<dyn LedgerFactory>,
    cache: Arc<NetworkCache<NetworkHandle>>,
    connections: Arc<AtomicUsize>,
    next_connection_id: Arc<AtomicU64>,
}

impl AppState {
    /// Creates the state for `config`, building ledger clients through `factory`.
    #[must_use]
    pub fn new(config: ServerConfig, factory: Arc<dyn LedgerFactory>) -> Self {
        let cache = NetworkCache::new(config.network_cache_capacity);
        Self {
            config: Arc::new(config),
            codec: WireCodec::default(),
            degrading: DegradingFetch::default(),
            factory,
            cache: Arc::new(cache),
            connections: Arc::new(AtomicUsize::new(0)),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Replaces the wire codec.
    #[must_use]
    pub fn with_codec(mut self, codec: WireCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Returns the per-network cache.
    #[must_use]
    pub fn cache(&self) -> &NetworkCache<NetworkHandle> {
        &self.cache
    }

    /// Returns the ledger client and batcher of `network`, creating them on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the network is not served.
    pub fn network(&self, network: &NetworkConfig) -> ApiResult<NetworkHandle> {
        let alias = &network.network_alias;
        if !self.config.serves(alias) {
            return Err(ApiError::NotFound(format!("Network {alias} not found")));
        }

        self.cache
            .get_or_try_insert_with(network, || {
                tracing::debug!(network = %alias, "Creating ledger client");
                self.factory.create(network).map(NetworkHandle::new)
            })
            .map_err(|e| match e {
                LedgerError::NotFound(_) => ApiError::NotFound(format!("Network {alias} not found")),
                other => ApiError::Internal(other.to_string()),
            })
    }

    /// Returns the number of open subscription connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_opened(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Encodes `value` with the wire codec into a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the value cannot be encoded.
    pub fn encode_response<T: Serialize>(&self, value: &T) -> ApiResult<Response> {
        let json = self
            .codec
            .encode(value)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
    }
}

/// Network selected by a request through `x-network-*` headers or query parameters.
///
/// Falls back to the configured default network.
#[derive(Clone, Debug)]
pub struct RequestNetwork(pub NetworkConfig);

impl FromRequestParts<AppState> for RequestNetwork {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let query: Vec<(String, String)> = Query::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let headers = &parts.headers;

        let network = NetworkConfig::from_lookup(
            |name| {
                headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            },
            |name| {
                query
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
            },
        )
        .unwrap_or_else(|| NetworkConfig::new(state.config.default_network.clone()));

        Ok(Self(network))
    }
}

/// `GET network/settings`
///
/// # Errors
///
/// Returns 404 if the network is not served.
pub async fn get_network_settings(
    State(state): State<AppState>,
    RequestNetwork(network): RequestNetwork,
) -> ApiResult<Response> {
    let handle = state.network(&network)?;
    let response = NetworkSettingsResponse {
        settings: handle.ledger.settings(),
        config: NetworkIdentity {
            network_alias: handle.ledger.network_alias().to_string(),
        },
    };
    state.encode_response(&response)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

/// Builds the router serving every route under `/api/v{major}`.
///
/// # Errors
///
/// Returns an error if the configured version is invalid.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let prefix = state.config.api_prefix()?;

    let mut api = Router::new()
        .route("/token", get(tokens::get_tokens))
        .route("/token/{public_key}", get(tokens::get_token))
        .route("/network/settings", get(get_network_settings));

    if state.config.start_ws_server {
        api = api
            .route("/ws", get(websocket::ws_upgrade))
            .route("/ws/health", get(websocket::health));
    }

    Ok(Router::new()
        .nest(&prefix, api)
        .fallback(not_found)
        .with_state(state))
}
