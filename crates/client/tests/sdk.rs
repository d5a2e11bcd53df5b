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

//! Integration tests for the explorer SDK HTTP paths using a mock Axum server.

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use explorer_client::{ExplorerClient, ExplorerClientConfig, ExplorerClientError};
use explorer_common::{
    codec::encode,
    enums::{TokenAccessMode, TokenType},
    models::{
        ErrorResponse, NetworkIdentity, NetworkSettings, NetworkSettingsResponse, TokenDetails,
        TokensResponse,
    },
    network::NetworkConfig,
    numeric::Numeric,
};
use explorer_network::error::FetchError;

#[derive(Clone, Default)]
struct TestServerState {
    token_requests: Arc<tokio::sync::Mutex<Vec<Vec<String>>>>,
    known_tokens: Arc<tokio::sync::Mutex<Vec<String>>>,
    networks: Arc<tokio::sync::Mutex<Vec<String>>>,
    token_delay: Arc<tokio::sync::Mutex<Option<Duration>>>,
}

fn token(key: &str) -> TokenDetails {
    TokenDetails {
        name: format!("Token {key}"),
        currency_code: key.to_uppercase(),
        decimal_places: 2,
        public_key: key.to_string(),
        supply: Numeric::from(10_000_i64),
        head_block: None,
        access_mode: TokenAccessMode::Public,
        default_permissions: vec!["ACCESS".to_string()],
        token_type: TokenType::Unknown,
    }
}

async fn handle_tokens(State(state): State<TestServerState>, RawQuery(query): RawQuery) -> Response {
    let keys: Vec<String> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(name, _)| name == "publicKey")
        .map(|(_, value)| value.into_owned())
        .collect();
    state.token_requests.lock().await.push(keys.clone());

    if let Some(delay) = *state.token_delay.lock().await {
        tokio::time::sleep(delay).await;
    }

    let known = state.known_tokens.lock().await.clone();
    let tokens: BTreeMap<String, TokenDetails> = keys
        .iter()
        .filter(|key| known.contains(key))
        .map(|key| (key.clone(), token(key)))
        .collect();

    encode(&TokensResponse { tokens }).unwrap().into_response()
}

async fn handle_settings(State(state): State<TestServerState>, headers: HeaderMap) -> Response {
    let alias = headers
        .get("x-network-alias")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !state.networks.lock().await.contains(&alias) {
        let body = ErrorResponse {
            message: format!("Network {alias} not found"),
        };
        return (StatusCode::NOT_FOUND, encode(&body).unwrap()).into_response();
    }

    let body = NetworkSettingsResponse {
        settings: NetworkSettings::default(),
        config: NetworkIdentity {
            network_alias: alias,
        },
    };
    encode(&body).unwrap().into_response()
}

async fn start_mock_server(state: TestServerState) -> SocketAddr {
    let router = Router::new()
        .route("/api/v1/token", get(handle_tokens))
        .route("/api/v1/network/settings", get(handle_settings))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind http listener");
    let addr = listener.local_addr().expect("missing local addr");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("http server failed");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn create_client(addr: SocketAddr) -> ExplorerClient {
    let mut config = ExplorerClientConfig::new(format!("http://{addr}/"));
    config.websocket.reconnect = false;
    ExplorerClient::connect(config).expect("failed to build client")
}

#[tokio::test]
async fn test_concurrent_token_lookups_share_one_request() {
    let state = TestServerState::default();
    state
        .known_tokens
        .lock()
        .await
        .extend(["T1".to_string(), "T3".to_string()]);
    let addr = start_mock_server(state.clone()).await;
    let client = create_client(addr);

    let tokens = client.tokens();
    let (t1, t2, t3, t1_again) = tokio::join!(
        tokens.get("T1", false),
        tokens.get("T2", false),
        tokens.get("T3", false),
        tokens.get("T1", false),
    );

    assert_eq!(t1.unwrap().public_key, "T1");
    assert_eq!(t3.unwrap().public_key, "T3");
    assert_eq!(t1_again.unwrap().public_key, "T1");
    assert_eq!(
        t2.unwrap_err(),
        FetchError::NotFound("Token not found: T2".to_string())
    );

    let requests = state.token_requests.lock().await.clone();
    assert_eq!(requests, vec![vec!["T1".to_string(), "T2".to_string(), "T3".to_string()]]);

    client.close().await;
}

#[tokio::test]
async fn test_flush_now_sends_immediately() {
    let state = TestServerState::default();
    state.known_tokens.lock().await.push("T1".to_string());
    let addr = start_mock_server(state.clone()).await;
    let client = create_client(addr);

    let details = client.tokens().get("T1", true).await.unwrap();

    assert_eq!(details.decimal_places, 2);
    assert_eq!(details.supply, Numeric::from(10_000_i64));
    assert_eq!(state.token_requests.lock().await.len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_update_network_config_validates_network() {
    let state = TestServerState::default();
    state
        .networks
        .lock()
        .await
        .extend(["test".to_string(), "main".to_string()]);
    let addr = start_mock_server(state.clone()).await;
    let mut client = create_client(addr);

    let result = client
        .update_network_config(NetworkConfig::new("unknown"))
        .await;
    assert_eq!(
        result,
        Err(ExplorerClientError::InvalidNetwork("unknown".to_string()))
    );
    assert_eq!(client.config().network.network_alias, "test");

    client
        .update_network_config(NetworkConfig::new("main"))
        .await
        .unwrap();

    assert_eq!(client.config().network.network_alias, "main");
    let settings = client.network_settings().await.unwrap();
    assert_eq!(settings.config.network_alias, "main");
    assert!(client.websocket().url().contains("networkAlias=main"));

    client.close().await;
}

#[tokio::test]
async fn test_abort_all_pending_requests() {
    let state = TestServerState::default();
    state.known_tokens.lock().await.push("T1".to_string());
    *state.token_delay.lock().await = Some(Duration::from_secs(5));
    let addr = start_mock_server(state.clone()).await;
    let client = Arc::new(create_client(addr));

    let lookup = {
        let client = client.clone();
        tokio::spawn(async move { client.tokens().get("T1", true).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.abort_stale_requests("http://unrelated/", None), 0);
    assert_eq!(client.abort_all_pending_requests(), 1);

    assert_eq!(lookup.await.unwrap(), Err(FetchError::Cancelled));

    client.close().await;
}
