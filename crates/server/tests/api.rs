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

//! Integration tests for the explorer server routes and subscription endpoint.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use explorer_common::{
    codec::WireCodec,
    enums::{AckStatus, Channel, TokenType},
    messages::{ClientFrame, ServerFrame, SubscriptionAck, SubscriptionRequest, parse_server_frame},
    models::{ErrorResponse, NetworkSettingsResponse, TokenResponse, TokensResponse},
    testing::{test_public_key, wait_until_async},
};
use explorer_server::{
    AppState, ServerConfig, build_router,
    ledger::{AccountInfo, MemoryLedger, MemoryLedgerFactory},
};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    factory: Arc<MemoryLedgerFactory>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1/{path}", self.addr)
    }

    fn ledger(&self, alias: &str) -> Arc<MemoryLedger> {
        self.factory.ledger(alias).expect("unknown test network")
    }
}

fn base_token() -> String {
    test_public_key(0)
}

fn seeded_factory() -> Arc<MemoryLedgerFactory> {
    let factory = MemoryLedgerFactory::with_networks(["test", "main"], &base_token());
    for alias in ["test", "main"] {
        let ledger = factory.ledger(alias).expect("seeded network");
        ledger.insert(AccountInfo::token(base_token(), "KTA", "Base token"));
        ledger.insert(AccountInfo::token(test_public_key(1), "ONE", "Token one"));
        ledger.insert(AccountInfo::token(test_public_key(2), "TWO", "Token two"));
        ledger.insert(AccountInfo::account(test_public_key(3)));
    }
    Arc::new(factory)
}

fn test_config() -> ServerConfig {
    ServerConfig {
        networks: vec!["test".to_string(), "main".to_string()],
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig, factory: Arc<MemoryLedgerFactory>) -> TestServer {
    let state = AppState::new(config, factory.clone());
    let router = build_router(state.clone()).expect("failed to build router");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("missing local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });

    TestServer {
        addr,
        state,
        factory,
    }
}

async fn get(url: &str) -> (StatusCode, String) {
    let response = reqwest::get(url).await.expect("request failed");
    let status = response.status();
    (status, response.text().await.expect("missing body"))
}

async fn connect(server: &TestServer, query: &str) -> WsStream {
    let url = format!("ws://{}/api/v1/ws{query}", server.addr);
    let (stream, _) = connect_async(url).await.expect("failed to connect");
    stream
}

async fn send_frame(ws: &mut WsStream, frame: &ClientFrame) {
    let text = WireCodec::default().encode(frame).unwrap();
    ws.send(Message::text(text)).await.unwrap();
}

async fn next_frame(ws: &mut WsStream) -> ServerFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return parse_server_frame(&WireCodec::default(), text.as_str()).unwrap();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// REST
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_bulk_tokens_keep_tokens_only() {
    let server = start_server(test_config(), seeded_factory()).await;
    let url = format!(
        "{}?publicKey={}&publicKey={}&publicKey={}&publicKey={}",
        server.url("token"),
        test_public_key(1),
        test_public_key(2),
        test_public_key(3),
        base_token(),
    );

    let (status, body) = get(&url).await;
    assert_eq!(status, StatusCode::OK);

    let response: TokensResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(response.tokens.len(), 3);
    assert!(!response.tokens.contains_key(&test_public_key(3)));
    assert_eq!(response.tokens[&base_token()].token_type, TokenType::Base);
    assert_eq!(response.tokens[&test_public_key(1)].currency_code, "ONE");
    assert_eq!(server.ledger("test").request_sizes(), vec![4]);
}

#[tokio::test]
async fn test_bulk_tokens_validate_query() {
    let server = start_server(test_config(), seeded_factory()).await;

    let (missing, _) = get(&server.url("token")).await;
    let (invalid, body) = get(&format!("{}?publicKey=T1", server.url("token"))).await;

    assert_eq!(missing, StatusCode::BAD_REQUEST);
    assert_eq!(invalid, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(error.message, "Invalid public key: T1");
}

#[tokio::test]
async fn test_bulk_tokens_degrade_under_size_limit() {
    let factory = seeded_factory();
    let ledger = MemoryLedger::new("test", base_token()).with_max_request_bytes(800);
    let keys: Vec<String> = (10..22).map(test_public_key).collect();
    for key in &keys {
        ledger.insert(AccountInfo::token(key.clone(), "T", "Token"));
    }
    factory.add(Arc::new(ledger));
    let server = start_server(test_config(), factory).await;

    let query: Vec<String> = keys.iter().map(|k| format!("publicKey={k}")).collect();
    let (status, body) = get(&format!("{}?{}", server.url("token"), query.join("&"))).await;

    assert_eq!(status, StatusCode::OK);
    let response: TokensResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(response.tokens.len(), 12);

    // 200 / 17 is the first per-request size below 12 keys
    let sizes = server.ledger("test").request_sizes();
    assert_eq!(sizes.len(), 18);
    assert_eq!(&sizes[16..], &[6, 6]);
}

#[tokio::test]
async fn test_bulk_tokens_give_up_after_max_attempts() {
    let factory = seeded_factory();
    factory.add(Arc::new(
        MemoryLedger::new("test", base_token()).with_max_request_bytes(100),
    ));
    let server = start_server(test_config(), factory).await;
    let url = format!(
        "{}?publicKey={}&publicKey={}",
        server.url("token"),
        test_public_key(1),
        test_public_key(2),
    );

    let (status, _) = get(&url).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(server.ledger("test").request_sizes().len(), 20);
}

#[tokio::test]
async fn test_single_token() {
    let server = start_server(test_config(), seeded_factory()).await;

    let (status, body) = get(&server.url(&format!("token/{}", test_public_key(2)))).await;
    assert_eq!(status, StatusCode::OK);
    let response: TokenResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(response.token.name, "Token two");

    let (account, _) = get(&server.url(&format!("token/{}", test_public_key(3)))).await;
    let (unknown, _) = get(&server.url(&format!("token/{}", test_public_key(9)))).await;
    let (invalid, body) = get(&server.url("token/T1")).await;

    assert_eq!(account, StatusCode::NOT_FOUND);
    assert_eq!(unknown, StatusCode::NOT_FOUND);
    assert_eq!(invalid, StatusCode::NOT_FOUND);
    let error: ErrorResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(error.message, "Invalid public key");
}

#[tokio::test]
async fn test_network_settings_selection() {
    let server = start_server(test_config(), seeded_factory()).await;
    let client = reqwest::Client::new();

    let by_header = client
        .get(server.url("network/settings"))
        .header("x-network-alias", "main")
        .send()
        .await
        .unwrap();
    assert_eq!(by_header.status(), StatusCode::OK);
    let settings: NetworkSettingsResponse =
        WireCodec::default().decode(&by_header.text().await.unwrap()).unwrap();
    assert_eq!(settings.config.network_alias, "main");

    let (status, body) = get(&server.url("network/settings")).await;
    assert_eq!(status, StatusCode::OK);
    let settings: NetworkSettingsResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(settings.config.network_alias, "test");

    let (unknown, _) = get(&format!("{}?networkAlias=dev", server.url("network/settings"))).await;
    assert_eq!(unknown, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = start_server(test_config(), seeded_factory()).await;

    let (status, body) = get(&server.url("blocks")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = WireCodec::default().decode(&body).unwrap();
    assert_eq!(error.message, "Not found");
}

// ------------------------------------------------------------------------------------------------
// WebSocket
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_ws_health() {
    let server = start_server(test_config(), seeded_factory()).await;

    let (status, body) = get(&server.url("ws/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn test_ws_routes_can_be_disabled() {
    let config = ServerConfig {
        start_ws_server: false,
        ..test_config()
    };
    let server = start_server(config, seeded_factory()).await;

    let (status, _) = get(&server.url("ws/health")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscription_receives_changes_until_unsubscribed() {
    let server = start_server(test_config(), seeded_factory()).await;
    let ledger = server.ledger("main");
    let account = test_public_key(3);
    let mut ws = connect(&server, "?networkAlias=main").await;

    let request = SubscriptionRequest::new(Channel::Account, account.clone(), Some(1));
    send_frame(&mut ws, &ClientFrame::Subscribe(request.clone())).await;
    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Subscribe(SubscriptionAck::answering(&request, AckStatus::Success))
    );

    assert_eq!(ledger.publish_change(&account, "H1"), 1);
    let ServerFrame::Message(message) = next_frame(&mut ws).await else {
        panic!("expected message frame");
    };
    assert_eq!(message.public_key(), account);
    assert_eq!(message.current_head_block(), Some("H1"));

    let request = SubscriptionRequest::new(Channel::Account, account.clone(), Some(2));
    send_frame(&mut ws, &ClientFrame::Unsubscribe(request.clone())).await;
    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Unsubscribe(SubscriptionAck::answering(&request, AckStatus::Success))
    );
    assert_eq!(ledger.listener_count(&account), 0);
    assert_eq!(server.ledger("test").listener_count(&account), 0);
}

#[tokio::test]
async fn test_subscribe_errors_are_acknowledged() {
    let server = start_server(test_config(), seeded_factory()).await;
    let mut ws = connect(&server, "").await;

    // Token channel does not serve plain accounts
    let wrong_kind = SubscriptionRequest::new(Channel::Token, test_public_key(3), Some(1));
    send_frame(&mut ws, &ClientFrame::Subscribe(wrong_kind.clone())).await;
    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Subscribe(SubscriptionAck::answering(&wrong_kind, AckStatus::Error))
    );

    ws.send(Message::text("{garbage")).await.unwrap();

    let never = SubscriptionRequest::new(Channel::Account, test_public_key(3), Some(2));
    send_frame(&mut ws, &ClientFrame::Unsubscribe(never.clone())).await;
    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Unsubscribe(SubscriptionAck::answering(&never, AckStatus::Error))
    );
}

#[tokio::test]
async fn test_disconnect_releases_only_own_listeners() {
    let server = start_server(test_config(), seeded_factory()).await;
    let ledger = server.ledger("test");
    let account = test_public_key(3);

    let mut first = connect(&server, "").await;
    let mut second = connect(&server, "").await;
    for (ws, request_id) in [(&mut first, 1), (&mut second, 2)] {
        let request = SubscriptionRequest::new(Channel::Account, account.clone(), Some(request_id));
        send_frame(ws, &ClientFrame::Subscribe(request)).await;
        let _ = next_frame(ws).await;
    }
    assert_eq!(ledger.listener_count(&account), 2);
    assert_eq!(server.state.connection_count(), 2);

    first.close(None).await.unwrap();

    let ledger_clone = ledger.clone();
    let account_clone = account.clone();
    wait_until_async(
        || {
            let ledger = ledger_clone.clone();
            let account = account_clone.clone();
            async move { ledger.listener_count(&account) == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(server.state.connection_count(), 1);

    assert_eq!(ledger.publish_change(&account, "H2"), 1);
    let ServerFrame::Message(message) = next_frame(&mut second).await else {
        panic!("expected message frame");
    };
    assert_eq!(message.current_head_block(), Some("H2"));
}

#[tokio::test]
async fn test_ws_unknown_network_is_rejected() {
    let server = start_server(test_config(), seeded_factory()).await;
    let url = format!("ws://{}/api/v1/ws?networkAlias=dev", server.addr);

    assert!(connect_async(url).await.is_err());
}
