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

//! End-to-end tests of the client SDK against the explorer server.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use explorer_client::{ExplorerClient, ExplorerClientConfig, ExplorerClientError};
use explorer_common::{
    enums::{Channel, ConnectionState, TokenType},
    messages::ChannelMessage,
    network::NetworkConfig,
    testing::{test_public_key, wait_until_async},
};
use explorer_network::error::FetchError;
use explorer_server::{
    AppState, ServerConfig, build_router,
    ledger::{AccountInfo, MemoryLedgerFactory},
};

async fn start_server() -> (SocketAddr, Arc<MemoryLedgerFactory>) {
    let factory = MemoryLedgerFactory::with_networks(["test", "main"], &test_public_key(0));
    for alias in ["test", "main"] {
        let ledger = factory.ledger(alias).expect("seeded network");
        ledger.insert(AccountInfo::token(test_public_key(0), "KTA", "Base token"));
        ledger.insert(AccountInfo::token(test_public_key(1), "ONE", "Token one"));
        ledger.insert(AccountInfo::account(test_public_key(2)));
    }
    let factory = Arc::new(factory);

    let config = ServerConfig {
        networks: vec!["test".to_string(), "main".to_string()],
        ..ServerConfig::default()
    };
    let router = build_router(AppState::new(config, factory.clone())).expect("router");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("missing local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });

    (addr, factory)
}

fn create_client(addr: SocketAddr) -> ExplorerClient {
    let mut config = ExplorerClientConfig::new(format!("http://{addr}/"));
    config.websocket.reconnect = false;
    ExplorerClient::connect(config).expect("failed to build client")
}

#[tokio::test]
async fn test_token_lookups_through_server() {
    let (addr, factory) = start_server().await;
    let client = create_client(addr);

    let tokens = client.tokens();
    let (key0, key1, key2) = (test_public_key(0), test_public_key(1), test_public_key(2));
    let (base, one, account) = tokio::join!(
        tokens.get(&key0, false),
        tokens.get(&key1, false),
        tokens.get(&key2, false),
    );

    assert_eq!(base.unwrap().token_type, TokenType::Base);
    assert_eq!(one.unwrap().currency_code, "ONE");
    assert_eq!(
        account.unwrap_err(),
        FetchError::NotFound(format!("Token not found: {}", test_public_key(2)))
    );
    let ledger = factory.ledger("test").unwrap();
    assert_eq!(ledger.request_sizes(), vec![3]);

    client.close().await;
}

#[tokio::test]
async fn test_subscription_through_server() {
    let (addr, factory) = start_server().await;
    let client = create_client(addr);
    let ws = client.websocket();
    let account = test_public_key(2);

    let received: Arc<Mutex<Vec<ChannelMessage>>> = Arc::default();
    let received_clone = received.clone();
    ws.on_message(Channel::Account, move |message: &ChannelMessage| {
        received_clone.lock().unwrap().push(message.clone());
    });

    ws.wait_until_open(Duration::from_secs(5)).await.unwrap();
    ws.subscribe(Channel::Account, &account).await.unwrap();
    assert_eq!(ws.subscriptions(), vec![(Channel::Account, account.clone())]);

    let ledger = factory.ledger("test").unwrap();
    assert_eq!(ledger.publish_change(&account, "H1"), 1);

    let received_wait = received.clone();
    wait_until_async(
        || {
            let received = received_wait.clone();
            async move { received.lock().unwrap().len() == 1 }
        },
        Duration::from_secs(2),
    )
    .await;
    {
        let messages = received.lock().unwrap();
        assert_eq!(messages[0].public_key(), account);
        assert_eq!(messages[0].current_head_block(), Some("H1"));
    }

    ws.unsubscribe(Channel::Account, &account).await.unwrap();
    assert!(ws.subscriptions().is_empty());
    assert_eq!(ledger.listener_count(&account), 0);

    // Token channel rejects plain accounts
    let result = ws.subscribe(Channel::Token, &account).await;
    assert!(result.is_err());

    client.close().await;
    assert_eq!(ws.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_network_switch_through_server() {
    let (addr, factory) = start_server().await;
    let mut client = create_client(addr);

    assert_eq!(
        client.update_network_config(NetworkConfig::new("dev")).await,
        Err(ExplorerClientError::InvalidNetwork("dev".to_string()))
    );

    client
        .update_network_config(NetworkConfig::new("main"))
        .await
        .unwrap();
    let ws = client.websocket();
    ws.wait_until_open(Duration::from_secs(5)).await.unwrap();
    ws.subscribe(Channel::Account, &test_public_key(2)).await.unwrap();

    assert_eq!(factory.ledger("main").unwrap().listener_count(&test_public_key(2)), 1);
    assert_eq!(factory.ledger("test").unwrap().listener_count(&test_public_key(2)), 0);

    client.close().await;
}
