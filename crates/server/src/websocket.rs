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

//! Subscription endpoint: one task per connection, each owning a [`SubscriptionRegistry`].

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use explorer_common::{
    codec::WireCodec,
    enums::AckStatus,
    messages::{ClientFrame, PongPayload, ServerFrame, SubscriptionAck, parse_client_frame},
    time::unix_millis,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};

use crate::{
    app::{AppState, RequestNetwork},
    error::ApiResult,
    ledger::LedgerClient,
    registry::{Outbound, SubscriptionRegistry},
};

/// `GET ws`: upgrades to a subscription connection on the requested network.
///
/// # Errors
///
/// Returns 404 before upgrading if the network is not served.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    RequestNetwork(network): RequestNetwork,
) -> ApiResult<Response> {
    let handle = state.network(&network)?;
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, handle.ledger)))
}

/// `GET ws/health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Runs one connection until the peer goes away, then releases its subscriptions.
pub async fn handle_connection(socket: WebSocket, state: AppState, ledger: Arc<dyn LedgerClient>) {
    let connection_id = state.connection_opened();
    let (outbound, mut rx) = Outbound::channel(connection_id, state.config.ws_outbound_capacity);
    let mut registry = SubscriptionRegistry::new(ledger, state.codec.clone(), outbound.clone());
    let (mut sink, mut stream) = socket.split();

    tracing::debug!(connection_id, "Connection opened");

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(connection_id, "Socket write failed: {e}");
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let Some(reply) = handle_frame(&mut registry, &state.codec, text.as_str()) else {
                    continue;
                };
                match state.codec.encode(&reply) {
                    Ok(text) => {
                        if !outbound.send(text).await {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(connection_id, "Failed to encode reply: {e}"),
                }
            }
            Ok(Message::Close(_)) => break,
            // Control frames are answered by the socket itself
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id, "Socket read failed: {e}");
                break;
            }
        }
    }

    let released = registry.release_all();
    drop(registry);
    writer.abort();
    state.connection_closed();

    tracing::debug!(
        connection_id,
        released,
        dropped = outbound.dropped(),
        "Connection closed"
    );
}

/// Applies one client frame to `registry` and returns the reply to send, if any.
///
/// Malformed frames are logged and dropped.
pub fn handle_frame(
    registry: &mut SubscriptionRegistry,
    codec: &WireCodec,
    text: &str,
) -> Option<ServerFrame> {
    let frame = match parse_client_frame(codec, text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping malformed frame: {e}");
            return None;
        }
    };

    let reply = match frame {
        ClientFrame::Subscribe(request) => {
            let status = match registry.subscribe(request.channel, &request.params.id) {
                Ok(()) => AckStatus::Success,
                Err(e) => {
                    tracing::warn!(channel = %request.channel, id = %request.params.id, "Subscribe failed: {e}");
                    AckStatus::Error
                }
            };
            ServerFrame::Subscribe(SubscriptionAck::answering(&request, status))
        }
        ClientFrame::Unsubscribe(request) => {
            let status = match registry.unsubscribe(request.channel, &request.params.id) {
                Ok(_) => AckStatus::Success,
                Err(_) => AckStatus::Error,
            };
            ServerFrame::Unsubscribe(SubscriptionAck::answering(&request, status))
        }
        ClientFrame::Ping(ping) => ServerFrame::Pong(PongPayload {
            timestamp: ping
                .timestamp
                .filter(|timestamp| *timestamp != 0)
                .unwrap_or_else(unix_millis),
        }),
    };
    Some(reply)
}
