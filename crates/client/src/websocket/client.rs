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

//! Provides the WebSocket client for explorer subscription channels.
//!
//! The client keeps the set of confirmed subscriptions and replays it after every reconnect, so
//! callers subscribe once and keep receiving `message-<channel>` events across transport drops.

use std::{
    fmt::Debug,
    sync::Arc,
    time::Duration,
};

use explorer_common::{
    codec::WireCodec,
    enums::{AckStatus, Channel, ConnectionState},
    messages::{ChannelMessage, ClientFrame, SubscriptionAck, SubscriptionRequest},
};
use explorer_network::websocket::WebSocketConfig;
use futures_util::Stream;
use tokio::{
    sync::{Mutex, broadcast::error::RecvError, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::{
    error::{ExplorerWsError, ExplorerWsResult},
    handler::{FeedHandler, HandlerCommand, WsShared},
    listeners::{Listener, ListenerToken, SdkEvent, SdkEventData},
};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Subscribe/unsubscribe handshake shared by the client handles and the replay after reconnect.
#[derive(Clone, Debug)]
pub(super) struct Requester {
    shared: Arc<WsShared>,
    cmd_tx: mpsc::UnboundedSender<HandlerCommand>,
    readiness_timeout: Duration,
    ack_timeout: Duration,
}

impl Requester {
    pub(super) fn new(
        shared: Arc<WsShared>,
        cmd_tx: mpsc::UnboundedSender<HandlerCommand>,
        config: &WebSocketConfig,
    ) -> Self {
        Self {
            shared,
            cmd_tx,
            readiness_timeout: config.readiness_timeout,
            ack_timeout: config.ack_timeout,
        }
    }

    async fn wait_ready(&self) -> ExplorerWsResult<()> {
        let deadline = Instant::now() + self.readiness_timeout;
        loop {
            if self.shared.is_transport_open() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ExplorerWsError::NotConnected);
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    async fn request(
        &self,
        frame: ClientFrame,
        channel: Channel,
        request_id: u64,
    ) -> ExplorerWsResult<SubscriptionAck> {
        self.wait_ready().await?;

        let kind = frame.message_type();
        let text = self.shared.codec.encode(&frame)?;
        let rx = self.shared.acks.register(request_id, kind, channel);

        if let Err(e) = self.cmd_tx.send(HandlerCommand::Send { text, request_id }) {
            self.shared.acks.cancel(request_id);
            return Err(ExplorerWsError::Send(e.to_string()));
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Tracker dropped with the client
            Ok(Err(_)) => Err(ExplorerWsError::NotConnected),
            Err(_) => {
                self.shared.acks.cancel(request_id);
                Err(ExplorerWsError::Timeout(format!(
                    "no {kind} acknowledgement for {channel} within {:?}",
                    self.ack_timeout
                )))
            }
        }
    }

    pub(super) async fn subscribe(&self, channel: Channel, id: &str) -> ExplorerWsResult<()> {
        let request_id = self.shared.next_request_id();
        let request = SubscriptionRequest::new(channel, id, Some(request_id));
        let ack = self
            .request(ClientFrame::Subscribe(request), channel, request_id)
            .await?;

        match ack.status {
            AckStatus::Success => {
                self.shared.remember(channel, id);
                Ok(())
            }
            AckStatus::Error => Err(ExplorerWsError::Rejected {
                action: "subscribe",
                channel,
                id: id.to_string(),
            }),
        }
    }

    pub(super) async fn unsubscribe(&self, channel: Channel, id: &str) -> ExplorerWsResult<()> {
        let request_id = self.shared.next_request_id();
        let request = SubscriptionRequest::new(channel, id, Some(request_id));
        let ack = self
            .request(ClientFrame::Unsubscribe(request), channel, request_id)
            .await?;

        match ack.status {
            AckStatus::Success => {
                self.shared.listeners.remove_event(SdkEvent::Message(channel));
                self.shared.forget(channel, id);
                Ok(())
            }
            AckStatus::Error => Err(ExplorerWsError::Rejected {
                action: "unsubscribe",
                channel,
                id: id.to_string(),
            }),
        }
    }
}

/// WebSocket client for explorer subscription channels.
///
/// Cloning is cheap; all clones share one connection task. Dropping the last clone cancels the
/// task, which closes the socket and stops reconnecting.
#[derive(Clone)]
pub struct ExplorerWebSocketClient {
    url: String,
    shared: Arc<WsShared>,
    requester: Requester,
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel_token: CancellationToken,
    _cancel_on_drop: Arc<DropGuard>,
}

impl Debug for ExplorerWebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ExplorerWebSocketClient))
            .field("url", &self.url)
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions().len())
            .finish_non_exhaustive()
    }
}

impl ExplorerWebSocketClient {
    /// Spawns the connection task for `config` and returns immediately.
    ///
    /// The client starts in [`ConnectionState::Connecting`]. Use [`Self::wait_until_open`] for
    /// explicit readiness, or rely on the readiness wait built into [`Self::subscribe`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn connect(config: WebSocketConfig, codec: WireCodec) -> Self {
        let shared = Arc::new(WsShared::new(codec));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let requester = Requester::new(shared.clone(), cmd_tx, &config);

        let url = config.url.clone();
        let handler = FeedHandler::new(
            config,
            shared.clone(),
            requester.clone(),
            cmd_rx,
            cancel_token.clone(),
        );
        let handle = tokio::spawn(handler.run());

        Self {
            url,
            shared,
            requester,
            task_handle: Arc::new(Mutex::new(Some(handle))),
            _cancel_on_drop: Arc::new(cancel_token.clone().drop_guard()),
            cancel_token,
        }
    }

    /// Returns the URL the client connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns whether the connection is open and the subscriptions were replayed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns a snapshot of the confirmed subscriptions, replayed on reconnect.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(Channel, String)> {
        self.shared.remembered()
    }

    /// Returns the timestamp carried by the last `pong`, if any.
    #[must_use]
    pub fn last_pong_ms(&self) -> Option<i64> {
        self.shared.last_pong_ms()
    }

    /// Subscribes to changes of entity `id` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The transport does not open within the readiness timeout ([`ExplorerWsError::NotConnected`]).
    /// - The server acknowledges with an error ([`ExplorerWsError::Rejected`]).
    /// - No acknowledgement arrives within the ack timeout ([`ExplorerWsError::Timeout`]).
    pub async fn subscribe(&self, channel: Channel, id: &str) -> ExplorerWsResult<()> {
        self.requester.subscribe(channel, id).await
    }

    /// Unsubscribes from entity `id` on `channel`.
    ///
    /// On success every `message-<channel>` listener is removed and `id` is forgotten.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::subscribe`].
    pub async fn unsubscribe(&self, channel: Channel, id: &str) -> ExplorerWsResult<()> {
        self.requester.unsubscribe(channel, id).await
    }

    /// Registers `listener` for `event`.
    pub fn on(&self, event: SdkEvent, listener: Listener) -> ListenerToken {
        self.shared.listeners.add(event, listener)
    }

    /// Removes the listener registered under `token`. Unknown tokens are ignored.
    pub fn off(&self, token: ListenerToken) {
        self.shared.listeners.remove(token);
    }

    /// Registers a listener for inbound messages on `channel`.
    pub fn on_message<F>(&self, channel: Channel, callback: F) -> ListenerToken
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.on(
            SdkEvent::Message(channel),
            Arc::new(move |data: &SdkEventData| {
                if let SdkEventData::Message(message) = data {
                    callback(message);
                }
            }),
        )
    }

    /// Registers a listener for connection state transitions.
    pub fn on_state_change<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on(
            SdkEvent::StateChange,
            Arc::new(move |data: &SdkEventData| {
                if let SdkEventData::StateChange(state) = data {
                    callback(*state);
                }
            }),
        )
    }

    /// Removes every listener.
    pub fn remove_all_listeners(&self) {
        self.shared.listeners.clear();
    }

    /// Returns the number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: SdkEvent) -> usize {
        self.shared.listeners.count(event)
    }

    /// Returns a stream of every inbound channel message received after this call.
    pub fn stream(&self) -> impl Stream<Item = ChannelMessage> + Send + 'static {
        let mut rx = self.shared.subscribe_messages();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => yield message,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Message stream lagged, skipped {skipped} messages");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Waits until the connection is [`ConnectionState::Open`].
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerWsError::Timeout`] if the connection does not open within `timeout`.
    pub async fn wait_until_open(&self, timeout: Duration) -> ExplorerWsResult<()> {
        tokio::time::timeout(timeout, async {
            while !self.is_open() {
                tokio::time::sleep(READINESS_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| {
            ExplorerWsError::Timeout(format!("connection not open after {timeout:?}"))
        })
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Announces `CLOSING`, then `CLOSED` once the connection task has finished. Calling it again
    /// is a no-op.
    pub async fn close(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }

        self.shared.set_state(ConnectionState::Closing);
        self.cancel_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::error!("Error awaiting connection task: {e}");
        }

        self.shared.mark_transport_closed();
        self.shared.set_state(ConnectionState::Closed);
        tracing::debug!("Closed connection to {}", self.url);
    }
}
