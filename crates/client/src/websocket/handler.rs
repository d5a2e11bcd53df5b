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

//! Connection task for the explorer WebSocket client.
//!
//! The [`FeedHandler`] owns the socket. Each loop iteration opens one session: it connects,
//! replays the remembered subscriptions, then pumps outbound commands, pings and inbound frames
//! until the transport closes. Between sessions it waits `reconnect_delay`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering},
};

use ahash::AHashSet;
use dashmap::DashMap;
use explorer_common::{
    codec::WireCodec,
    enums::{Channel, ConnectionState, MessageType},
    messages::{ChannelMessage, ClientFrame, PingPayload, ServerFrame, parse_server_frame},
    time::unix_millis,
};
use explorer_network::websocket::WebSocketConfig;
use futures_util::{SinkExt, StreamExt, future::join_all};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderName, HeaderValue},
    },
};
use tokio_util::sync::CancellationToken;

use super::{
    acks::AckTracker,
    client::Requester,
    error::{ExplorerWsError, ExplorerWsResult},
    listeners::{ListenerRegistry, SdkEvent, SdkEventData},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the broadcast channel behind `stream()`.
const MESSAGE_BROADCAST_CAPACITY: usize = 1024;

/// Commands sent from the outer client to the connection task.
#[derive(Debug)]
pub enum HandlerCommand {
    /// Write an encoded text frame to the open socket. The request `request_id` is failed with
    /// `NotConnected` if the frame cannot be written.
    Send { text: String, request_id: u64 },
}

/// State shared between the client handles and the connection task.
#[derive(Debug)]
pub(super) struct WsShared {
    pub(super) codec: WireCodec,
    pub(super) listeners: ListenerRegistry,
    pub(super) acks: AckTracker,
    state: AtomicU8,
    transport_open: AtomicBool,
    epoch: AtomicU64,
    next_request_id: AtomicU64,
    last_pong_ms: AtomicI64,
    remembered: DashMap<Channel, AHashSet<String>>,
    message_tx: broadcast::Sender<ChannelMessage>,
}

impl WsShared {
    pub(super) fn new(codec: WireCodec) -> Self {
        let (message_tx, _) = broadcast::channel(MESSAGE_BROADCAST_CAPACITY);
        Self {
            codec,
            listeners: ListenerRegistry::default(),
            acks: AckTracker::default(),
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            transport_open: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            next_request_id: AtomicU64::new(0),
            last_pong_ms: AtomicI64::new(0),
            remembered: DashMap::new(),
            message_tx,
        }
    }

    pub(super) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Stores `state` and notifies `state-change` listeners if it differs from the current one.
    pub(super) fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel));
        if previous != state {
            tracing::debug!("Connection state {previous} -> {state}");
            self.listeners
                .emit(SdkEvent::StateChange, &SdkEventData::StateChange(state));
        }
    }

    pub(super) fn is_transport_open(&self) -> bool {
        self.transport_open.load(Ordering::Acquire)
    }

    /// Marks the transport closed and fails every request still waiting for an ack.
    pub(super) fn mark_transport_closed(&self) {
        self.transport_open.store(false, Ordering::Release);
        self.acks.fail_all(&ExplorerWsError::NotConnected);
    }

    pub(super) fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(super) fn last_pong_ms(&self) -> Option<i64> {
        match self.last_pong_ms.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    pub(super) fn remember(&self, channel: Channel, id: &str) {
        self.remembered
            .entry(channel)
            .or_default()
            .insert(id.to_string());
    }

    pub(super) fn forget(&self, channel: Channel, id: &str) {
        if let Some(mut ids) = self.remembered.get_mut(&channel) {
            ids.remove(id);
        }
        self.remembered.remove_if(&channel, |_, ids| ids.is_empty());
    }

    pub(super) fn remembered(&self) -> Vec<(Channel, String)> {
        let mut entries: Vec<(Channel, String)> = self
            .remembered
            .iter()
            .flat_map(|entry| {
                let channel = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(|id| (channel, id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort();
        entries
    }

    pub(super) fn subscribe_messages(&self) -> broadcast::Receiver<ChannelMessage> {
        self.message_tx.subscribe()
    }

    fn dispatch_message(&self, message: ChannelMessage) {
        let event = SdkEvent::Message(message.channel());
        self.listeners
            .emit(event, &SdkEventData::Message(message.clone()));
        // No receivers is the common case
        let _ = self.message_tx.send(message);
    }
}

pub(super) struct FeedHandler {
    config: WebSocketConfig,
    shared: Arc<WsShared>,
    requester: Requester,
    cmd_rx: mpsc::UnboundedReceiver<HandlerCommand>,
    cancel: CancellationToken,
}

impl FeedHandler {
    /// Creates a new [`FeedHandler`] instance.
    pub(super) fn new(
        config: WebSocketConfig,
        shared: Arc<WsShared>,
        requester: Requester,
        cmd_rx: mpsc::UnboundedReceiver<HandlerCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            shared,
            requester,
            cmd_rx,
            cancel,
        }
    }

    /// Runs sessions until cancelled, or until the transport closes with reconnection disabled.
    pub(super) async fn run(mut self) {
        loop {
            self.shared.set_state(ConnectionState::Connecting);

            let request = match build_request(&self.config) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!("Invalid WebSocket request for {}: {e}", self.config.url);
                    self.shared.set_state(ConnectionState::Closed);
                    break;
                }
            };

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = connect_async(request) => result,
            };

            match connected {
                Ok((stream, _response)) => self.run_session(stream).await,
                Err(e) => tracing::warn!("Failed to connect to {}: {e}", self.config.url),
            }

            self.shared.mark_transport_closed();

            if self.cancel.is_cancelled() {
                break;
            }

            self.shared.set_state(ConnectionState::Closed);

            if !self.config.reconnect || !self.wait_reconnect_delay().await {
                break;
            }

            tracing::info!("Reconnecting to {}", self.config.url);
        }

        self.drain_commands();
        tracing::debug!("Handler task exiting");
    }

    async fn run_session(&mut self, stream: WsStream) {
        let (mut writer, mut reader) = stream.split();

        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.transport_open.store(true, Ordering::Release);
        tracing::info!("Connected to {}", self.config.url);

        let replay = tokio::spawn(replay_subscriptions(
            self.requester.clone(),
            self.shared.clone(),
            epoch,
        ));

        let period = self.config.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Closing connection");
                    if let Err(e) = writer.send(Message::Close(None)).await {
                        tracing::debug!("Failed to send close frame: {e}");
                    }
                    break;
                }
                Some(cmd) = self.cmd_rx.recv() => match cmd {
                    HandlerCommand::Send { text, request_id } => {
                        if let Err(e) = writer.send(Message::Text(text.into())).await {
                            tracing::warn!("Failed to send frame: {e}");
                            self.shared.acks.fail(request_id, &ExplorerWsError::NotConnected);
                            break;
                        }
                    }
                },
                _ = ping.tick() => {
                    let frame = ClientFrame::Ping(PingPayload {
                        timestamp: Some(unix_millis()),
                    });
                    match self.shared.codec.encode(&frame) {
                        Ok(text) => {
                            if let Err(e) = writer.send(Message::Text(text.into())).await {
                                tracing::warn!("Failed to send ping: {e}");
                                break;
                            }
                        }
                        Err(e) => tracing::error!("Failed to encode ping: {e}"),
                    }
                }
                msg = reader.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = writer.send(Message::Pong(data)).await {
                            tracing::warn!("Failed to answer transport ping: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("Server closed connection: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket transport error: {e}");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                },
            }
        }

        replay.abort();
    }

    fn handle_text(&self, text: &str) {
        match parse_server_frame(&self.shared.codec, text) {
            Ok(ServerFrame::Message(message)) => self.shared.dispatch_message(message),
            Ok(ServerFrame::Subscribe(ack)) => {
                self.shared.acks.resolve(MessageType::Subscribe, ack);
            }
            Ok(ServerFrame::Unsubscribe(ack)) => {
                self.shared.acks.resolve(MessageType::Unsubscribe, ack);
            }
            Ok(ServerFrame::Pong(pong)) => {
                self.shared
                    .last_pong_ms
                    .store(pong.timestamp, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!("Dropping malformed frame: {e}"),
        }
    }

    /// Waits out the reconnect delay. Returns `false` if cancelled meanwhile.
    async fn wait_reconnect_delay(&mut self) -> bool {
        let delay = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = &mut delay => return true,
                Some(cmd) = self.cmd_rx.recv() => self.drop_command(cmd),
            }
        }
    }

    fn drop_command(&self, cmd: HandlerCommand) {
        match cmd {
            HandlerCommand::Send { request_id, .. } => {
                tracing::debug!(request_id, "Dropping outbound frame while disconnected");
                self.shared
                    .acks
                    .fail(request_id, &ExplorerWsError::NotConnected);
            }
        }
    }

    /// Fails every queued command once the task stops for good.
    fn drain_commands(&mut self) {
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.drop_command(cmd);
        }
    }
}

fn build_request(config: &WebSocketConfig) -> ExplorerWsResult<Request> {
    let mut request = config.url.as_str().into_client_request()?;
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ExplorerWsError::Transport(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ExplorerWsError::Transport(format!("Invalid header value: {e}")))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

/// Re-issues every remembered subscription, then announces `OPEN` unless the session was
/// superseded or closed meanwhile.
async fn replay_subscriptions(requester: Requester, shared: Arc<WsShared>, epoch: u64) {
    let remembered = shared.remembered();
    if !remembered.is_empty() {
        tracing::info!("Replaying {} subscriptions", remembered.len());
    }

    let results = join_all(
        remembered
            .iter()
            .map(|(channel, id)| requester.subscribe(*channel, id)),
    )
    .await;

    for ((channel, id), result) in remembered.iter().zip(results) {
        if let Err(e) = result {
            tracing::error!("Failed to resubscribe to {channel} '{id}': {e}");
        }
    }

    if shared.epoch.load(Ordering::Acquire) == epoch && shared.is_transport_open() {
        shared.set_state(ConnectionState::Open);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_remembered_set_drops_empty_channels() {
        let shared = WsShared::new(WireCodec::default());
        shared.remember(Channel::Account, "A1");
        shared.remember(Channel::Account, "A1");
        shared.remember(Channel::Token, "K1");

        assert_eq!(
            shared.remembered(),
            vec![
                (Channel::Account, "A1".to_string()),
                (Channel::Token, "K1".to_string()),
            ]
        );

        shared.forget(Channel::Token, "K1");
        shared.forget(Channel::Token, "missing");

        assert_eq!(shared.remembered(), vec![(Channel::Account, "A1".to_string())]);
        assert!(shared.remembered.get(&Channel::Token).is_none());
    }

    #[rstest]
    fn test_state_change_only_on_transition() {
        let shared = WsShared::new(WireCodec::default());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            shared.listeners.add(
                SdkEvent::StateChange,
                Arc::new(move |data: &SdkEventData| {
                    if let SdkEventData::StateChange(state) = data {
                        seen.lock().unwrap().push(*state);
                    }
                }),
            );
        }

        shared.set_state(ConnectionState::Connecting);
        shared.set_state(ConnectionState::Open);
        shared.set_state(ConnectionState::Open);
        shared.set_state(ConnectionState::Closed);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionState::Open, ConnectionState::Closed]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_frame_dropped_while_disconnected_fails_its_ack() {
        let mut config = WebSocketConfig::new("ws://127.0.0.1:1/api/v1/ws");
        config.reconnect_delay = Duration::from_millis(50);
        let shared = Arc::new(WsShared::new(WireCodec::default()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let requester = Requester::new(shared.clone(), cmd_tx.clone(), &config);
        let mut handler = FeedHandler::new(
            config,
            shared.clone(),
            requester,
            cmd_rx,
            CancellationToken::new(),
        );

        let rx = shared.acks.register(7, MessageType::Subscribe, Channel::Account);
        cmd_tx
            .send(HandlerCommand::Send {
                text: "{}".to_string(),
                request_id: 7,
            })
            .unwrap();

        assert!(handler.wait_reconnect_delay().await);
        assert_eq!(rx.await.unwrap(), Err(ExplorerWsError::NotConnected));
        assert!(shared.acks.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_queued_frames_fail_when_task_stops() {
        let config = WebSocketConfig::new("ws://127.0.0.1:1/api/v1/ws");
        let shared = Arc::new(WsShared::new(WireCodec::default()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let requester = Requester::new(shared.clone(), cmd_tx.clone(), &config);
        let mut handler = FeedHandler::new(
            config,
            shared.clone(),
            requester,
            cmd_rx,
            CancellationToken::new(),
        );

        let rx = shared.acks.register(3, MessageType::Unsubscribe, Channel::Token);
        cmd_tx
            .send(HandlerCommand::Send {
                text: "{}".to_string(),
                request_id: 3,
            })
            .unwrap();

        handler.drain_commands();

        assert_eq!(rx.await.unwrap(), Err(ExplorerWsError::NotConnected));
        assert!(
            cmd_tx
                .send(HandlerCommand::Send {
                    text: "{}".to_string(),
                    request_id: 4,
                })
                .is_err()
        );
    }

    #[rstest]
    fn test_headers_are_applied_to_request() {
        let mut config = WebSocketConfig::new("ws://127.0.0.1:1/api/v1/ws");
        config.headers = vec![("x-network-alias".to_string(), "test".to_string())];

        let request = build_request(&config).unwrap();

        assert_eq!(request.headers()["x-network-alias"], "test");
    }

    #[rstest]
    fn test_invalid_url_is_rejected() {
        let config = WebSocketConfig::new("not a url");
        assert!(build_request(&config).is_err());
    }
}
