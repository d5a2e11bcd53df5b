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

//! Frames exchanged over the explorer WebSocket.
//!
//! Every frame is `{ "type": <MessageType>, "payload": ... }` wrapped in the wire codec envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    codec::{CodecError, CodecResult, WireCodec},
    enums::{AckStatus, Channel, MessageType},
};

/// Opaque marker of an entity's latest head block.
pub type HeadBlock = Option<String>;

/// Parameters identifying the subscribed entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelParams {
    pub id: String,
}

/// Payload of a subscribe or unsubscribe request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub channel: Channel,
    pub params: ChannelParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl SubscriptionRequest {
    /// Creates a new [`SubscriptionRequest`] instance.
    #[must_use]
    pub fn new(channel: Channel, id: impl Into<String>, request_id: Option<u64>) -> Self {
        Self {
            channel,
            params: ChannelParams { id: id.into() },
            request_id,
        }
    }
}

/// Payload of a ping frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Frames sent from the client to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe(SubscriptionRequest),
    Unsubscribe(SubscriptionRequest),
    Ping(PingPayload),
}

impl ClientFrame {
    /// Returns the frame type discriminant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::Unsubscribe(_) => MessageType::Unsubscribe,
            Self::Ping(_) => MessageType::Ping,
        }
    }
}

/// Acknowledgement of a subscribe or unsubscribe request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    pub channel: Channel,
    pub params: ChannelParams,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl SubscriptionAck {
    /// Builds the acknowledgement answering `request`.
    #[must_use]
    pub fn answering(request: &SubscriptionRequest, status: AckStatus) -> Self {
        Self {
            channel: request.channel,
            params: request.params.clone(),
            status,
            request_id: request.request_id,
        }
    }
}

/// Payload of a pong frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongPayload {
    pub timestamp: i64,
}

/// Change notification for a subscribed account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub account_public_key: String,
    pub current_head_block: HeadBlock,
}

/// Change notification for a subscribed token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUpdate {
    pub token_public_key: String,
    pub current_head_block: HeadBlock,
}

/// Data pushed on a subscription channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "data", rename_all = "lowercase")]
pub enum ChannelMessage {
    Account(AccountUpdate),
    Token(TokenUpdate),
}

impl ChannelMessage {
    /// Builds the notification for `channel` about entity `public_key`.
    #[must_use]
    pub fn new(channel: Channel, public_key: String, current_head_block: HeadBlock) -> Self {
        match channel {
            Channel::Account => Self::Account(AccountUpdate {
                account_public_key: public_key,
                current_head_block,
            }),
            Channel::Token => Self::Token(TokenUpdate {
                token_public_key: public_key,
                current_head_block,
            }),
        }
    }

    /// Returns the channel the message was published on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Account(_) => Channel::Account,
            Self::Token(_) => Channel::Token,
        }
    }

    /// Returns the public key of the entity that changed.
    #[must_use]
    pub fn public_key(&self) -> &str {
        match self {
            Self::Account(update) => &update.account_public_key,
            Self::Token(update) => &update.token_public_key,
        }
    }

    /// Returns the entity's latest head block.
    #[must_use]
    pub fn current_head_block(&self) -> Option<&str> {
        match self {
            Self::Account(update) => update.current_head_block.as_deref(),
            Self::Token(update) => update.current_head_block.as_deref(),
        }
    }
}

/// Frames sent from the server to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerFrame {
    Subscribe(SubscriptionAck),
    Unsubscribe(SubscriptionAck),
    Pong(PongPayload),
    Message(ChannelMessage),
}

impl ServerFrame {
    /// Returns the frame type discriminant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::Unsubscribe(_) => MessageType::Unsubscribe,
            Self::Pong(_) => MessageType::Pong,
            Self::Message(_) => MessageType::Message,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    payload: Value,
}

fn parse_raw(codec: &WireCodec, text: &str) -> CodecResult<RawFrame> {
    let body = codec.decode_value(text)?;
    Ok(serde_json::from_value(body)?)
}

fn payload<T: serde::de::DeserializeOwned>(kind: MessageType, payload: Value) -> CodecResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| CodecError::Json(format!("invalid '{kind}' payload: {e}")))
}

/// Parses a frame received by the server.
///
/// # Errors
///
/// Returns an error if the text is not a valid envelope or the frame shape is not a client frame.
pub fn parse_client_frame(codec: &WireCodec, text: &str) -> CodecResult<ClientFrame> {
    let raw = parse_raw(codec, text)?;
    match raw.kind {
        MessageType::Subscribe => Ok(ClientFrame::Subscribe(payload(raw.kind, raw.payload)?)),
        MessageType::Unsubscribe => Ok(ClientFrame::Unsubscribe(payload(raw.kind, raw.payload)?)),
        MessageType::Ping => {
            // Payload is optional on pings
            if raw.payload.is_null() {
                Ok(ClientFrame::Ping(PingPayload::default()))
            } else {
                Ok(ClientFrame::Ping(payload(raw.kind, raw.payload)?))
            }
        }
        other => Err(CodecError::Json(format!(
            "unexpected '{other}' frame from client"
        ))),
    }
}

/// Parses a frame received by the client.
///
/// # Errors
///
/// Returns an error if the text is not a valid envelope or the frame shape is not a server frame.
pub fn parse_server_frame(codec: &WireCodec, text: &str) -> CodecResult<ServerFrame> {
    let raw = parse_raw(codec, text)?;
    match raw.kind {
        MessageType::Subscribe => Ok(ServerFrame::Subscribe(payload(raw.kind, raw.payload)?)),
        MessageType::Unsubscribe => Ok(ServerFrame::Unsubscribe(payload(raw.kind, raw.payload)?)),
        MessageType::Pong => Ok(ServerFrame::Pong(payload(raw.kind, raw.payload)?)),
        MessageType::Message => Ok(ServerFrame::Message(payload(raw.kind, raw.payload)?)),
        MessageType::Ping => Err(CodecError::Json(
            "unexpected 'ping' frame from server".to_string(),
        )),
    }
}
