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

//! Explorer WebSocket client error types.

use explorer_common::{codec::CodecError, enums::Channel};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error types for the explorer WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerWsError {
    /// Client is not connected.
    #[error("Not connected")]
    NotConnected,
    /// The server acknowledged the request with an error status.
    #[error("Server rejected {action} of {channel} '{id}'")]
    Rejected {
        action: &'static str,
        channel: Channel,
        id: String,
    },
    /// No acknowledgement or connection within the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Failed to hand a frame to the connection task.
    #[error("Send error: {0}")]
    Send(String),
    /// Frame encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),
    /// Transport-level error during WebSocket communication.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<tungstenite::Error> for ExplorerWsError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<CodecError> for ExplorerWsError {
    fn from(error: CodecError) -> Self {
        Self::Codec(error.to_string())
    }
}

/// Result type alias for explorer WebSocket operations.
pub type ExplorerWsResult<T> = Result<T, ExplorerWsError>;
