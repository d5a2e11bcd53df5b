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

//! Configuration for explorer WebSocket client connections.
//!
//! # Reconnection Strategy
//!
//! Reconnection uses a fixed delay with unlimited attempts: after every transport close the client
//! waits `reconnect_delay` and opens a new session, replaying the remembered subscriptions before
//! announcing `OPEN` again. An explicit close disables reconnection for that client.

use std::time::Duration;

/// Default interval between application level pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before reconnecting after the transport closed.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default time a subscribe or unsubscribe waits for the transport to open.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time a subscribe or unsubscribe waits for its acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for WebSocket client connections.
///
/// This struct contains only static configuration settings. Listeners are registered on the
/// client after construction.
#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    /// The URL to connect to.
    pub url: String,
    /// The headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Interval between application level `ping` frames while open.
    pub ping_interval: Duration,
    /// Whether to reconnect after the transport closes.
    pub reconnect: bool,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum time a subscribe/unsubscribe waits for the transport to be open.
    pub readiness_timeout: Duration,
    /// Maximum time a subscribe/unsubscribe waits for its acknowledgement.
    pub ack_timeout: Duration,
}

impl WebSocketConfig {
    /// Creates a config for `url` with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}
