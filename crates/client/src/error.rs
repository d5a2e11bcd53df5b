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

//! Error types for the explorer client SDK.

use explorer_network::error::FetchError;
use thiserror::Error;

use crate::websocket::ExplorerWsError;

/// Errors raised by [`crate::ExplorerClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerClientError {
    /// The requested network is not served by the explorer.
    #[error("Network {0} is not valid or does not exist")]
    InvalidNetwork(String),
    /// An HTTP lookup failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// A socket operation failed.
    #[error(transparent)]
    WebSocket(#[from] ExplorerWsError),
    /// The client configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<anyhow::Error> for ExplorerClientError {
    fn from(error: anyhow::Error) -> Self {
        Self::Config(error.to_string())
    }
}

/// Result type alias for explorer client operations.
pub type ExplorerClientResult<T> = Result<T, ExplorerClientError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_fetch_errors_display_transparently() {
        let error = ExplorerClientError::from(FetchError::NotFound("Token not found".to_string()));
        assert_eq!(error.to_string(), "Token not found");
    }

    #[rstest]
    fn test_invalid_network_message() {
        let error = ExplorerClientError::InvalidNetwork("nope".to_string());
        assert_eq!(error.to_string(), "Network nope is not valid or does not exist");
    }
}
