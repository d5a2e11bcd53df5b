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

//! Error types for bulk fetching and HTTP transport.

use explorer_common::codec::CodecError;
use thiserror::Error;

/// Message the ledger transport reports when a request URL is too long.
pub const SIZE_LIMIT_SIGNATURE: &str = "URL Must not be over 8KiB";

/// Errors raised while fetching entities.
///
/// The type is `Clone` so a single bulk failure can be delivered to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request was too large for the transport.
    #[error("Request size limit exceeded: {0}")]
    SizeLimitExceeded(String),
    /// The request kept exceeding the size limit after shrinking.
    #[error("Too many retries: size limit still exceeded after {attempts} attempts")]
    TooManyRetries { attempts: u32 },
    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// HTTP 401.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Any other non-success HTTP status.
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// The request deadline elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Connection level failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The request was aborted or its waiter was torn down.
    #[error("Request cancelled")]
    Cancelled,
    /// A collaborator (e.g. the ledger client) failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl FetchError {
    /// Returns whether the error indicates the request must be split into smaller requests.
    #[must_use]
    pub fn is_size_limit(&self) -> bool {
        match self {
            Self::SizeLimitExceeded(_) => true,
            Self::Http { message, .. } | Self::Backend(message) => {
                message.contains(SIZE_LIMIT_SIGNATURE)
            }
            _ => false,
        }
    }

    /// Returns whether retrying the same request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<CodecError> for FetchError {
    fn from(error: CodecError) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
