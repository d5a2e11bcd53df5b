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

//! REST error responses.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use explorer_common::{codec::encode, models::ErrorResponse};
use explorer_network::error::FetchError;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Error returned by REST handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

/// Result type alias for REST handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Returns the HTTP status of the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::NotFound(message) => Self::NotFound(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::NotFound(_) | LedgerError::WrongKind { .. } => {
                Self::NotFound(error.to_string())
            }
            LedgerError::InvalidId(_) => Self::BadRequest(error.to_string()),
            LedgerError::SizeLimit | LedgerError::Backend(_) => Self::Internal(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }

        let body = ErrorResponse {
            message: self.to_string(),
        };
        match encode(&body) {
            Ok(json) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
            Err(e) => {
                tracing::error!("Failed to encode error response: {e}");
                status.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use explorer_common::enums::Channel;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ApiError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status(#[case] error: ApiError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
        assert_eq!(error.into_response().status(), expected);
    }

    #[rstest]
    fn test_from_ledger_error() {
        let wrong_kind = LedgerError::WrongKind {
            id: "K".to_string(),
            channel: Channel::Token,
        };

        assert_eq!(
            ApiError::from(wrong_kind),
            ApiError::NotFound("K is not a valid token entity".to_string())
        );
        assert!(matches!(
            ApiError::from(LedgerError::SizeLimit),
            ApiError::Internal(_)
        ));
    }

    #[rstest]
    fn test_from_fetch_error() {
        assert_eq!(
            ApiError::from(FetchError::NotFound("Account not found: A".to_string())),
            ApiError::NotFound("Account not found: A".to_string())
        );
        assert!(matches!(
            ApiError::from(FetchError::TooManyRetries { attempts: 20 }),
            ApiError::Internal(_)
        ));
    }
}
