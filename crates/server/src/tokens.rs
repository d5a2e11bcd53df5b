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

//! Token details parsing and the token routes.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use explorer_common::{
    consts::is_valid_public_key,
    enums::{TokenAccessMode, TokenType},
    models::{TokenDetails, TokenResponse, TokensResponse},
    numeric::Numeric,
};
use explorer_network::{
    degrading::DegradingFetch,
    error::{FetchError, FetchResult},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    app::{AppState, RequestNetwork},
    error::{ApiError, ApiResult},
    ledger::{AccountInfo, EntityKind, LedgerClient},
};

/// Query parameter carrying token public keys.
pub const PUBLIC_KEY_PARAM: &str = "publicKey";

/// Permission flag which makes a token publicly accessible.
pub const ACCESS_PERMISSION: &str = "ACCESS";

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenMetadata {
    #[serde(default, deserialize_with = "deserialize_decimal_places")]
    decimal_places: u32,
}

fn deserialize_decimal_places<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let places = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(places.and_then(|p| u32::try_from(p).ok()).unwrap_or_default())
}

/// Returns the decimal places from base64 encoded JSON token metadata.
///
/// Missing, undecodable or malformed metadata gives 0.
#[must_use]
pub fn parse_decimal_places(metadata: Option<&str>) -> u32 {
    let Some(encoded) = metadata.filter(|m| !m.is_empty()) else {
        return 0;
    };

    let parsed = STANDARD
        .decode(encoded)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<TokenMetadata>(&bytes).map_err(|e| e.to_string()));

    match parsed {
        Ok(metadata) => metadata.decimal_places,
        Err(e) => {
            tracing::debug!("Ignoring invalid token metadata: {e}");
            0
        }
    }
}

/// Builds the API view of a token entity.
#[must_use]
pub fn parse_token_details(info: &AccountInfo, base_token: &str) -> TokenDetails {
    let default_permissions = info.default_permissions.clone().unwrap_or_default();
    let access_mode = if default_permissions.iter().any(|p| p == ACCESS_PERMISSION) {
        TokenAccessMode::Public
    } else {
        TokenAccessMode::Private
    };
    let token_type = if info.public_key == base_token {
        TokenType::Base
    } else {
        TokenType::Unknown
    };

    TokenDetails {
        name: info.description.clone(),
        currency_code: info.name.clone(),
        decimal_places: parse_decimal_places(info.metadata.as_deref()),
        public_key: info.public_key.clone(),
        supply: info.supply.clone().unwrap_or_else(Numeric::zero),
        head_block: info.current_head_block.clone(),
        access_mode,
        default_permissions,
        token_type,
    }
}

/// Looks up many tokens through [`DegradingFetch`], skipping keys which are not tokens.
///
/// # Errors
///
/// Returns the ledger error, or [`FetchError::TooManyRetries`] if the size limit persists.
pub async fn fetch_tokens(
    ledger: &Arc<dyn LedgerClient>,
    degrading: &DegradingFetch,
    public_keys: Vec<String>,
) -> FetchResult<BTreeMap<String, TokenDetails>> {
    let infos = degrading
        .fetch(public_keys, |chunk| async move {
            ledger
                .get_accounts_info(chunk)
                .await
                .map_err(FetchError::from)
        })
        .await?;

    let base_token = ledger.base_token();
    Ok(infos
        .into_iter()
        .filter(|(_, info)| info.kind == EntityKind::Token)
        .map(|(key, info)| {
            let details = parse_token_details(&info, base_token);
            (key, details)
        })
        .collect())
}

/// Trims, de-duplicates and validates the `publicKey` query values.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] if no key is given or any key is not a public key.
pub fn parse_public_keys(query: &[(String, String)]) -> ApiResult<Vec<String>> {
    let mut keys: Vec<String> = Vec::new();
    for (name, value) in query {
        let value = value.trim();
        if name != PUBLIC_KEY_PARAM || value.is_empty() || keys.iter().any(|k| k == value) {
            continue;
        }
        if !is_valid_public_key(value) {
            return Err(ApiError::BadRequest(format!("Invalid public key: {value}")));
        }
        keys.push(value.to_string());
    }

    if keys.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one publicKey is required".to_string(),
        ));
    }
    Ok(keys)
}

/// `GET token?publicKey=..`
///
/// # Errors
///
/// Returns 400 for invalid keys, or the lookup error.
pub async fn get_tokens(
    State(state): State<AppState>,
    RequestNetwork(network): RequestNetwork,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let keys = parse_public_keys(&query)?;
    let handle = state.network(&network)?;

    tracing::debug!(network = %network.network_alias, keys = keys.len(), "Loading tokens");
    let tokens = fetch_tokens(&handle.ledger, &state.degrading, keys).await?;
    state.encode_response(&TokensResponse { tokens })
}

/// `GET token/{publicKey}`
///
/// # Errors
///
/// Returns 404 if the key is invalid, unknown or not a token.
pub async fn get_token(
    State(state): State<AppState>,
    RequestNetwork(network): RequestNetwork,
    Path(public_key): Path<String>,
) -> ApiResult<Response> {
    if !is_valid_public_key(&public_key) {
        return Err(ApiError::NotFound("Invalid public key".to_string()));
    }

    let handle = state.network(&network)?;
    let info = handle.accounts.get(&public_key).await?;
    if info.kind != EntityKind::Token {
        return Err(ApiError::NotFound(format!("Token not found: {public_key}")));
    }

    let token = parse_token_details(&info, handle.ledger.base_token());
    state.encode_response(&TokenResponse { token })
}
