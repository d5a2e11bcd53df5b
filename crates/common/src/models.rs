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

//! Response models shared by the explorer REST API and the client SDK.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    enums::{TokenAccessMode, TokenType},
    messages::HeadBlock,
    numeric::Numeric,
};

/// Token details as returned by the token lookup endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    pub name: String,
    pub currency_code: String,
    pub decimal_places: u32,
    pub public_key: String,
    pub supply: Numeric,
    pub head_block: HeadBlock,
    pub access_mode: TokenAccessMode,
    pub default_permissions: Vec<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// Body of `GET token?publicKey=..`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensResponse {
    pub tokens: BTreeMap<String, TokenDetails>,
}

/// Body of `GET token/{publicKey}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: TokenDetails,
}

/// Feature flags of a network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    pub has_demo_accounts: bool,
    pub has_fountain: bool,
}

/// Resolved network identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIdentity {
    pub network_alias: String,
}

/// Body of `GET network/settings`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettingsResponse {
    pub settings: NetworkSettings,
    pub config: NetworkIdentity,
}

/// Error body returned by the REST API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
