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

//! Network selection shared between client and server.
//!
//! The client announces which ledger network it wants through request headers (HTTP) or query
//! parameters (WebSocket upgrade). The server resolves the same [`NetworkConfig`] from either.

use serde::{Deserialize, Serialize};

use crate::consts::{
    HEADER_NETWORK_ALIAS, HEADER_NETWORK_HOST, HEADER_NETWORK_REP_KEY, HEADER_NETWORK_SSL,
};

const QUERY_NETWORK_ALIAS: &str = "networkAlias";
const QUERY_NETWORK_HOST: &str = "host";
const QUERY_NETWORK_SSL: &str = "ssl";
const QUERY_NETWORK_REP_KEY: &str = "repKey";

/// Returns whether `alias` is a valid network alias (non-empty, alphanumeric, `-` or `_`).
#[must_use]
pub fn is_valid_network_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Selected ledger network, optionally pinned to a custom representative.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub network_alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_key: Option<String>,
}

impl NetworkConfig {
    /// Creates a config selecting the named network with its default representatives.
    #[must_use]
    pub fn new(network_alias: impl Into<String>) -> Self {
        Self {
            network_alias: network_alias.into(),
            host: None,
            ssl: None,
            rep_key: None,
        }
    }

    /// Returns the request headers announcing this network.
    #[must_use]
    pub fn to_headers(&self) -> Vec<(String, String)> {
        self.pairs(
            HEADER_NETWORK_ALIAS,
            HEADER_NETWORK_HOST,
            HEADER_NETWORK_SSL,
            HEADER_NETWORK_REP_KEY,
        )
    }

    /// Returns the query parameters announcing this network.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.pairs(
            QUERY_NETWORK_ALIAS,
            QUERY_NETWORK_HOST,
            QUERY_NETWORK_SSL,
            QUERY_NETWORK_REP_KEY,
        )
    }

    fn pairs(&self, alias: &str, host: &str, ssl: &str, rep_key: &str) -> Vec<(String, String)> {
        let mut pairs = vec![(alias.to_string(), self.network_alias.clone())];

        if let Some(value) = &self.host {
            pairs.push((host.to_string(), value.clone()));
            pairs.push((ssl.to_string(), self.ssl.unwrap_or(true).to_string()));
            if let Some(key) = &self.rep_key {
                pairs.push((rep_key.to_string(), key.clone()));
            }
        }

        pairs
    }

    /// Resolves a config from request headers, falling back to query parameters.
    ///
    /// Both lookups receive the lowercase header name or the camelCase query name respectively.
    /// Returns `None` when no valid alias is present in either.
    pub fn from_lookup<H, Q>(header: H, query: Q) -> Option<Self>
    where
        H: Fn(&str) -> Option<String>,
        Q: Fn(&str) -> Option<String>,
    {
        Self::from_source(
            &header,
            HEADER_NETWORK_ALIAS,
            HEADER_NETWORK_HOST,
            HEADER_NETWORK_SSL,
            HEADER_NETWORK_REP_KEY,
        )
        .or_else(|| {
            Self::from_source(
                &query,
                QUERY_NETWORK_ALIAS,
                QUERY_NETWORK_HOST,
                QUERY_NETWORK_SSL,
                QUERY_NETWORK_REP_KEY,
            )
        })
    }

    fn from_source<F>(get: &F, alias: &str, host: &str, ssl: &str, rep_key: &str) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network_alias = get(alias)?;
        if !is_valid_network_alias(&network_alias) {
            tracing::debug!("Ignoring invalid network alias '{network_alias}'");
            return None;
        }

        let host = get(host).filter(|h| !h.is_empty());
        let ssl = host.as_ref().map(|_| {
            get(ssl)
                .map(|s| !matches!(s.to_ascii_lowercase().as_str(), "false" | "0"))
                .unwrap_or(true)
        });
        let rep_key = host.as_ref().and_then(|_| get(rep_key));

        Some(Self {
            network_alias,
            host,
            ssl,
            rep_key,
        })
    }
}
