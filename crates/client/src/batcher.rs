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

//! Client-side token lookup coalescing.

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use explorer_common::models::{TokenDetails, TokensResponse};
use explorer_network::{
    coalescer::{BatchCoalescer, BulkFetcher, CoalescerConfig},
    error::FetchResult,
    http::HttpTransport,
};

/// Bulk token endpoint relative to the API base URL.
pub const TOKENS_PATH: &str = "token";

struct TokenBulkFetcher {
    http: HttpTransport,
}

#[async_trait]
impl BulkFetcher<String, TokenDetails> for TokenBulkFetcher {
    async fn fetch_many(&self, keys: Vec<String>) -> FetchResult<AHashMap<String, TokenDetails>> {
        let query: Vec<(&str, &str)> = keys.iter().map(|k| ("publicKey", k.as_str())).collect();
        let response: TokensResponse = self.http.get(TOKENS_PATH, &query).await?;
        Ok(response.tokens.into_iter().collect())
    }
}

/// Coalesces token lookups into `GET token?publicKey=..` bulk requests.
#[derive(Clone, Debug)]
pub struct TokenBatcher {
    coalescer: BatchCoalescer<String, TokenDetails>,
}

impl TokenBatcher {
    /// Creates a batcher with the default 25 ms window and 50 key burst limit.
    #[must_use]
    pub fn new(http: HttpTransport) -> Self {
        let config = CoalescerConfig {
            entity: "Token".to_string(),
            ..CoalescerConfig::default()
        };
        Self::with_config(http, config)
    }

    /// Creates a batcher with a custom coalescing config.
    #[must_use]
    pub fn with_config(http: HttpTransport, config: CoalescerConfig) -> Self {
        Self {
            coalescer: BatchCoalescer::new(config, Arc::new(TokenBulkFetcher { http })),
        }
    }

    /// Looks up `public_key`, sharing the request with concurrent lookups.
    ///
    /// With `flush_now` the pending batch is sent immediately instead of after the window.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the token is absent from the bulk response, or the bulk request error.
    pub async fn get(&self, public_key: &str, flush_now: bool) -> FetchResult<TokenDetails> {
        let pending = self.coalescer.submit(public_key.to_string());
        if flush_now {
            self.coalescer.flush().await;
        }
        pending.await
    }

    /// Sends the pending batch now.
    pub async fn flush(&self) {
        self.coalescer.flush().await;
    }

    /// Returns the number of distinct keys waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.coalescer.pending_len()
    }
}
