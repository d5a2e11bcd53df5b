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

//! Coalesced account info lookups for the REST handlers.

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use explorer_network::{
    coalescer::{BatchCoalescer, BulkFetcher, CoalescerConfig},
    degrading::DegradingFetch,
    error::{FetchError, FetchResult},
};

use crate::ledger::{AccountInfo, LedgerClient};

/// Default pending key count which flushes a server batch immediately.
pub const ACCOUNT_BATCH_MAX_KEYS: usize = 25;

/// Bulk lookup of account info through [`DegradingFetch`].
struct LedgerBulkFetcher {
    ledger: Arc<dyn LedgerClient>,
    degrading: DegradingFetch,
}

#[async_trait]
impl BulkFetcher<String, AccountInfo> for LedgerBulkFetcher {
    async fn fetch_many(&self, keys: Vec<String>) -> FetchResult<AHashMap<String, AccountInfo>> {
        let ledger = &self.ledger;
        self.degrading
            .fetch(keys, |chunk| async move {
                ledger
                    .get_accounts_info(chunk)
                    .await
                    .map_err(FetchError::from)
            })
            .await
    }
}

/// Coalesces single account lookups against one ledger network.
#[derive(Clone, Debug)]
pub struct AccountInfoBatcher {
    coalescer: BatchCoalescer<String, AccountInfo>,
}

impl AccountInfoBatcher {
    /// Creates a batcher with a 25 ms window and a 25 key burst limit.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        let config = CoalescerConfig {
            max_keys: ACCOUNT_BATCH_MAX_KEYS,
            entity: "Account".to_string(),
            ..CoalescerConfig::default()
        };
        Self::with_config(ledger, config, DegradingFetch::default())
    }

    /// Creates a batcher with custom coalescing and degrading configs.
    #[must_use]
    pub fn with_config(
        ledger: Arc<dyn LedgerClient>,
        config: CoalescerConfig,
        degrading: DegradingFetch,
    ) -> Self {
        let fetcher = LedgerBulkFetcher { ledger, degrading };
        Self {
            coalescer: BatchCoalescer::new(config, Arc::new(fetcher)),
        }
    }

    /// Looks up `public_key`, sharing the ledger request with concurrent lookups.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the ledger does not know the key, or the bulk request error.
    pub async fn get(&self, public_key: &str) -> FetchResult<AccountInfo> {
        self.coalescer.get(public_key.to_string()).await
    }

    /// Returns the number of distinct keys waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.coalescer.pending_len()
    }
}
