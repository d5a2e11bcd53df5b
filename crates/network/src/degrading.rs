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

//! Bulk fetching which degrades to smaller requests when the transport rejects their size.
//!
//! Attempt `n` (starting at 1) splits the keys into sub-requests of at most
//! `max(1, keys_per_request / n)` keys and runs them concurrently. If any sub-request fails with a
//! size-limit error the whole attempt is discarded and retried immediately with the next attempt
//! number. Any other error is returned as is.

use std::{future::Future, hash::Hash};

use ahash::AHashMap;
use futures_util::future::try_join_all;

use crate::{
    error::{FetchError, FetchResult},
    split::split_evenly,
};

/// Default upper bound of keys per sub-request on the first attempt.
pub const DEFAULT_KEYS_PER_REQUEST: usize = 200;

/// Default maximum number of attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Configuration for [`DegradingFetch`].
#[derive(Clone, Debug)]
pub struct DegradingFetchConfig {
    pub keys_per_request: usize,
    pub max_attempts: u32,
}

impl Default for DegradingFetchConfig {
    fn default() -> Self {
        Self {
            keys_per_request: DEFAULT_KEYS_PER_REQUEST,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Size-limit aware bulk fetch.
#[derive(Clone, Debug, Default)]
pub struct DegradingFetch {
    config: DegradingFetchConfig,
}

impl DegradingFetch {
    /// Creates a new [`DegradingFetch`] instance.
    #[must_use]
    pub const fn new(config: DegradingFetchConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DegradingFetchConfig {
        &self.config
    }

    /// Returns the sub-request size used on `attempt` (1-based).
    #[must_use]
    pub fn keys_per_request(&self, attempt: u32) -> usize {
        let attempt = usize::try_from(attempt.max(1)).unwrap_or(usize::MAX);
        (self.config.keys_per_request / attempt).max(1)
    }

    /// Fetches `keys` through `fetch_chunk`, shrinking sub-requests on size-limit errors.
    ///
    /// Results of all sub-requests of the successful attempt are merged.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::TooManyRetries`] once `max_attempts` attempts have all hit the size
    /// limit, or the first non size-limit error raised by `fetch_chunk`.
    pub async fn fetch<K, V, F, Fut>(&self, keys: Vec<K>, fetch_chunk: F) -> FetchResult<AHashMap<K, V>>
    where
        K: Eq + Hash + Clone,
        F: Fn(Vec<K>) -> Fut,
        Fut: Future<Output = FetchResult<AHashMap<K, V>>>,
    {
        if keys.is_empty() {
            return Ok(AHashMap::new());
        }

        for attempt in 1..=self.config.max_attempts {
            let per_request = self.keys_per_request(attempt);
            let chunks = split_evenly(keys.clone(), per_request);

            tracing::trace!(
                attempt,
                per_request,
                requests = chunks.len(),
                "Fetching {} keys",
                keys.len()
            );

            match try_join_all(chunks.into_iter().map(&fetch_chunk)).await {
                Ok(results) => {
                    let mut merged = AHashMap::with_capacity(keys.len());
                    for result in results {
                        merged.extend(result);
                    }
                    return Ok(merged);
                }
                Err(e) if e.is_size_limit() => {
                    tracing::debug!(attempt, per_request, "Size limit exceeded, retrying with smaller requests: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(
            attempts = self.config.max_attempts,
            "Giving up on bulk fetch of {} keys",
            keys.len()
        );

        Err(FetchError::TooManyRetries {
            attempts: self.config.max_attempts,
        })
    }
}
