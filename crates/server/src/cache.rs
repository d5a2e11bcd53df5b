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

//! Bounded least-recently-used cache of per-network state.

use std::{
    fmt::Debug,
    sync::{Mutex, MutexGuard, PoisonError},
};

use explorer_common::network::NetworkConfig;
use indexmap::IndexMap;

/// Default number of networks kept in a [`NetworkCache`].
pub const DEFAULT_NETWORK_CACHE_CAPACITY: usize = 16;

/// LRU map from a network selection to the state built for it.
///
/// The most recently used entry is kept last. Inserting beyond the capacity evicts the first.
pub struct NetworkCache<V> {
    capacity: usize,
    entries: Mutex<IndexMap<NetworkConfig, V>>,
}

impl<V> Debug for NetworkCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(NetworkCache))
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<V> Default for NetworkCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_CACHE_CAPACITY)
    }
}

impl<V> NetworkCache<V> {
    /// Creates an empty cache holding at most `capacity` networks (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(IndexMap::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<NetworkConfig, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of cached networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns whether `network` is cached, without touching its recency.
    #[must_use]
    pub fn contains(&self, network: &NetworkConfig) -> bool {
        self.lock().contains_key(network)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<V: Clone> NetworkCache<V> {
    /// Returns the entry for `network`, building it with `init` on a miss.
    ///
    /// `init` runs under the cache lock so concurrent misses build the entry once.
    ///
    /// # Errors
    ///
    /// Returns the error of `init`. Nothing is cached in that case.
    pub fn get_or_try_insert_with<E, F>(&self, network: &NetworkConfig, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut entries = self.lock();

        if let Some(value) = entries.shift_remove(network) {
            entries.insert(network.clone(), value.clone());
            return Ok(value);
        }

        let value = init()?;
        if entries.len() >= self.capacity
            && let Some((evicted, _)) = entries.shift_remove_index(0)
        {
            tracing::debug!(network = %evicted.network_alias, "Evicted network from cache");
        }
        entries.insert(network.clone(), value.clone());
        Ok(value)
    }
}
