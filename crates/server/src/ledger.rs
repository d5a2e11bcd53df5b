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

//! Ledger collaborator interface and an in-memory implementation.
//!
//! The server never interprets ledger state beyond what the routes and subscriptions need: bulk
//! account info lookups, per-entity change notifications and the network base token.

use std::{
    fmt::Debug,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use async_trait::async_trait;
use dashmap::DashMap;
use explorer_common::{
    consts::is_valid_public_key,
    enums::Channel,
    messages::HeadBlock,
    models::NetworkSettings,
    network::NetworkConfig,
    numeric::Numeric,
};
use explorer_network::error::{FetchError, SIZE_LIMIT_SIGNATURE};
use thiserror::Error;

/// Query parameter name used to size simulated bulk requests.
const BULK_QUERY_PARAM: &str = "publicKey";

/// Errors raised by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The id is not a well-formed public key.
    #[error("Invalid public key: {0}")]
    InvalidId(String),
    /// No entity exists for the id.
    #[error("{0} not found")]
    NotFound(String),
    /// The entity exists but cannot be used on the channel.
    #[error("{id} is not a valid {channel} entity")]
    WrongKind { id: String, channel: Channel },
    /// The request exceeded the transport URL limit.
    #[error("{}", SIZE_LIMIT_SIGNATURE)]
    SizeLimit,
    /// Any other ledger failure.
    #[error("Ledger error: {0}")]
    Backend(String),
}

impl From<LedgerError> for FetchError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::SizeLimit => Self::SizeLimitExceeded(SIZE_LIMIT_SIGNATURE.to_string()),
            LedgerError::NotFound(_) | LedgerError::InvalidId(_) | LedgerError::WrongKind { .. } => {
                Self::NotFound(error.to_string())
            }
            LedgerError::Backend(message) => Self::Backend(message),
        }
    }
}

/// Kind of ledger entity behind a public key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Token,
}

impl EntityKind {
    /// Returns whether entities of this kind can be subscribed on `channel`.
    #[must_use]
    pub const fn serves(self, channel: Channel) -> bool {
        matches!(
            (self, channel),
            (Self::Account, Channel::Account) | (Self::Token, Channel::Token)
        )
    }
}

/// Ledger view of a single account or token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub public_key: String,
    pub kind: EntityKind,
    /// Short name (currency code for tokens).
    pub name: String,
    pub description: String,
    /// Base64 encoded JSON metadata.
    pub metadata: Option<String>,
    pub supply: Option<Numeric>,
    pub default_permissions: Option<Vec<String>>,
    pub current_head_block: HeadBlock,
}

impl AccountInfo {
    /// Creates a plain account entry.
    #[must_use]
    pub fn account(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            kind: EntityKind::Account,
            name: String::new(),
            description: String::new(),
            metadata: None,
            supply: None,
            default_permissions: None,
            current_head_block: None,
        }
    }

    /// Creates a token entry.
    #[must_use]
    pub fn token(
        public_key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntityKind::Token,
            name: name.into(),
            description: description.into(),
            ..Self::account(public_key)
        }
    }
}

/// Opaque handle of a registered change listener.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Callback invoked with the new head block of a changed entity.
pub type ChangeCallback = Arc<dyn Fn(HeadBlock) + Send + Sync>;

/// Change notifications for a single ledger entity.
pub trait ChangeSource: Send + Sync + Debug {
    /// Returns the canonical public key of the entity.
    fn public_key(&self) -> &str;
    /// Registers `callback` for every future change.
    fn on_change(&self, callback: ChangeCallback) -> ListenerHandle;
    /// Removes a listener. Returns `false` if it was not registered.
    fn off(&self, handle: ListenerHandle) -> bool;
    /// Returns the number of registered listeners.
    fn listener_count(&self) -> usize;
}

/// Client of a single ledger network.
#[async_trait]
pub trait LedgerClient: Send + Sync + Debug {
    /// Returns the alias of the network this client talks to.
    fn network_alias(&self) -> &str;

    /// Returns the network feature flags.
    fn settings(&self) -> NetworkSettings;

    /// Returns the public key of the network base token.
    fn base_token(&self) -> &str;

    /// Looks up many entities at once. Unknown keys are omitted from the result.
    async fn get_accounts_info(
        &self,
        keys: Vec<String>,
    ) -> Result<AHashMap<String, AccountInfo>, LedgerError>;

    /// Resolves the change source of entity `id` for `channel`.
    fn resolve(&self, channel: Channel, id: &str) -> Result<Arc<dyn ChangeSource>, LedgerError>;
}

/// Creates ledger clients for network configurations.
pub trait LedgerFactory: Send + Sync + Debug {
    /// Returns the aliases of the networks this factory serves.
    fn networks(&self) -> Vec<String>;

    /// Creates a client for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the network is not served.
    fn create(&self, network: &NetworkConfig) -> Result<Arc<dyn LedgerClient>, LedgerError>;
}

/// In-memory change source.
#[derive(Default)]
pub struct MemoryChangeSource {
    public_key: String,
    listeners: Mutex<Vec<(ListenerHandle, ChangeCallback)>>,
    next_handle: AtomicU64,
}

impl Debug for MemoryChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(MemoryChangeSource))
            .field("public_key", &self.public_key)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl MemoryChangeSource {
    fn new(public_key: &str) -> Self {
        Self {
            public_key: public_key.to_string(),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerHandle, ChangeCallback)>> {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Invokes every listener with `head`. Returns the number of listeners notified.
    pub fn emit(&self, head: &HeadBlock) -> usize {
        let snapshot: Vec<ChangeCallback> = self.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in &snapshot {
            callback(head.clone());
        }
        snapshot.len()
    }
}

impl ChangeSource for MemoryChangeSource {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn on_change(&self, callback: ChangeCallback) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.lock().push((handle, callback));
        handle
    }

    fn off(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    fn listener_count(&self) -> usize {
        self.lock().len()
    }
}

/// In-memory ledger used for development and tests.
#[derive(Debug)]
pub struct MemoryLedger {
    network_alias: String,
    base_token: String,
    settings: NetworkSettings,
    accounts: DashMap<String, AccountInfo>,
    sources: DashMap<String, Arc<MemoryChangeSource>>,
    max_request_bytes: Option<usize>,
    request_sizes: Mutex<Vec<usize>>,
}

impl MemoryLedger {
    /// Creates an empty ledger for `network_alias` whose base token is `base_token`.
    #[must_use]
    pub fn new(network_alias: impl Into<String>, base_token: impl Into<String>) -> Self {
        Self {
            network_alias: network_alias.into(),
            base_token: base_token.into(),
            settings: NetworkSettings::default(),
            accounts: DashMap::new(),
            sources: DashMap::new(),
            max_request_bytes: None,
            request_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Rejects bulk lookups whose query string would exceed `bytes`, like the ledger transport.
    #[must_use]
    pub fn with_max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = Some(bytes);
        self
    }

    /// Sets the network feature flags.
    #[must_use]
    pub fn with_settings(mut self, settings: NetworkSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Inserts or replaces an entity.
    pub fn insert(&self, info: AccountInfo) {
        self.accounts.insert(info.public_key.clone(), info);
    }

    /// Records a new head block for `id` and notifies its listeners.
    ///
    /// Returns the number of listeners notified.
    pub fn publish_change(&self, id: &str, head: &str) -> usize {
        let head = Some(head.to_string());
        if let Some(mut info) = self.accounts.get_mut(id) {
            info.current_head_block.clone_from(&head);
        }

        // Clone out of the map so callbacks run without holding a shard lock
        let source = self.sources.get(id).map(|s| s.value().clone());
        source.map_or(0, |source| source.emit(&head))
    }

    /// Returns the number of change listeners registered for `id`.
    #[must_use]
    pub fn listener_count(&self, id: &str) -> usize {
        self.sources
            .get(id)
            .map_or(0, |source| source.listener_count())
    }

    /// Returns the number of keys of every bulk lookup received so far, in order.
    #[must_use]
    pub fn request_sizes(&self) -> Vec<usize> {
        self.request_sizes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn request_bytes(keys: &[String]) -> usize {
        keys.iter()
            .map(|key| BULK_QUERY_PARAM.len() + key.len() + 2)
            .sum()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn network_alias(&self) -> &str {
        &self.network_alias
    }

    fn settings(&self) -> NetworkSettings {
        self.settings.clone()
    }

    fn base_token(&self) -> &str {
        &self.base_token
    }

    async fn get_accounts_info(
        &self,
        keys: Vec<String>,
    ) -> Result<AHashMap<String, AccountInfo>, LedgerError> {
        self.request_sizes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(keys.len());

        if let Some(limit) = self.max_request_bytes
            && Self::request_bytes(&keys) > limit
        {
            return Err(LedgerError::SizeLimit);
        }

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let info = self.accounts.get(&key)?.value().clone();
                Some((key, info))
            })
            .collect())
    }

    fn resolve(&self, channel: Channel, id: &str) -> Result<Arc<dyn ChangeSource>, LedgerError> {
        if !is_valid_public_key(id) {
            return Err(LedgerError::InvalidId(id.to_string()));
        }

        let kind = self
            .accounts
            .get(id)
            .map(|info| info.kind)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if !kind.serves(channel) {
            return Err(LedgerError::WrongKind {
                id: id.to_string(),
                channel,
            });
        }

        let source = self
            .sources
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(MemoryChangeSource::new(id)))
            .clone();
        Ok(source)
    }
}

/// Serves a fixed set of in-memory ledgers, one per network alias.
#[derive(Debug, Default)]
pub struct MemoryLedgerFactory {
    ledgers: DashMap<String, Arc<MemoryLedger>>,
}

impl MemoryLedgerFactory {
    /// Creates a factory serving an empty ledger for every alias in `networks`.
    #[must_use]
    pub fn with_networks<I, S>(networks: I, base_token: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let factory = Self::default();
        for alias in networks {
            let alias = alias.into();
            factory.add(Arc::new(MemoryLedger::new(alias, base_token)));
        }
        factory
    }

    /// Adds (or replaces) the ledger serving `ledger.network_alias()`.
    pub fn add(&self, ledger: Arc<MemoryLedger>) {
        self.ledgers
            .insert(ledger.network_alias().to_string(), ledger);
    }

    /// Returns the ledger serving `alias`.
    #[must_use]
    pub fn ledger(&self, alias: &str) -> Option<Arc<MemoryLedger>> {
        self.ledgers.get(alias).map(|l| l.value().clone())
    }
}

impl LedgerFactory for MemoryLedgerFactory {
    fn networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = self.ledgers.iter().map(|e| e.key().clone()).collect();
        networks.sort();
        networks
    }

    fn create(&self, network: &NetworkConfig) -> Result<Arc<dyn LedgerClient>, LedgerError> {
        // Custom hosts are served by the ledger of the same alias
        self.ledger(&network.network_alias)
            .map(|ledger| ledger as Arc<dyn LedgerClient>)
            .ok_or_else(|| LedgerError::NotFound(format!("Network {}", network.network_alias)))
    }
}
