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

//! Per-connection subscription registry.
//!
//! Each connection task owns one [`SubscriptionRegistry`]. Ledger change listeners registered
//! through it push `message` frames into the connection's bounded [`Outbound`] queue, and every
//! listener is released with the registry.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use explorer_common::{
    codec::WireCodec,
    enums::Channel,
    messages::{ChannelMessage, HeadBlock, ServerFrame},
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::ledger::{ChangeSource, LedgerClient, LedgerError, ListenerHandle};

/// Default size of a connection's outbound frame queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Errors raised by subscription requests. Each one is answered with an `error` ack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Not subscribed to {channel} {id}")]
    NotSubscribed { channel: Channel, id: String },
}

/// Sending half of a connection's outbound frame queue.
#[derive(Clone, Debug)]
pub struct Outbound {
    connection_id: u64,
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl Outbound {
    /// Creates a queue holding at most `capacity` frames.
    #[must_use]
    pub fn channel(connection_id: u64, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbound = Self {
            connection_id,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (outbound, rx)
    }

    /// Returns the id of the owning connection.
    #[must_use]
    pub const fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Queues a change notification without waiting.
    ///
    /// When the queue is full the frame is dropped and counted. Returns whether it was queued.
    pub fn push(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    connection_id = self.connection_id,
                    dropped,
                    "Outbound queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queues a reply frame, waiting for room. Returns `false` if the connection is gone.
    pub async fn send(&self, frame: String) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    /// Returns the number of notifications dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Subscription {
    id: String,
    handle: ListenerHandle,
    source: Arc<dyn ChangeSource>,
}

impl Subscription {
    fn release(self) {
        if !self.source.off(self.handle) {
            tracing::debug!(id = %self.id, "Change listener already removed");
        }
    }
}

/// Active subscriptions of one connection.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    ledger: Arc<dyn LedgerClient>,
    codec: WireCodec,
    outbound: Outbound,
    entries: AHashMap<Channel, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry pushing notifications into `outbound`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, codec: WireCodec, outbound: Outbound) -> Self {
        Self {
            ledger,
            codec,
            outbound,
            entries: AHashMap::new(),
        }
    }

    /// Returns the total number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns whether no subscription is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of active subscriptions on `channel`.
    #[must_use]
    pub fn len_for(&self, channel: Channel) -> usize {
        self.entries.get(&channel).map_or(0, Vec::len)
    }

    /// Attaches a change listener for entity `id` on `channel`.
    ///
    /// Repeated subscriptions of the same id each register their own listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot resolve the entity for the channel.
    pub fn subscribe(&mut self, channel: Channel, id: &str) -> Result<(), SubscriptionError> {
        let source = self.ledger.resolve(channel, id)?;

        let public_key = source.public_key().to_string();
        let codec = self.codec.clone();
        let outbound = self.outbound.clone();
        let handle = source.on_change(Arc::new(move |head: HeadBlock| {
            let frame = ServerFrame::Message(ChannelMessage::new(channel, public_key.clone(), head));
            match codec.encode(&frame) {
                Ok(text) => {
                    outbound.push(text);
                }
                Err(e) => tracing::error!(%channel, "Failed to encode message: {e}"),
            }
        }));

        self.entries.entry(channel).or_default().push(Subscription {
            id: id.to_string(),
            handle,
            source,
        });

        tracing::debug!(
            connection_id = self.outbound.connection_id(),
            %channel,
            id,
            "Subscribed"
        );
        Ok(())
    }

    /// Releases every subscription of entity `id` on `channel`. Returns how many were released.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotSubscribed`] if there was none.
    pub fn unsubscribe(&mut self, channel: Channel, id: &str) -> Result<usize, SubscriptionError> {
        let released: Vec<Subscription> = match self.entries.get_mut(&channel) {
            Some(list) => {
                let (released, kept) = std::mem::take(list).into_iter().partition(|s| s.id == id);
                *list = kept;
                released
            }
            None => Vec::new(),
        };
        if self.entries.get(&channel).is_some_and(Vec::is_empty) {
            self.entries.remove(&channel);
        }

        if released.is_empty() {
            tracing::warn!(
                connection_id = self.outbound.connection_id(),
                %channel,
                id,
                "Unsubscribe without subscription"
            );
            return Err(SubscriptionError::NotSubscribed {
                channel,
                id: id.to_string(),
            });
        }

        let count = released.len();
        released.into_iter().for_each(Subscription::release);

        tracing::debug!(
            connection_id = self.outbound.connection_id(),
            %channel,
            id,
            count,
            "Unsubscribed"
        );
        Ok(count)
    }

    /// Releases every subscription of the connection. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let mut count = 0;
        for (_, list) in self.entries.drain() {
            count += list.len();
            list.into_iter().for_each(Subscription::release);
        }
        count
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use explorer_common::{messages::parse_server_frame, testing::test_public_key};
    use rstest::rstest;

    use super::*;
    use crate::ledger::{AccountInfo, MemoryLedger};

    fn ledger() -> Arc<MemoryLedger> {
        let ledger = MemoryLedger::new("test", test_public_key(0));
        ledger.insert(AccountInfo::account(test_public_key(1)));
        ledger.insert(AccountInfo::account(test_public_key(2)));
        ledger.insert(AccountInfo::token(test_public_key(3), "T", "Token"));
        Arc::new(ledger)
    }

    fn registry(
        ledger: &Arc<MemoryLedger>,
        capacity: usize,
    ) -> (SubscriptionRegistry, Outbound, mpsc::Receiver<String>) {
        let (outbound, rx) = Outbound::channel(1, capacity);
        let registry = SubscriptionRegistry::new(ledger.clone(), WireCodec::default(), outbound.clone());
        (registry, outbound, rx)
    }

    #[rstest]
    #[tokio::test]
    async fn test_change_pushes_message_frame() {
        let ledger = ledger();
        let (mut registry, _outbound, mut rx) = registry(&ledger, 8);
        let key = test_public_key(1);

        registry.subscribe(Channel::Account, &key).unwrap();
        assert_eq!(ledger.publish_change(&key, "H1"), 1);

        let text = rx.recv().await.unwrap();
        let frame = parse_server_frame(&WireCodec::default(), &text).unwrap();
        let ServerFrame::Message(message) = frame else {
            panic!("expected message frame, was {frame:?}");
        };
        assert_eq!(message.channel(), Channel::Account);
        assert_eq!(message.public_key(), key);
        assert_eq!(message.current_head_block(), Some("H1"));
    }

    #[rstest]
    fn test_subscribe_errors_register_nothing() {
        let ledger = ledger();
        let (mut registry, _outbound, _rx) = registry(&ledger, 8);

        assert!(registry.subscribe(Channel::Account, "A1").is_err());
        assert!(registry.subscribe(Channel::Account, &test_public_key(9)).is_err());
        assert!(registry.subscribe(Channel::Account, &test_public_key(3)).is_err());
        assert!(registry.is_empty());
    }

    #[rstest]
    fn test_unsubscribe_releases_all_duplicates() {
        let ledger = ledger();
        let (mut registry, _outbound, _rx) = registry(&ledger, 8);
        let key = test_public_key(1);

        registry.subscribe(Channel::Account, &key).unwrap();
        registry.subscribe(Channel::Account, &key).unwrap();
        registry.subscribe(Channel::Token, &test_public_key(3)).unwrap();
        assert_eq!(ledger.listener_count(&key), 2);
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.unsubscribe(Channel::Account, &key), Ok(2));
        assert_eq!(ledger.listener_count(&key), 0);
        assert_eq!(registry.len_for(Channel::Account), 0);
        assert_eq!(registry.len_for(Channel::Token), 1);
    }

    #[rstest]
    fn test_unsubscribe_without_subscription_fails() {
        let ledger = ledger();
        let (mut registry, _outbound, _rx) = registry(&ledger, 8);

        assert_eq!(
            registry.unsubscribe(Channel::Token, &test_public_key(3)),
            Err(SubscriptionError::NotSubscribed {
                channel: Channel::Token,
                id: test_public_key(3),
            })
        );
    }

    #[rstest]
    fn test_release_all_only_touches_own_listeners() {
        let ledger = ledger();
        let (mut first, _o1, _rx1) = registry(&ledger, 8);
        let (mut second, _o2, _rx2) = registry(&ledger, 8);
        let (a1, a2) = (test_public_key(1), test_public_key(2));

        first.subscribe(Channel::Account, &a1).unwrap();
        first.subscribe(Channel::Account, &a2).unwrap();
        second.subscribe(Channel::Account, &a1).unwrap();

        assert_eq!(first.release_all(), 2);
        assert_eq!(ledger.listener_count(&a1), 1);
        assert_eq!(ledger.listener_count(&a2), 0);

        drop(second);
        assert_eq!(ledger.listener_count(&a1), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let ledger = ledger();
        let (mut registry, outbound, mut rx) = registry(&ledger, 2);
        let key = test_public_key(1);
        registry.subscribe(Channel::Account, &key).unwrap();

        for head in ["H1", "H2", "H3", "H4"] {
            ledger.publish_change(&key, head);
        }

        assert_eq!(outbound.dropped(), 2);
        let first = rx.recv().await.unwrap();
        assert!(first.contains("H1"));
    }
}
