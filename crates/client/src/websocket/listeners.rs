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

//! Event listener registry for the explorer WebSocket client.

use std::{
    fmt::{Debug, Display},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use explorer_common::{
    enums::{Channel, ConnectionState},
    messages::ChannelMessage,
};

/// Event families a listener can be registered for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SdkEvent {
    /// Fired once per inbound `message` frame on the channel (`message-<channel>`).
    Message(Channel),
    /// Fired on every connection state transition (`state-change`).
    StateChange,
}

impl Display for SdkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(channel) => write!(f, "message-{channel}"),
            Self::StateChange => f.write_str("state-change"),
        }
    }
}

/// Data delivered to a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SdkEventData {
    Message(ChannelMessage),
    StateChange(ConnectionState),
}

/// Opaque handle returned by `on` and accepted by `off`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

pub type Listener = Arc<dyn Fn(&SdkEventData) + Send + Sync>;

/// Registry of listeners keyed by event, invoked in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<AHashMap<SdkEvent, Vec<(ListenerToken, Listener)>>>,
    next_token: AtomicU64,
}

impl Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ListenerRegistry))
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    fn lock(&self) -> MutexGuard<'_, AHashMap<SdkEvent, Vec<(ListenerToken, Listener)>>> {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers `listener` for `event`.
    pub fn add(&self, event: SdkEvent, listener: Listener) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(event).or_default().push((token, listener));
        token
    }

    /// Removes the listener registered under `token`. Unknown tokens are ignored.
    pub fn remove(&self, token: ListenerToken) {
        let mut listeners = self.lock();
        for entries in listeners.values_mut() {
            entries.retain(|(t, _)| *t != token);
        }
        listeners.retain(|_, entries| !entries.is_empty());
    }

    /// Removes every listener for `event`.
    pub fn remove_event(&self, event: SdkEvent) {
        self.lock().remove(&event);
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the total number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Returns the number of listeners for `event`.
    #[must_use]
    pub fn count(&self, event: SdkEvent) -> usize {
        self.lock().get(&event).map_or(0, Vec::len)
    }

    /// Returns whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener for `event` with `data`.
    ///
    /// Listeners are snapshotted first, so a listener may register or remove listeners.
    pub fn emit(&self, event: SdkEvent, data: &SdkEventData) {
        let snapshot: Vec<Listener> = self
            .lock()
            .get(&event)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in snapshot {
            listener(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;

    use super::*;

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = counter.clone();
        Arc::new(move |_: &SdkEventData| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[rstest]
    fn test_event_names() {
        assert_eq!(SdkEvent::Message(Channel::Account).to_string(), "message-account");
        assert_eq!(SdkEvent::Message(Channel::Token).to_string(), "message-token");
        assert_eq!(SdkEvent::StateChange.to_string(), "state-change");
    }

    #[rstest]
    fn test_emit_only_reaches_matching_event() {
        let registry = ListenerRegistry::default();
        let account = Arc::new(AtomicUsize::new(0));
        let token = Arc::new(AtomicUsize::new(0));
        registry.add(SdkEvent::Message(Channel::Account), counting_listener(&account));
        registry.add(SdkEvent::Message(Channel::Token), counting_listener(&token));

        let data = SdkEventData::Message(ChannelMessage::new(Channel::Account, "A1".into(), None));
        registry.emit(SdkEvent::Message(Channel::Account), &data);

        assert_eq!(account.load(Ordering::Relaxed), 1);
        assert_eq!(token.load(Ordering::Relaxed), 0);
    }

    #[rstest]
    fn test_remove_is_idempotent() {
        let registry = ListenerRegistry::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = registry.add(SdkEvent::StateChange, counting_listener(&counter));

        registry.remove(handle);
        registry.remove(handle);
        registry.remove(ListenerToken(999));

        registry.emit(
            SdkEvent::StateChange,
            &SdkEventData::StateChange(ConnectionState::Open),
        );
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(registry.is_empty());
    }

    #[rstest]
    fn test_listener_may_remove_itself() {
        let registry = Arc::new(ListenerRegistry::default());
        let slot: Arc<Mutex<Option<ListenerToken>>> = Arc::new(Mutex::new(None));

        let handle = {
            let registry = registry.clone();
            let slot = slot.clone();
            registry.clone().add(
                SdkEvent::StateChange,
                Arc::new(move |_: &SdkEventData| {
                    if let Some(token) = *slot.lock().unwrap() {
                        registry.remove(token);
                    }
                }),
            )
        };
        *slot.lock().unwrap() = Some(handle);

        registry.emit(
            SdkEvent::StateChange,
            &SdkEventData::StateChange(ConnectionState::Closed),
        );
        assert_eq!(registry.count(SdkEvent::StateChange), 0);
    }
}
