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

//! Correlation of subscribe/unsubscribe acknowledgements with their requests.
//!
//! Acks carrying a `requestId` resolve the request with that id. Acks without one (older servers)
//! resolve the oldest pending request with the same frame type and channel.

use std::sync::{Mutex, MutexGuard};

use explorer_common::{
    enums::{Channel, MessageType},
    messages::SubscriptionAck,
};
use tokio::sync::oneshot;

use super::error::{ExplorerWsError, ExplorerWsResult};

type AckSender = oneshot::Sender<ExplorerWsResult<SubscriptionAck>>;

#[derive(Debug)]
struct PendingAck {
    request_id: u64,
    kind: MessageType,
    channel: Channel,
    tx: AckSender,
}

/// Outstanding acknowledgements in request order.
#[derive(Debug, Default)]
pub struct AckTracker {
    pending: Mutex<Vec<PendingAck>>,
}

impl AckTracker {
    fn lock(&self) -> MutexGuard<'_, Vec<PendingAck>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers a pending request and returns the receiver its ack is delivered on.
    pub fn register(
        &self,
        request_id: u64,
        kind: MessageType,
        channel: Channel,
    ) -> oneshot::Receiver<ExplorerWsResult<SubscriptionAck>> {
        let (tx, rx) = oneshot::channel();
        self.lock().push(PendingAck {
            request_id,
            kind,
            channel,
            tx,
        });
        rx
    }

    /// Delivers an inbound ack of frame type `kind`. Returns `false` if no request matched.
    pub fn resolve(&self, kind: MessageType, ack: SubscriptionAck) -> bool {
        let entry = {
            let mut pending = self.lock();
            let index = match ack.request_id {
                Some(id) => pending
                    .iter()
                    .position(|p| p.request_id == id && p.kind == kind),
                None => pending
                    .iter()
                    .position(|p| p.kind == kind && p.channel == ack.channel),
            };
            index.map(|i| pending.remove(i))
        };

        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Ok(ack));
                true
            }
            None => {
                tracing::debug!(
                    channel = %ack.channel,
                    request_id = ?ack.request_id,
                    "Unmatched {kind} acknowledgement"
                );
                false
            }
        }
    }

    /// Drops the pending request `request_id` (e.g. after its wait timed out).
    pub fn cancel(&self, request_id: u64) {
        self.lock().retain(|p| p.request_id != request_id);
    }

    /// Fails the pending request `request_id` with `error`. Returns `false` if it was not pending.
    pub fn fail(&self, request_id: u64, error: &ExplorerWsError) -> bool {
        let entry = {
            let mut pending = self.lock();
            pending
                .iter()
                .position(|p| p.request_id == request_id)
                .map(|i| pending.remove(i))
        };

        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Err(error.clone()));
                true
            }
            None => false,
        }
    }

    /// Fails every pending request with `error`.
    pub fn fail_all(&self, error: &ExplorerWsError) {
        let drained: Vec<PendingAck> = std::mem::take(&mut *self.lock());
        if !drained.is_empty() {
            tracing::debug!("Failing {} pending acknowledgements: {error}", drained.len());
        }
        for entry in drained {
            let _ = entry.tx.send(Err(error.clone()));
        }
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no request is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use explorer_common::{enums::AckStatus, messages::SubscriptionRequest};
    use rstest::rstest;

    use super::*;

    fn ack(channel: Channel, id: &str, request_id: Option<u64>, status: AckStatus) -> SubscriptionAck {
        SubscriptionAck::answering(&SubscriptionRequest::new(channel, id, request_id), status)
    }

    #[rstest]
    #[tokio::test]
    async fn test_resolves_by_request_id_out_of_order() {
        let tracker = AckTracker::default();
        let first = tracker.register(1, MessageType::Subscribe, Channel::Account);
        let second = tracker.register(2, MessageType::Subscribe, Channel::Account);

        assert!(tracker.resolve(
            MessageType::Subscribe,
            ack(Channel::Account, "A2", Some(2), AckStatus::Error)
        ));
        assert!(tracker.resolve(
            MessageType::Subscribe,
            ack(Channel::Account, "A1", Some(1), AckStatus::Success)
        ));

        assert_eq!(first.await.unwrap().unwrap().status, AckStatus::Success);
        assert_eq!(second.await.unwrap().unwrap().status, AckStatus::Error);
        assert!(tracker.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_falls_back_to_first_match_without_request_id() {
        let tracker = AckTracker::default();
        let token = tracker.register(1, MessageType::Subscribe, Channel::Token);
        let account = tracker.register(2, MessageType::Subscribe, Channel::Account);

        assert!(tracker.resolve(
            MessageType::Subscribe,
            ack(Channel::Account, "A1", None, AckStatus::Success)
        ));

        assert_eq!(account.await.unwrap().unwrap().params.id, "A1");
        assert_eq!(tracker.len(), 1);
        drop(token);
    }

    #[rstest]
    fn test_type_must_match() {
        let tracker = AckTracker::default();
        let _rx = tracker.register(1, MessageType::Unsubscribe, Channel::Account);

        let matched = tracker.resolve(
            MessageType::Subscribe,
            ack(Channel::Account, "A1", None, AckStatus::Success),
        );

        assert!(!matched);
        assert_eq!(tracker.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_fail_all() {
        let tracker = AckTracker::default();
        let rx = tracker.register(1, MessageType::Subscribe, Channel::Account);

        tracker.fail_all(&ExplorerWsError::NotConnected);

        assert_eq!(rx.await.unwrap(), Err(ExplorerWsError::NotConnected));
        assert!(tracker.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_fail_single_request() {
        let tracker = AckTracker::default();
        let first = tracker.register(1, MessageType::Subscribe, Channel::Account);
        let _second = tracker.register(2, MessageType::Subscribe, Channel::Token);

        assert!(tracker.fail(1, &ExplorerWsError::NotConnected));
        assert!(!tracker.fail(1, &ExplorerWsError::NotConnected));

        assert_eq!(first.await.unwrap(), Err(ExplorerWsError::NotConnected));
        assert_eq!(tracker.len(), 1);
    }
}
