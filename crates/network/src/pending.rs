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

//! Tracking of in-flight HTTP requests so they can be aborted in bulk.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Default age after which a request counts as stale.
pub const DEFAULT_STALE_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct PendingRequest {
    url: String,
    sent_at: Instant,
    token: CancellationToken,
}

/// Registry of in-flight requests keyed by a process-unique id.
#[derive(Clone, Debug, Default)]
pub struct PendingRequests {
    requests: Arc<DashMap<u64, PendingRequest>>,
    next_id: Arc<AtomicU64>,
}

/// Removes its request from the registry when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    id: u64,
    token: CancellationToken,
    requests: Arc<DashMap<u64, PendingRequest>>,
}

impl PendingGuard {
    /// Returns the token cancelled when the request is aborted.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.requests.remove(&self.id);
    }
}

impl PendingRequests {
    /// Registers a request to `url`.
    #[must_use]
    pub fn register(&self, url: &str) -> PendingGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.requests.insert(
            id,
            PendingRequest {
                url: url.to_string(),
                sent_at: Instant::now(),
                token: token.clone(),
            },
        );

        PendingGuard {
            id,
            token,
            requests: self.requests.clone(),
        }
    }

    /// Returns the number of in-flight requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns whether no request is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Aborts every in-flight request and returns how many were aborted.
    pub fn abort_all(&self) -> usize {
        self.abort_where(|_| true)
    }

    /// Aborts requests whose URL starts with `url_prefix` and which were sent more than
    /// `tolerance` ago. Returns how many were aborted.
    pub fn abort_stale(&self, url_prefix: &str, tolerance: Duration) -> usize {
        self.abort_where(|request| {
            request.url.starts_with(url_prefix) && request.sent_at.elapsed() > tolerance
        })
    }

    fn abort_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&PendingRequest) -> bool,
    {
        let ids: Vec<u64> = self
            .requests
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut aborted = 0;
        for id in ids {
            if let Some((_, request)) = self.requests.remove(&id) {
                tracing::warn!("Aborting pending request: {}", request.url);
                request.token.cancel();
                aborted += 1;
            }
        }
        aborted
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_guard_removes_on_drop() {
        let pending = PendingRequests::default();
        let guard = pending.register("http://localhost/api/v1/token");
        assert_eq!(pending.len(), 1);
        drop(guard);
        assert!(pending.is_empty());
    }

    #[rstest]
    fn test_abort_all_cancels_tokens() {
        let pending = PendingRequests::default();
        let a = pending.register("http://localhost/a");
        let b = pending.register("http://localhost/b");

        assert_eq!(pending.abort_all(), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert!(pending.is_empty());
    }

    #[rstest]
    fn test_abort_stale_respects_prefix_and_age() {
        let pending = PendingRequests::default();
        let old = pending.register("http://localhost/api/v1/token?publicKey=a");
        let other = pending.register("http://localhost/api/v1/account");
        std::thread::sleep(Duration::from_millis(30));
        let fresh = pending.register("http://localhost/api/v1/token?publicKey=b");

        let aborted = pending.abort_stale("http://localhost/api/v1/token", Duration::from_millis(20));

        assert_eq!(aborted, 1);
        assert!(old.token().is_cancelled());
        assert!(!other.token().is_cancelled());
        assert!(!fresh.token().is_cancelled());
        assert_eq!(pending.len(), 2);
    }
}
