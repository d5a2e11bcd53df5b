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

//! Debounced coalescing of single-key lookups into bulk requests.
//!
//! Callers ask a [`BatchCoalescer`] for one key at a time. Keys are collected into an ordered,
//! de-duplicated pending batch which is flushed either when the debounce timer fires or as soon as
//! the batch reaches `max_keys`. Each flush issues exactly one [`BulkFetcher::fetch_many`] call and
//! resolves every waiter of that batch exactly once:
//!
//! - Keys present in the response resolve with a clone of the value.
//! - Keys absent from the response reject with [`FetchError::NotFound`].
//! - A failed bulk call rejects every waiter of the batch with the same error.

use std::{
    fmt::{Debug, Display},
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, Weak},
    task::{Context, Poll},
    time::Duration,
};

use ahash::AHashMap;
use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::error::{FetchError, FetchResult};

/// Default debounce window before a partial batch is flushed.
pub const DEFAULT_COALESCE_WAIT: Duration = Duration::from_millis(25);

/// Default number of pending keys which triggers an immediate flush.
pub const DEFAULT_MAX_KEYS: usize = 50;

/// Performs the bulk lookup behind a [`BatchCoalescer`].
#[async_trait]
pub trait BulkFetcher<K, V>: Send + Sync {
    /// Fetches all `keys` at once. Keys missing from the returned map are treated as not found.
    async fn fetch_many(&self, keys: Vec<K>) -> FetchResult<AHashMap<K, V>>;
}

/// Configuration for a [`BatchCoalescer`].
#[derive(Clone, Debug)]
pub struct CoalescerConfig {
    /// Debounce window measured from the first key of a batch.
    pub wait: Duration,
    /// Pending key count which flushes the batch immediately.
    pub max_keys: usize,
    /// Entity label used in not-found errors (e.g. `Token`).
    pub entity: String,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            wait: DEFAULT_COALESCE_WAIT,
            max_keys: DEFAULT_MAX_KEYS,
            entity: "Entity".to_string(),
        }
    }
}

type Waiter<V> = oneshot::Sender<FetchResult<V>>;

struct PendingBatch<K, V> {
    waiters: IndexMap<K, Vec<Waiter<V>>>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl<K, V> PendingBatch<K, V> {
    /// Takes the pending waiters and starts a new generation.
    fn take(&mut self) -> IndexMap<K, Vec<Waiter<V>>> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        std::mem::take(&mut self.waiters)
    }
}

struct CoalescerInner<K, V> {
    config: CoalescerConfig,
    fetcher: Arc<dyn BulkFetcher<K, V>>,
    batch: Mutex<PendingBatch<K, V>>,
}

impl<K, V> CoalescerInner<K, V> {
    fn lock_batch(&self) -> MutexGuard<'_, PendingBatch<K, V>> {
        // A panic while holding the lock leaves the batch structurally valid
        self.batch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<K, V> Drop for CoalescerInner<K, V> {
    fn drop(&mut self) {
        let batch = self
            .batch
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }
        // Dropping the senders resolves the remaining waiters as cancelled
        batch.waiters.clear();
    }
}

/// A value requested from a [`BatchCoalescer`] which resolves once its batch is flushed.
#[derive(Debug)]
pub struct PendingValue<V> {
    rx: oneshot::Receiver<FetchResult<V>>,
}

impl<V> Future for PendingValue<V> {
    type Output = FetchResult<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(FetchError::Cancelled)))
    }
}

/// Collapses concurrent single-key requests into debounced bulk requests.
///
/// Cloning is cheap and clones share the same pending batch. When the last clone is dropped the
/// debounce timer is aborted and waiters still pending resolve with [`FetchError::Cancelled`].
pub struct BatchCoalescer<K, V> {
    inner: Arc<CoalescerInner<K, V>>,
}

impl<K, V> Clone for BatchCoalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Debug for BatchCoalescer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BatchCoalescer))
            .field("config", &self.inner.config)
            .field("pending", &self.inner.lock_batch().waiters.len())
            .finish()
    }
}

impl<K, V> BatchCoalescer<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    /// Creates a new [`BatchCoalescer`] instance.
    #[must_use]
    pub fn new(config: CoalescerConfig, fetcher: Arc<dyn BulkFetcher<K, V>>) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                config,
                fetcher,
                batch: Mutex::new(PendingBatch {
                    waiters: IndexMap::new(),
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoalescerConfig {
        &self.inner.config
    }

    /// Returns the number of distinct keys waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock_batch().waiters.len()
    }

    /// Requests `key` and waits for the batch containing it to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] if the bulk response omits `key`, the bulk error if the
    /// bulk call fails, or [`FetchError::Cancelled`] if the coalescer is torn down first.
    pub async fn get(&self, key: K) -> FetchResult<V> {
        self.submit(key).await
    }

    /// Queues `key` for the next flush without waiting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, key: K) -> PendingValue<V> {
        let (tx, rx) = oneshot::channel();

        let ready = {
            let mut batch = self.inner.lock_batch();
            batch.waiters.entry(key).or_default().push(tx);

            if batch.waiters.len() >= self.inner.config.max_keys {
                Some(batch.take())
            } else {
                if batch.timer.is_none() {
                    let generation = batch.generation;
                    batch.timer = Some(self.spawn_timer(generation));
                }
                None
            }
        };

        if let Some(waiters) = ready {
            tracing::trace!(keys = waiters.len(), "Batch reached max keys, flushing");
            self.spawn_dispatch(waiters);
        }

        PendingValue { rx }
    }

    /// Flushes the pending batch now and waits for its bulk request to complete.
    pub async fn flush(&self) {
        let waiters = self.inner.lock_batch().take();
        if waiters.is_empty() {
            return;
        }

        if let Err(e) = self.spawn_dispatch(waiters).await {
            tracing::error!("Batch dispatch task failed: {e}");
        }
    }

    fn spawn_timer(&self, generation: u64) -> JoinHandle<()> {
        let weak: Weak<CoalescerInner<K, V>> = Arc::downgrade(&self.inner);
        let wait = self.inner.config.wait;

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };

            let waiters = {
                let mut batch = inner.lock_batch();
                if batch.generation != generation {
                    return;
                }
                // This task is the timer being taken, detach instead of aborting itself
                batch.timer = None;
                batch.generation = batch.generation.wrapping_add(1);
                std::mem::take(&mut batch.waiters)
            };

            if !waiters.is_empty() {
                tokio::spawn(dispatch(
                    inner.fetcher.clone(),
                    inner.config.entity.clone(),
                    waiters,
                ));
            }
        })
    }

    fn spawn_dispatch(&self, waiters: IndexMap<K, Vec<Waiter<V>>>) -> JoinHandle<()> {
        tokio::spawn(dispatch(
            self.inner.fetcher.clone(),
            self.inner.config.entity.clone(),
            waiters,
        ))
    }
}

async fn dispatch<K, V>(
    fetcher: Arc<dyn BulkFetcher<K, V>>,
    entity: String,
    waiters: IndexMap<K, Vec<Waiter<V>>>,
) where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    let keys: Vec<K> = waiters.keys().cloned().collect();
    tracing::debug!(keys = keys.len(), entity = %entity, "Dispatching bulk request");

    match fetcher.fetch_many(keys).await {
        Ok(mut values) => {
            for (key, senders) in waiters {
                let result = match values.remove(&key) {
                    Some(value) => Ok(value),
                    None => Err(FetchError::NotFound(format!("{entity} not found: {key}"))),
                };
                for sender in senders {
                    // Receiver may have been dropped by its caller
                    let _ = sender.send(result.clone());
                }
            }
        }
        Err(e) => {
            tracing::warn!(entity = %entity, "Bulk request failed: {e}");
            for sender in waiters.into_values().flatten() {
                let _ = sender.send(Err(e.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use rstest::rstest;

    use super::*;

    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<Vec<String>>>,
        missing: Vec<String>,
        delay: Option<Duration>,
        fail: AtomicBool,
    }

    impl RecordingFetcher {
        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BulkFetcher<String, String> for RecordingFetcher {
        async fn fetch_many(&self, keys: Vec<String>) -> FetchResult<AHashMap<String, String>> {
            self.calls.lock().unwrap().push(keys.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail.load(Ordering::Relaxed) {
                return Err(FetchError::Backend("ledger unavailable".to_string()));
            }

            Ok(keys
                .into_iter()
                .filter(|k| !self.missing.contains(k))
                .map(|k| (k.clone(), format!("value-{k}")))
                .collect())
        }
    }

    fn coalescer(
        fetcher: Arc<RecordingFetcher>,
        wait: Duration,
        max_keys: usize,
    ) -> BatchCoalescer<String, String> {
        let config = CoalescerConfig {
            wait,
            max_keys,
            entity: "Token".to_string(),
        };
        BatchCoalescer::new(config, fetcher)
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_keys_share_single_bulk_request() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = coalescer(fetcher.clone(), Duration::from_millis(25), 50);

        let (a, b, c) = tokio::join!(
            batcher.get("k1".to_string()),
            batcher.get("k1".to_string()),
            batcher.get("k2".to_string()),
        );

        assert_eq!(a.unwrap(), "value-k1");
        assert_eq!(b.unwrap(), "value-k1");
        assert_eq!(c.unwrap(), "value-k2");
        assert_eq!(fetcher.calls(), vec![vec!["k1".to_string(), "k2".to_string()]]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_absent_key_is_rejected_as_not_found() {
        let fetcher = Arc::new(RecordingFetcher {
            missing: vec!["T2".to_string()],
            ..Default::default()
        });
        let batcher = coalescer(fetcher.clone(), Duration::from_millis(25), 50);

        let (t1, t2, t3) = tokio::join!(
            batcher.get("T1".to_string()),
            batcher.get("T2".to_string()),
            batcher.get("T3".to_string()),
        );

        assert_eq!(t1.unwrap(), "value-T1");
        assert_eq!(
            t2.unwrap_err(),
            FetchError::NotFound("Token not found: T2".to_string())
        );
        assert_eq!(t3.unwrap(), "value-T3");
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_burst_flushes_without_waiting_for_timer() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = coalescer(fetcher.clone(), Duration::from_secs(60), 3);

        let results = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(
                batcher.get("a".to_string()),
                batcher.get("b".to_string()),
                batcher.get("c".to_string()),
            )
        })
        .await
        .expect("burst flush should not wait for the debounce window");

        assert!(results.0.is_ok() && results.1.is_ok() && results.2.is_ok());
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_bulk_failure_rejects_every_waiter() {
        let fetcher = Arc::new(RecordingFetcher::default());
        fetcher.fail.store(true, Ordering::Relaxed);
        let batcher = coalescer(fetcher.clone(), Duration::from_millis(10), 50);

        let (a, b) = tokio::join!(batcher.get("a".to_string()), batcher.get("b".to_string()));

        let expected = FetchError::Backend("ledger unavailable".to_string());
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_manual_flush() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = coalescer(fetcher.clone(), Duration::from_secs(60), 50);

        let pending = batcher.submit("x".to_string());
        assert_eq!(batcher.pending_len(), 1);

        batcher.flush().await;

        assert_eq!(pending.await.unwrap(), "value-x");
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_keys_during_inflight_request_start_new_batch() {
        let fetcher = Arc::new(RecordingFetcher {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let batcher = coalescer(fetcher.clone(), Duration::from_millis(10), 50);

        let first = batcher.submit("a".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = batcher.submit("b".to_string());

        assert_eq!(first.await.unwrap(), "value-a");
        assert_eq!(second.await.unwrap(), "value-b");
        assert_eq!(
            fetcher.calls(),
            vec![vec!["a".to_string()], vec!["b".to_string()]]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_drop_cancels_pending_waiters() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let batcher = coalescer(fetcher.clone(), Duration::from_secs(60), 50);

        let pending = batcher.submit("a".to_string());
        drop(batcher);

        assert_eq!(pending.await.unwrap_err(), FetchError::Cancelled);
        assert!(fetcher.calls().is_empty());
    }
}
