use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::LoaderConfig;
use crate::domain::{Article, FeedSnapshot, FeedState};
use crate::errors::{ErrorKind, ScrollError};
use crate::sources::traits::{Connectivity, Transport};
use crate::sources::ArticleClient;

/// Drives an `ArticleClient` on behalf of a scrolling reader.
///
/// At most one load runs at a time. After a load fails with
/// `ErrorKind::Offline`, the next connectivity recovery schedules one
/// reload. Dropping the loader ends that subscription.
pub struct FeedLoader<T: Transport + 'static> {
    inner: Arc<LoaderInner<T>>,
    recovery: JoinHandle<()>,
}

struct LoaderInner<T: Transport> {
    client: Arc<ArticleClient<T>>,
    state: Mutex<FeedState>,
    in_flight: AtomicBool,
    config: LoaderConfig,
}

/// Proof of holding the in-flight slot. Dropping it ends the load, even when
/// the load future is cancelled part way.
struct LoadGuard<T: Transport> {
    inner: Arc<LoaderInner<T>>,
}

impl<T: Transport + 'static> FeedLoader<T> {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        client: Arc<ArticleClient<T>>,
        connectivity: &dyn Connectivity,
        config: LoaderConfig,
    ) -> Self {
        let inner = Arc::new(LoaderInner {
            client,
            state: Mutex::new(FeedState::new()),
            in_flight: AtomicBool::new(false),
            config,
        });
        let recovery = spawn_recovery(Arc::downgrade(&inner), connectivity.subscribe());

        Self { inner, recovery }
    }

    /// Load up to `count` more articles and wait for the outcome.
    ///
    /// Returns `false` without doing anything when a load is already running
    /// or `count` is zero.
    pub async fn load_more(&self, count: usize) -> bool {
        match self.inner.begin(count) {
            Some(guard) => {
                guard.run(count).await;
                true
            }
            None => false,
        }
    }

    /// Fire-and-forget form of [`load_more`](Self::load_more). The in-flight
    /// slot is claimed before this returns.
    pub fn trigger(&self, count: usize) -> bool {
        match self.inner.begin(count) {
            Some(guard) => {
                tokio::spawn(guard.run(count));
                true
            }
            None => false,
        }
    }

    pub fn clear_error(&self) {
        self.inner.state().clear_error();
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state().snapshot()
    }

    pub fn articles(&self) -> Vec<Article> {
        self.inner.state().articles().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.state().articles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().is_loading()
    }

    pub fn is_initial_loading(&self) -> bool {
        self.inner.state().is_initial_loading()
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.inner.state().error().cloned()
    }
}

impl<T: Transport + 'static> Drop for FeedLoader<T> {
    fn drop(&mut self) {
        self.recovery.abort();
    }
}

impl<T: Transport> LoaderInner<T> {
    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the in-flight slot and enter `loading`. Check and set happen in
    /// one atomic step, before any suspension point.
    fn begin(self: &Arc<Self>, count: usize) -> Option<LoadGuard<T>> {
        if count == 0 {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(count, "load already in flight, ignoring request");
            return None;
        }

        self.state().begin_load();
        Some(LoadGuard {
            inner: Arc::clone(self),
        })
    }

    /// Classify a failed batch and record it. The batch client only surfaces
    /// the closed kinds, so `Failed` covers errors from anywhere else.
    fn record_error(&self, err: &ScrollError) {
        let kind = ErrorKind::from(err);
        tracing::error!(error = %err, kind = kind.tag(), "failed to load articles");
        self.state().record_failure(kind);
    }
}

impl<T: Transport> LoadGuard<T> {
    async fn run(self, count: usize) {
        let inner = &self.inner;

        match inner.client.fetch_many(count).await {
            Ok(articles) => {
                let fetched = articles.len();
                let mut state = inner.state();
                let added = state.merge(articles);
                state.record_success();
                tracing::info!(
                    requested = count,
                    fetched,
                    added,
                    total = state.articles().len(),
                    "merged articles"
                );
            }
            Err(e) => inner.record_error(&e),
        }
    }
}

impl<T: Transport> Drop for LoadGuard<T> {
    fn drop(&mut self) {
        self.inner.state().finish_load();
        self.inner.in_flight.store(false, Ordering::SeqCst);
    }
}

fn spawn_recovery<T: Transport + 'static>(
    inner: Weak<LoaderInner<T>>,
    mut recovered: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match recovered.recv().await {
                // Missed events still mean we are back online
                Ok(()) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }

            let Some(loader) = inner.upgrade() else {
                break;
            };

            let count = {
                let state = loader.state();
                if state.error() != Some(&ErrorKind::Offline) {
                    tracing::debug!("connectivity restored, no offline failure to recover");
                    continue;
                }
                if state.articles().is_empty() {
                    loader.config.recovery_batch_empty
                } else {
                    loader.config.recovery_batch
                }
            };

            tracing::info!(
                count,
                settle_ms = loader.config.settle_delay.as_millis() as u64,
                "connectivity restored after offline failure, scheduling reload"
            );
            tokio::time::sleep(loader.config.settle_delay).await;

            if let Some(guard) = loader.begin(count) {
                guard.run(count).await;
            }
        }
    })
}
