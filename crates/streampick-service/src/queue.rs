//! De-duplication of concurrent computations by key.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{self, BoxFuture, Shared};
use futures::{FutureExt, TryFutureExt};
use sentry::{Hub, SentryFutureExt};
use tokio::sync::oneshot;

use crate::error::ResolveError;
use crate::utils::futures::CallOnDrop;

type ComputationChannel<T> = Shared<oneshot::Receiver<Result<T, ResolveError>>>;
type ComputationMap<K, T> = Arc<Mutex<BTreeMap<K, ComputationChannel<T>>>>;

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key spawns the computation, every caller arriving while it is still
/// pending attaches to it and observes the same outcome. The registration is removed as soon as
/// the computation settles, so the next call for that key starts fresh work. Failures are never
/// remembered.
pub struct NamedQueue<K, T> {
    computations: ComputationMap<K, T>,
    max_pending: Option<usize>,
}

impl<K, T> std::fmt::Debug for NamedQueue<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .computations
            .try_lock()
            .map(|c| c.len())
            .unwrap_or_default();
        f.debug_struct("NamedQueue")
            .field("pending", &pending)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

impl<K, T> Clone for NamedQueue<K, T> {
    fn clone(&self) -> Self {
        Self {
            computations: Arc::clone(&self.computations),
            max_pending: self.max_pending,
        }
    }
}

impl<K, T> NamedQueue<K, T>
where
    K: Ord + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a queue that allows at most `max_pending` distinct keys to be pending at once.
    ///
    /// `None` means no limit.
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            computations: Default::default(),
            max_pending,
        }
    }

    /// Returns the pending computation for `key`, starting it with `factory` if there is none.
    ///
    /// `factory` is only invoked when no computation for `key` is pending. The computation is
    /// spawned immediately and runs to completion even if all callers go away.
    ///
    /// NOTE: This function itself is *not* `async`, so that registering the computation happens
    /// in one step with looking it up.
    pub fn wrap<F, Fut>(&self, key: K, factory: F) -> BoxFuture<'static, Result<T, ResolveError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let channel = {
            let mut computations = self
                .computations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(channel) = computations.get(&key) {
                metric!(counter("queue.dedup.hit") += 1);
                channel.clone()
            } else {
                if let Some(max_pending) = self.max_pending {
                    if computations.len() >= max_pending {
                        metric!(counter("queue.full") += 1);
                        return Box::pin(future::ready(Err(ResolveError::QueueFull)));
                    }
                }

                metric!(counter("queue.dedup.miss") += 1);
                let channel = self.spawn_computation(key.clone(), factory());
                let evicted = computations.insert(key, channel.clone());
                debug_assert!(evicted.is_none());
                channel
            }
        };

        let future = channel.unwrap_or_else(|_canceled| {
            tracing::error!("resolution computation was dropped before completing");
            Err(ResolveError::InternalError)
        });

        Box::pin(future)
    }

    /// The number of keys with a pending computation.
    pub fn pending(&self) -> usize {
        self.computations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn spawn_computation<Fut>(&self, key: K, computation: Fut) -> ComputationChannel<T>
    where
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let computations = Arc::clone(&self.computations);
        let remove_computation_token = CallOnDrop::new(move || {
            computations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        });

        let channel = async move {
            let result = computation.await;
            // Deregister before sending, so a caller either attaches to a channel that still
            // receives the result, or starts a new computation.
            drop(remove_computation_token);
            sender.send(result).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()));

        tokio::spawn(channel);

        receiver.shared()
    }
}
