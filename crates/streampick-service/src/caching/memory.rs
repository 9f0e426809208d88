use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;

use super::Freshness;
use crate::config::CacheConfig;
use crate::error::ResolveError;
use crate::utils::futures::CallOnDrop;

/// A value that can be stored in a [`ResolutionCache`].
pub trait CacheItem: 'static + Send + Sync + Clone {
    /// Whether the value does not contain anything.
    ///
    /// Empty values become stale after [`CacheConfig::empty_fresh_age`].
    fn is_empty(&self) -> bool;
}

impl<T: 'static + Send + Sync + Clone> CacheItem for Vec<T> {
    fn is_empty(&self) -> bool {
        <[T]>::is_empty(self)
    }
}

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct CachedItem<T> {
    /// When the computation producing `value` completed.
    stored_at: Instant,
    value: T,
}

type InMemoryCache<T> = moka::future::Cache<String, CachedItem<T>>;

/// Wraps computations with a stale-while-revalidate and stale-if-error cache.
///
/// See the [module documentation](super) for how entries age.
pub struct ResolutionCache<T: CacheItem> {
    name: &'static str,
    config: CacheConfig,
    cache: InMemoryCache<T>,

    /// A [`HashSet`] of currently running background refreshes.
    refreshes: Arc<Mutex<HashSet<String>>>,

    /// Remaining budget of concurrent background refreshes.
    max_lazy_refreshes: Arc<AtomicIsize>,
}

impl<T: CacheItem> std::fmt::Debug for ResolutionCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let refreshes = self
            .refreshes
            .try_lock()
            .map(|r| r.len())
            .unwrap_or_default();
        f.debug_struct("ResolutionCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("in-memory items", &self.cache.entry_count())
            .field("running refreshes", &refreshes)
            .finish()
    }
}

impl<T: CacheItem> Clone for ResolutionCache<T> {
    fn clone(&self) -> Self {
        ResolutionCache {
            name: self.name,
            config: self.config,
            cache: self.cache.clone(),
            refreshes: Arc::clone(&self.refreshes),
            max_lazy_refreshes: Arc::clone(&self.max_lazy_refreshes),
        }
    }
}

impl<T: CacheItem> ResolutionCache<T> {
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        let cache = InMemoryCache::builder()
            .name(name)
            // entries past this age are never served again
            .time_to_live(config.stale_error_age)
            .build();

        ResolutionCache {
            name,
            config,
            cache,
            refreshes: Default::default(),
            max_lazy_refreshes: Arc::new(AtomicIsize::new(config.max_lazy_refreshes)),
        }
    }

    /// Serves `key` from the cache, using `compute` to populate or refresh it.
    ///
    /// Depending on the age of the cached entry, `compute` is either not called at all, spawned
    /// in the background, or awaited. A failing computation is masked by an entry that is still
    /// within the stale-if-error window, otherwise the error is returned.
    pub async fn compute_memoized<F, Fut>(&self, key: &str, compute: F) -> Result<T, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let name = self.name;
        metric!(counter(&format!("caches.{name}.access")) += 1);

        let Some(item) = self.cache.get(key).await else {
            metric!(counter(&format!("caches.{name}.miss")) += 1);
            return self.compute_and_store(key, compute()).await;
        };

        let age = Instant::now().saturating_duration_since(item.stored_at);
        match Freshness::of(&self.config, age, item.value.is_empty()) {
            Freshness::Fresh => {
                metric!(counter(&format!("caches.{name}.fresh")) += 1);
                Ok(item.value)
            }
            Freshness::Revalidate => {
                metric!(counter(&format!("caches.{name}.stale")) += 1);
                self.spawn_refresh(key, compute);
                Ok(item.value)
            }
            Freshness::StaleIfError => match self.compute_and_store(key, compute()).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    metric!(counter(&format!("caches.{name}.fallback")) += 1);
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        key = %key,
                        age = ?age,
                        "Serving stale {name} entry after failed computation",
                    );
                    Ok(item.value)
                }
            },
            Freshness::Expired => {
                metric!(counter(&format!("caches.{name}.miss")) += 1);
                self.compute_and_store(key, compute()).await
            }
        }
    }

    /// Runs `computation` in a detached task that stores its value on success.
    ///
    /// The entry is stored even if the caller stops waiting for the result.
    async fn compute_and_store<Fut>(&self, key: &str, computation: Fut) -> Result<T, ResolveError>
    where
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let this = self.clone();
        let key = key.to_owned();
        let task = async move {
            let value = computation.await?;
            this.store(key, value.clone()).await;
            Ok(value)
        };

        tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())))
            .await
            .unwrap_or_else(|err| {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "{} computation did not complete",
                    self.name,
                );
                Err(ResolveError::InternalError)
            })
    }

    async fn store(&self, key: String, value: T) {
        let item = CachedItem {
            stored_at: Instant::now(),
            value,
        };
        self.cache.insert(key, item).await;
    }

    /// Spawns a background refresh of `key`, unless one is already running or the lazy refresh
    /// limit is reached.
    ///
    /// `compute` is only invoked if the refresh is actually spawned.
    fn spawn_refresh<F, Fut>(&self, key: &str, compute: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let name = self.name;

        let mut refreshes = self
            .refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if refreshes.contains(key) {
            return;
        }

        // We count down towards zero, and if we reach or surpass it, we will stop here.
        let max_lazy_refreshes = Arc::clone(&self.max_lazy_refreshes);
        if max_lazy_refreshes.fetch_sub(1, Ordering::Relaxed) <= 0 {
            max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);

            metric!(counter(&format!("caches.{name}.lazy_limit_hit")) += 1);
            return;
        }

        let done_token = {
            let key = key.to_owned();
            let refreshes = Arc::clone(&self.refreshes);
            CallOnDrop::new(move || {
                max_lazy_refreshes.fetch_add(1, Ordering::Relaxed);
                refreshes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
            })
        };

        refreshes.insert(key.to_owned());
        drop(refreshes);

        metric!(counter(&format!("caches.{name}.refresh")) += 1);
        tracing::debug!("Spawning deduplicated {name} refresh for {key:?}");

        let this = self.clone();
        let key = key.to_owned();
        let computation = compute();
        let task = async move {
            let _done_token = done_token; // move into the future

            match computation.await {
                Ok(value) => this.store(key, value).await,
                Err(err) => tracing::error!(
                    error = &err as &dyn std::error::Error,
                    key = %key,
                    "Background {name} refresh failed",
                ),
            }
        };
        tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
    }

    /// The number of background refreshes currently running.
    pub fn running_refreshes(&self) -> usize {
        self.refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
