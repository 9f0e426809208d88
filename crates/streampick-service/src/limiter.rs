//! A global bound on concurrently executing resolutions.
//!
//! Every catalog lookup runs under a permit of the [`ConcurrencyLimiter`]. Tasks beyond the limit
//! wait for a permit in arrival order, since the underlying [`Semaphore`] is fair.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::ResolveError;
use crate::utils::futures::CallOnDrop;

/// Limits the number of concurrently running tasks, regardless of their key.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `max_concurrent` tasks at once.
    ///
    /// A limit of `0` is raised to `1`, as it would never admit anything.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Default::default(),
            waiting: Default::default(),
        }
    }

    /// Runs `task` as soon as a slot is free.
    ///
    /// The slot is released once `task` settles, no matter whether it succeeded.
    pub async fn run<F, T>(&self, task: F) -> Result<T, ResolveError>
    where
        F: Future<Output = Result<T, ResolveError>>,
    {
        let queued_at = Instant::now();
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let permit = {
            let waiting = Arc::clone(&self.waiting);
            let _waiting = CallOnDrop::new(move || {
                waiting.fetch_sub(1, Ordering::Relaxed);
            });
            self.semaphore.acquire().await
        };
        let _permit = permit.map_err(|_| {
            tracing::error!("concurrency limiter was closed");
            ResolveError::InternalError
        })?;

        metric!(timer("limiter.wait_time") = queued_at.elapsed());
        let in_flight = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        metric!(gauge("limiter.in_flight") = in_flight as u64);

        let _in_flight = {
            let in_flight = Arc::clone(&self.in_flight);
            CallOnDrop::new(move || {
                in_flight.fetch_sub(1, Ordering::Relaxed);
            })
        };

        task.await
    }

    /// The configured maximum of concurrently running tasks.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// The number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// The number of tasks waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}
