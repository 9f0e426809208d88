//! # Resolution caching
//!
//! Catalog lookups are slow and the catalog is not always available, so resolved streams are
//! kept in an in-memory cache keyed by the media request id. Every entry remembers when it was
//! stored, and its age decides how a lookup is served:
//!
//! - Younger than the fresh age (`caches.fresh_age`, or `caches.empty_fresh_age` for results
//!   without streams): served directly.
//! - Younger than `caches.stale_revalidate_age`: served directly, and a refresh is spawned in
//!   the background for future lookups.
//! - Younger than `caches.stale_error_age`: recomputed, with the cached value as the fallback
//!   if the recomputation fails.
//! - Older: recomputed as if nothing was cached. Such entries are evicted from memory as well.
//!
//! Only successful computations are stored. A failure either propagates to the caller or is
//! masked by a usable stale entry.
//!
//! ## Lazy refreshes
//!
//! Background refreshes are de-duplicated per key, and at most `caches.max_lazy_refreshes` of
//! them run at the same time. Over that limit, the stale value is still served but no refresh is
//! started. A refresh that fails is logged and keeps the previous entry in place, so the next
//! stale lookup tries again.
//!
//! ## Metrics
//!
//! All metrics are named after the cache, for example `caches.streams.fresh`:
//!
//! - `caches.<name>.access`: All accesses.
//! - `caches.<name>.fresh`: Accesses served by a fresh entry.
//! - `caches.<name>.stale`: Accesses served by a stale entry, while refreshing it.
//! - `caches.<name>.fallback`: Accesses served by a stale entry after a failed computation.
//! - `caches.<name>.miss`: Accesses that had to wait for a computation.
//! - `caches.<name>.refresh`: Spawned background refreshes.
//! - `caches.<name>.lazy_limit_hit`: Refreshes skipped because of the lazy refresh limit.

mod freshness;
mod memory;


pub use freshness::Freshness;
pub use memory::{CacheItem, ResolutionCache};
