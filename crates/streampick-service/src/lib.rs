//! Resolution of a single auto-play stream per media item.
//!
//! The service looks up torrent candidates for a movie or episode in an upstream catalog, picks
//! exactly one winner by quality and health, enriches it with debrid links and hands it back
//! through a cache with differentiated freshness rules. See [`resolver::StreamResolver`] for the
//! entry point.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod catalog;
pub mod config;
pub mod debrid;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod queue;
pub mod resolver;
pub mod selector;
pub mod stages;
pub mod types;
pub mod utils;
