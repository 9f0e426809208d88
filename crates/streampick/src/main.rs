//! StreamPick.
//!
//! StreamPick is an addon web service that answers stream requests for movies and series episodes
//! with the single best torrent release known to its catalog. Results are cached with
//! stale-while-revalidate semantics, and identical requests arriving at the same time share one
//! catalog lookup.

#![warn(missing_debug_implementations, clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
