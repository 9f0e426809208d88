//! Helpers for testing the resolver and the web server.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`CatalogServer`], make sure that the server is held until all requests to it
//!    have been made. If the server is dropped, the port is closed and all lookups fail. To avoid
//!    this, assign it to a variable: `let server = CatalogServer::new();`. Alternatively, use
//!    [`MockCatalog`] to test without HTTP connections.
//!
//!  - [`MockDebrid`] stands in for the debrid link resolver when its failures matter.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Router};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

use streampick_service::catalog::{Catalog, CatalogQuery};
use streampick_service::config::{CacheConfig, Config};
use streampick_service::debrid::Debrid;
use streampick_service::error::ResolveError;
use streampick_service::types::{CandidateRecord, RequestExtras, Stream};

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `streampick` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("streampick=trace,streampick_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A catalog record with the given title and seeders.
pub fn record(title: &str, seeders: u32) -> CandidateRecord {
    CandidateRecord {
        title: title.to_owned(),
        seeders: Some(seeders),
        info_hash: info_hash(title),
        file_index: None,
        size: None,
        provider: None,
    }
}

/// A stable, 40 character info hash derived from the title.
fn info_hash(title: &str) -> String {
    let hash = title.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    format!("{hash:016x}{hash:016x}{:08x}", hash >> 32)
}

/// The candidates of a typical movie: two good 1080p releases and a cam.
///
/// The best pick is the `WEB-DL` release with 120 seeders.
pub fn movie_candidates() -> Vec<CandidateRecord> {
    vec![
        CandidateRecord {
            size: Some(2 * 1024 * 1024 * 1024),
            provider: Some("yts".into()),
            ..record("Movie.1080p.BluRay", 50)
        },
        CandidateRecord {
            size: Some(3 * 1024 * 1024 * 1024),
            provider: Some("eztv".into()),
            ..record("Movie.1080p.WEB-DL", 120)
        },
        record("Movie.720p.CAM", 5),
    ]
}

/// A configuration with fixed cache windows, independent of the environment.
pub fn test_config() -> Config {
    Config {
        caches: CacheConfig {
            fresh_age: Duration::from_secs(3600),
            empty_fresh_age: Duration::from_secs(60),
            stale_revalidate_age: Duration::from_secs(4 * 3600),
            stale_error_age: Duration::from_secs(7 * 24 * 3600),
            max_lazy_refreshes: 50,
        },
        max_concurrent_resolutions: 4,
        ..Config::default()
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    entries: HashMap<String, Vec<CandidateRecord>>,
    failure: Option<ResolveError>,
    delay: Duration,
    calls: usize,
    running: usize,
    peak: usize,
}

/// An in-memory [`Catalog`] that counts its lookups.
///
/// Queries without entries resolve to an empty list. Lookups can be slowed down with
/// [`set_delay`](Self::set_delay) and made to fail with [`fail_with`](Self::fail_with).
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the records returned for a query, keyed by [`CatalogQuery::path`].
    pub fn insert(&self, path: &str, records: Vec<CandidateRecord>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(path.to_owned(), records);
        self
    }

    /// Makes all following lookups fail with the given error, or succeed again with `None`.
    pub fn fail_with(&self, failure: Option<ResolveError>) {
        self.state.lock().unwrap().failure = failure;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    /// The number of lookups started so far.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// The highest number of lookups that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().unwrap().peak
    }
}

impl Catalog for MockCatalog {
    fn lookup(
        &self,
        query: CatalogQuery,
    ) -> BoxFuture<'static, Result<Vec<CandidateRecord>, ResolveError>> {
        let state = Arc::clone(&self.state);

        async move {
            let delay = {
                let mut state = state.lock().unwrap();
                state.calls += 1;
                state.running += 1;
                state.peak = state.peak.max(state.running);
                state.delay
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut state = state.lock().unwrap();
            state.running -= 1;
            match state.failure {
                Some(ref failure) => Err(failure.clone()),
                None => Ok(state
                    .entries
                    .get(&query.path())
                    .cloned()
                    .unwrap_or_default()),
            }
        }
        .boxed()
    }
}

#[derive(Debug, Default)]
struct DebridState {
    failure: Option<ResolveError>,
    calls: usize,
}

/// A [`Debrid`] that passes streams through unchanged and counts its calls.
///
/// Enrichment can be made to fail with [`fail_with`](Self::fail_with).
#[derive(Debug, Clone, Default)]
pub struct MockDebrid {
    state: Arc<Mutex<DebridState>>,
}

impl MockDebrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all following enrichments fail with the given error, or succeed again with `None`.
    pub fn fail_with(&self, failure: Option<ResolveError>) {
        self.state.lock().unwrap().failure = failure;
    }

    /// The number of enrichments started so far.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl Debrid for MockDebrid {
    fn enrich(
        &self,
        streams: Vec<Stream>,
        _extras: &RequestExtras,
    ) -> BoxFuture<'static, Result<Vec<Stream>, ResolveError>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let result = match state.failure {
            Some(ref failure) => Err(failure.clone()),
            None => Ok(streams),
        };
        future::ready(result).boxed()
    }
}

pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Serves the router on an ephemeral port of the loopback interface.
    ///
    /// This must be called within a tokio runtime.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A catalog served over HTTP, counting the hits per path.
///
/// Routes, to be used as catalog base URLs:
///
///  - `/catalog/`: serves [`movie_candidates`] for `movie/tt0111161.json`, an empty list for
///    `movie/tt0000000.json` and `404` for everything else.
///  - `/delay/{millis}/`: waits before redirecting to `/catalog/`.
///  - `/respond_statuscode/{num}/`: responds with the given status code.
///  - `/garbage_data/`: responds with a body that is not JSON.
pub struct CatalogServer {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl CatalogServer {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri): extract::OriginalUri,
                  req: extract::Request,
                  next: middleware::Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.path().to_owned()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route(
                "/catalog/*path",
                get(|extract::Path(path): extract::Path<String>| async move {
                    let records = match path.as_str() {
                        "movie/tt0111161.json" => movie_candidates(),
                        "movie/tt0000000.json" => vec![],
                        _ => return (StatusCode::NOT_FOUND, String::new()),
                    };
                    (StatusCode::OK, serde_json::to_string(&records).unwrap())
                }),
            )
            .route(
                "/delay/:millis/*path",
                get(
                    |extract::Path((millis, path)): extract::Path<(u64, String)>| async move {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                        (StatusCode::FOUND, [("Location", format!("/catalog/{path}"))])
                    },
                ),
            )
            .route(
                "/respond_statuscode/:num/*tail",
                get(
                    |extract::Path((num, _)): extract::Path<(u16, String)>| async move {
                        StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    },
                ),
            )
            .route(
                "/garbage_data/*tail",
                get(|extract::Path(tail): extract::Path<String>| async move { tail }),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// Returns and resets the total number of requests.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns and resets the requests per path.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

impl Default for CatalogServer {
    fn default() -> Self {
        Self::new()
    }
}
