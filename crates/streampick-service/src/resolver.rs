//! The end-to-end resolution of a stream request.

use std::sync::Arc;
use std::time::Duration;

use crate::caching::ResolutionCache;
use crate::catalog::{Catalog, CatalogQuery, HttpCatalog};
use crate::config::{CacheConfig, Config};
use crate::debrid::{Debrid, ResolverLinks, FAILED_ACCESS};
use crate::error::{ResolutionFailure, ResolveError};
use crate::limiter::ConcurrencyLimiter;
use crate::queue::NamedQueue;
use crate::selector;
use crate::stages;
use crate::types::{ContentType, MediaId, RequestExtras, ResolutionResult, Stream};
use crate::utils::futures::{m, measure};

/// Resolves the single best stream for media requests.
///
/// A request is answered from the resolution cache, keyed by the raw media id. Computations for
/// the cache are de-duplicated per id, bounded globally by a [`ConcurrencyLimiter`], and consist
/// of the catalog lookup followed by the [`selector`]. The cached streams are then filtered and
/// sorted by the request extras, decorated, enriched with debrid links and annotated with their
/// cache lifetimes.
#[derive(Clone)]
pub struct StreamResolver {
    catalog: Arc<dyn Catalog>,
    debrid: Arc<dyn Debrid>,
    cache: ResolutionCache<Vec<Stream>>,
    queue: NamedQueue<String, Vec<Stream>>,
    limiter: ConcurrencyLimiter,
    cache_config: CacheConfig,
}

impl std::fmt::Debug for StreamResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResolver")
            .field("cache", &self.cache)
            .field("queue", &self.queue)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl StreamResolver {
    /// Creates a resolver talking to the configured catalog and debrid resolver.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = HttpCatalog::from_config(&config.catalog)?;
        let debrid = ResolverLinks::from_config(&config.debrid);
        Ok(Self::new(config, Arc::new(catalog), Arc::new(debrid)))
    }

    pub fn new(config: &Config, catalog: Arc<dyn Catalog>, debrid: Arc<dyn Debrid>) -> Self {
        Self {
            catalog,
            debrid,
            cache: ResolutionCache::new("streams", config.caches),
            queue: NamedQueue::new(config.max_pending_keys),
            limiter: ConcurrencyLimiter::new(config.max_concurrent_resolutions),
            cache_config: config.caches,
        }
    }

    /// Resolves the streams for the media item `id` of the given content type.
    ///
    /// Ids of an unknown shape resolve to an empty result without consulting the catalog.
    #[tracing::instrument(name = "resolve", skip(self, extras))]
    pub async fn resolve(
        &self,
        content_type: &str,
        id: &str,
        extras: &RequestExtras,
    ) -> Result<ResolutionResult, ResolutionFailure> {
        metric!(counter("resolve.access") += 1);
        let fail = |err| ResolutionFailure::new(id, err);

        let media_id = match MediaId::parse(id) {
            Ok(media_id) => media_id,
            Err(err) => {
                metric!(counter("resolve.unsupported_id") += 1);
                tracing::debug!("{err}");
                return Ok(self.annotate(Vec::new()));
            }
        };
        let content_type: ContentType = content_type.parse().map_err(fail)?;

        let streams = measure(
            "resolve_streams",
            m::result,
            self.resolve_streams(content_type, id, media_id),
        )
        .await
        .map_err(fail)?;

        let streams = stages::post_filter(streams, extras);
        let streams = stages::sort_streams(streams, extras, content_type);
        let streams = stages::apply_static_info(streams);
        let streams = measure("debrid", m::result, self.debrid.enrich(streams, extras))
            .await
            .map_err(fail)?;

        Ok(self.annotate(streams))
    }

    /// Runs the cached, de-duplicated and limited catalog lookup and selection.
    async fn resolve_streams(
        &self,
        content_type: ContentType,
        id: &str,
        media_id: MediaId,
    ) -> Result<Vec<Stream>, ResolveError> {
        let catalog = Arc::clone(&self.catalog);
        let queue = self.queue.clone();
        let limiter = self.limiter.clone();
        let key = id.to_owned();

        let compute = move || {
            queue.wrap(key, move || async move {
                limiter
                    .run(async move {
                        let Some(query) = CatalogQuery::new(content_type, &media_id) else {
                            return Ok(Vec::new());
                        };
                        catalog.lookup(query).await.map(selector::select)
                    })
                    .await
            })
        };

        self.cache.compute_memoized(id, compute).await
    }

    /// Attaches the cache lifetimes to the final streams.
    ///
    /// Empty results expire quickly, and results that only consist of failed debrid links are
    /// not cached at all.
    pub fn annotate(&self, streams: Vec<Stream>) -> ResolutionResult {
        let cache_max_age = if streams.is_empty() {
            self.cache_config.empty_fresh_age
        } else if streams.iter().all(is_failed_access) {
            Duration::ZERO
        } else {
            self.cache_config.fresh_age
        };

        ResolutionResult {
            streams,
            cache_max_age: cache_max_age.as_secs(),
            stale_revalidate_age: self.cache_config.stale_revalidate_age.as_secs(),
            stale_error_age: self.cache_config.stale_error_age.as_secs(),
        }
    }

    /// The number of media ids with a computation in flight.
    pub fn pending_resolutions(&self) -> usize {
        self.queue.pending()
    }
}

fn is_failed_access(stream: &Stream) -> bool {
    stream
        .url
        .as_deref()
        .is_some_and(|url| url.ends_with(FAILED_ACCESS))
}

#[cfg(test)]
mod tests {
    use futures::future::{self, BoxFuture};

    use super::*;
    use crate::types::CandidateRecord;

    struct NoCatalog;

    impl Catalog for NoCatalog {
        fn lookup(
            &self,
            _query: CatalogQuery,
        ) -> BoxFuture<'static, Result<Vec<CandidateRecord>, ResolveError>> {
            Box::pin(future::ready(Err(ResolveError::Upstream(
                "unexpected lookup".into(),
            ))))
        }
    }

    fn resolver() -> StreamResolver {
        let mut config = Config::default();
        config.caches.fresh_age = Duration::from_secs(3600);
        StreamResolver::new(
            &config,
            Arc::new(NoCatalog),
            Arc::new(ResolverLinks::default()),
        )
    }

    fn stream(url: Option<&str>) -> Stream {
        let mut stream = Stream::from(CandidateRecord {
            title: "Movie.1080p.BluRay".into(),
            seeders: Some(1),
            info_hash: "aaaa".into(),
            file_index: None,
            size: None,
            provider: None,
        });
        stream.url = url.map(Into::into);
        stream
    }

    #[test]
    fn test_annotate() {
        let resolver = resolver();

        let empty = resolver.annotate(vec![]);
        assert_eq!(empty.cache_max_age, 60);
        assert_eq!(empty.stale_revalidate_age, 14400);
        assert_eq!(empty.stale_error_age, 604800);

        let found = resolver.annotate(vec![stream(None)]);
        assert_eq!(found.cache_max_age, 3600);

        let failed = resolver.annotate(vec![stream(Some(
            "https://resolver.example.com/static/failed_access.mp4",
        ))]);
        assert_eq!(failed.cache_max_age, 0);
        assert_eq!(failed.cache_control(), None);
    }

    #[tokio::test]
    async fn test_unsupported_ids_skip_the_catalog() {
        let resolver = resolver();
        let result = resolver
            .resolve("movie", "tmdb:550", &RequestExtras::default())
            .await
            .unwrap();
        assert!(result.streams.is_empty());
        assert_eq!(result.cache_max_age, 60);
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let resolver = resolver();
        let failure = resolver
            .resolve("channel", "tt0111161", &RequestExtras::default())
            .await
            .unwrap_err();
        assert_eq!(failure.id, "tt0111161");
        assert_eq!(
            failure.source,
            ResolveError::UnsupportedType("channel".into())
        );
    }

    #[tokio::test]
    async fn test_failures_are_tagged_with_the_id() {
        let resolver = resolver();
        let failure = resolver
            .resolve("movie", "tt0111161", &RequestExtras::default())
            .await
            .unwrap_err();
        assert_eq!(
            failure.to_string(),
            "failed request tt0111161: upstream request failed: unexpected lookup"
        );
    }
}
