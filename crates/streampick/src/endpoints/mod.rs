use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

use streampick_service::config::AddonConfig;
use streampick_service::metric;
use streampick_service::resolver::StreamResolver;

mod error;
mod manifest;
mod metrics;
mod stream;

pub use error::ResponseError;
use metrics::MetricsLayer;

use manifest::get_manifest as manifest;
use stream::get_stream as stream;

/// Shared state of all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    resolver: StreamResolver,
    addon: Arc<AddonConfig>,
}

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(resolver: StreamResolver, addon: AddonConfig) -> Router {
    let state = AppState {
        resolver,
        addon: Arc::new(addon),
    };

    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);

    Router::new()
        .route("/manifest.json", get(manifest))
        .route("/:config/manifest.json", get(manifest))
        .route("/stream/:type/:id", get(stream))
        .route("/stream/:type/:id/:extra", get(stream))
        .route("/:config/stream/:type/:id", get(stream))
        .route("/:config/stream/:type/:id/:extra", get(stream))
        .with_state(state)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use streampick_service::debrid::ResolverLinks;
    use streampick_service::error::ResolveError;
    use streampick_service::types::ResolutionResult;
    use streampick_test::{self as test, MockCatalog};

    use super::error::ApiErrorResponse;
    use super::*;

    fn app() -> (Router, MockCatalog) {
        test::setup();

        let config = test::test_config();
        let catalog = MockCatalog::new();
        catalog.insert("movie/tt0111161.json", test::movie_candidates());

        let resolver = StreamResolver::new(
            &config,
            Arc::new(catalog.clone()),
            Arc::new(ResolverLinks::default()),
        );

        (create_app(resolver, AddonConfig::default()), catalog)
    }

    async fn get(app: Router, uri: &str) -> Response {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let (app, _) = app();

        let response = get(app, "/healthcheck").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_manifest() {
        let (app, _) = app();

        let response = get(app, "/manifest.json").await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut manifest: serde_json::Value = json(response).await;
        manifest["version"] = "<version>".into();
        insta::assert_json_snapshot!(manifest, @r###"
        {
          "behaviorHints": {
            "configurable": true
          },
          "catalogs": [],
          "description": "Picks the single best torrent stream for a movie or episode",
          "id": "com.streampick.autopick",
          "idPrefixes": [
            "tt",
            "kitsu"
          ],
          "name": "StreamPick",
          "resources": [
            "stream"
          ],
          "types": [
            "movie",
            "series"
          ],
          "version": "<version>"
        }
        "###);
    }

    #[tokio::test]
    async fn test_stream() {
        let (app, catalog) = app();

        let response = get(app, "/stream/movie/tt0111161.json").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "max-age=3600, stale-while-revalidate=14400, stale-if-error=604800, public"
        );

        let result: ResolutionResult = json(response).await;
        assert_eq!(result.streams.len(), 1);
        assert!(result.streams[0].title.starts_with("Movie.1080p.WEB-DL\n"));
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_configured_stream() {
        let (app, catalog) = app();

        let response = get(
            app,
            "/qualityfilter=1080p%7Csort=size/stream/movie/tt0111161.json",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "max-age=60, stale-while-revalidate=14400, stale-if-error=604800, public"
        );

        let result: ResolutionResult = json(response).await;
        assert!(result.streams.is_empty());
        assert_eq!(result.cache_max_age, 60);
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let (app, catalog) = app();

        let response = get(app, "/stream/channel/tt0111161.json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error: ApiErrorResponse = json(response).await;
        assert_eq!(
            error.detail.as_deref(),
            Some("failed request tt0111161: unsupported content type: channel")
        );
        assert_eq!(catalog.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let (app, catalog) = app();
        catalog.fail_with(Some(ResolveError::Timeout(Duration::from_secs(30))));

        let response = get(app, "/stream/series/tt0944947:1:2.json").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
    }
}
