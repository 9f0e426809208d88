use std::time::Duration;

use futures::future;

use streampick_service::error::ResolveError;
use streampick_service::types::RequestExtras;

use crate::{record, setup_resolver, setup_resolver_with_debrid, winner};

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_resolve_best_stream() {
    let (resolver, catalog) = setup_resolver(|_| {});

    let result = resolver
        .resolve("movie", "tt0111161", &RequestExtras::default())
        .await
        .unwrap();

    assert_eq!(catalog.calls(), 1);
    insta::assert_json_snapshot!(result, @r###"
    {
      "streams": [
        {
          "name": "StreamPick\n1080p",
          "title": "Movie.1080p.WEB-DL\n👤 120 💾 3.00 GB ⚙️ eztv",
          "infoHash": "9fdd671eaff648d99fdd671eaff648d99fdd671e",
          "behaviorHints": {
            "bingeGroup": "streampick|1080p"
          }
        }
      ],
      "cacheMaxAge": 3600,
      "staleRevalidate": 14400,
      "staleError": 604800
    }
    "###);
    assert_eq!(
        result.cache_control().as_deref(),
        Some("max-age=3600, stale-while-revalidate=14400, stale-if-error=604800, public")
    );
}

#[tokio::test]
async fn test_empty_catalog_result() {
    let (resolver, catalog) = setup_resolver(|_| {});

    let result = resolver
        .resolve("movie", "tt0000001", &RequestExtras::default())
        .await
        .unwrap();

    assert_eq!(catalog.calls(), 1);
    assert!(result.streams.is_empty());
    assert_eq!(result.cache_max_age, 60);
}

#[tokio::test]
async fn test_all_cam_candidates() {
    let (resolver, catalog) = setup_resolver(|_| {});
    catalog.insert(
        "series/tt0944947/1/1.json",
        vec![
            record("Show.S01E01.CAM", 10),
            record("Show.S01E01.TeleSync", 30),
            record("Show.S01E01.SCR", 20),
        ],
    );

    let result = resolver
        .resolve("series", "tt0944947:1:1", &RequestExtras::default())
        .await
        .unwrap();

    assert_eq!(winner(&result), Some("Show.S01E01.TeleSync"));
}

#[tokio::test]
async fn test_unsupported_ids_resolve_to_nothing() {
    let (resolver, catalog) = setup_resolver(|_| {});

    for id in ["tmdb:550", "tt", "kitsu:abc", ""] {
        let result = resolver
            .resolve("movie", id, &RequestExtras::default())
            .await
            .unwrap();
        assert!(result.streams.is_empty());
        assert_eq!(result.cache_max_age, 60);
    }

    assert_eq!(catalog.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_are_deduplicated() {
    let (resolver, catalog) = setup_resolver(|_| {});
    catalog.set_delay(Duration::from_millis(100));

    let extras = RequestExtras::default();
    let requests = (0..10).map(|_| resolver.resolve("movie", "tt0111161", &extras));
    let results = future::join_all(requests).await;

    assert_eq!(catalog.calls(), 1);
    for result in results {
        assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));
    }
    assert_eq!(resolver.pending_resolutions(), 0);

    // the result is cached from now on
    resolver.resolve("movie", "tt0111161", &extras).await.unwrap();
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_requests_are_cached() {
    let (resolver, catalog) = setup_resolver(|_| {});
    catalog.set_delay(Duration::from_secs(1));
    let extras = RequestExtras::default();

    // the client gives up before the catalog responds
    let abandoned = tokio::time::timeout(
        Duration::from_millis(500),
        resolver.resolve("movie", "tt0111161", &extras),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.calls(), 1);
    assert_eq!(resolver.pending_resolutions(), 0);

    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_limited() {
    let (resolver, catalog) = setup_resolver(|config| {
        config.max_concurrent_resolutions = 2;
    });
    catalog.set_delay(Duration::from_secs(1));

    let extras = RequestExtras::default();
    let ids: Vec<_> = (1..=10).map(|i| format!("tt{i:07}")).collect();
    let requests = ids.iter().map(|id| resolver.resolve("movie", id, &extras));
    let results = future::join_all(requests).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(catalog.calls(), 10);
    assert_eq!(catalog.peak_concurrency(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pending_keys_are_bounded() {
    let (resolver, catalog) = setup_resolver(|config| {
        config.max_pending_keys = Some(1);
    });
    catalog.set_delay(Duration::from_secs(1));

    let extras = RequestExtras::default();
    let (first, second) = tokio::join!(
        resolver.resolve("movie", "tt0111161", &extras),
        resolver.resolve("movie", "tt0000002", &extras),
    );

    assert_eq!(winner(&first.unwrap()), Some("Movie.1080p.WEB-DL"));
    let failure = second.unwrap_err();
    assert_eq!(failure.id, "tt0000002");
    assert_eq!(failure.source, ResolveError::QueueFull);
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_while_revalidate() {
    let (resolver, catalog) = setup_resolver(|_| {});
    let extras = RequestExtras::default();

    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));

    tokio::time::advance(2 * HOUR).await;
    catalog.insert(
        "movie/tt0111161.json",
        vec![record("Movie.1080p.BluRay.REPACK", 500)],
    );

    // the stale result is served while the catalog is queried in the background
    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(catalog.calls(), 2);

    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.BluRay.REPACK"));
    assert_eq!(catalog.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_if_error() {
    let (resolver, catalog) = setup_resolver(|_| {});
    let extras = RequestExtras::default();

    resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap();

    tokio::time::advance(24 * HOUR).await;
    catalog.fail_with(Some(ResolveError::Upstream("502 Bad Gateway".into())));

    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));
    assert_eq!(catalog.calls(), 2);

    // once the last good result is too old, the failure comes through
    tokio::time::advance(7 * 24 * HOUR).await;
    let failure = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap_err();
    assert_eq!(
        failure.to_string(),
        "failed request tt0111161: upstream request failed: 502 Bad Gateway"
    );
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let (resolver, catalog) = setup_resolver(|_| {});
    let extras = RequestExtras::default();

    catalog.fail_with(Some(ResolveError::Timeout(Duration::from_secs(30))));
    let failure = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap_err();
    assert_eq!(failure.source, ResolveError::Timeout(Duration::from_secs(30)));

    catalog.fail_with(None);
    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));
    assert_eq!(catalog.calls(), 2);
}

#[tokio::test]
async fn test_quality_filter() {
    let (resolver, catalog) = setup_resolver(|_| {});

    let extras = RequestExtras::parse("qualityfilter=1080p");
    let result = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap();
    assert!(result.streams.is_empty());
    assert_eq!(result.cache_max_age, 60);

    // the filter applies after caching, other requests still see the winner
    let result = resolver
        .resolve("movie", "tt0111161", &RequestExtras::default())
        .await
        .unwrap();
    assert_eq!(winner(&result), Some("Movie.1080p.WEB-DL"));
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test]
async fn test_debrid_links() {
    let (resolver, _catalog) = setup_resolver(|config| {
        config.debrid.resolver_url = Some("https://resolver.example.com".parse().unwrap());
    });

    let extras = RequestExtras::parse("realdebrid=KEY123");
    let result = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap();

    let stream = &result.streams[0];
    assert_eq!(stream.name, "[RD+] StreamPick\n1080p");
    assert_eq!(stream.info_hash, None);
    assert_eq!(
        stream.url.as_deref(),
        Some("https://resolver.example.com/realdebrid/KEY123/9fdd671eaff648d99fdd671eaff648d99fdd671e/null")
    );
    assert_eq!(result.cache_max_age, 3600);

    let extras = RequestExtras::parse("realdebrid=not%20a%20key");
    let result = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap();

    assert_eq!(
        result.streams[0].url.as_deref(),
        Some("https://resolver.example.com/static/failed_access.mp4")
    );
    assert_eq!(result.cache_max_age, 0);
    assert_eq!(result.cache_control(), None);
}

#[tokio::test]
async fn test_debrid_failure() {
    let (resolver, catalog, debrid) = setup_resolver_with_debrid();
    let extras = RequestExtras::parse("realdebrid=KEY123");

    debrid.fail_with(Some(ResolveError::Upstream("debrid unavailable".into())));
    let failure = resolver
        .resolve("movie", "tt0111161", &extras)
        .await
        .unwrap_err();
    assert_eq!(
        failure.to_string(),
        "failed request tt0111161: upstream request failed: debrid unavailable"
    );

    // the selected winner was cached before enrichment failed
    debrid.fail_with(None);
    let result = resolver.resolve("movie", "tt0111161", &extras).await;
    assert_eq!(winner(&result.unwrap()), Some("Movie.1080p.WEB-DL"));
    assert_eq!(catalog.calls(), 1);
    assert_eq!(debrid.calls(), 2);
}
