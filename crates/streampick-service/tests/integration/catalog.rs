use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use streampick_service::catalog::{Catalog, CatalogQuery, HttpCatalog};
use streampick_service::config::CatalogConfig;
use streampick_service::debrid::ResolverLinks;
use streampick_service::error::ResolveError;
use streampick_service::resolver::StreamResolver;
use streampick_service::types::RequestExtras;
use streampick_test as test;

use crate::{movie_candidates, winner, CatalogServer};

fn movie() -> CatalogQuery {
    CatalogQuery::Movie {
        imdb_id: "tt0111161".into(),
    }
}

fn catalog(server: &CatalogServer, path: &str) -> HttpCatalog {
    HttpCatalog::new(
        Client::new(),
        Some(server.url(path)),
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn test_lookup() {
    test::setup();
    let server = CatalogServer::new();

    let records = catalog(&server, "catalog/").lookup(movie()).await;
    assert_eq!(records, Ok(movie_candidates()));
    assert_eq!(
        server.all_hits(),
        [("/catalog/movie/tt0111161.json".to_owned(), 1)]
    );
}

#[tokio::test]
async fn test_missing_entries() {
    test::setup();
    let server = CatalogServer::new();
    let catalog = catalog(&server, "catalog");

    let query = CatalogQuery::Episode {
        imdb_id: "tt0944947".into(),
        season: 1,
        episode: 2,
    };
    assert_eq!(catalog.lookup(query).await, Ok(vec![]));

    let query = CatalogQuery::Movie {
        imdb_id: "tt0000000".into(),
    };
    assert_eq!(catalog.lookup(query).await, Ok(vec![]));
    assert_eq!(server.accesses(), 2);
}

#[tokio::test]
async fn test_lookup_errors() {
    test::setup();
    let server = CatalogServer::new();

    let result = catalog(&server, "respond_statuscode/500/")
        .lookup(movie())
        .await;
    assert_eq!(
        result,
        Err(ResolveError::Upstream(
            "catalog responded with 500 Internal Server Error".into()
        ))
    );

    let result = catalog(&server, "garbage_data/").lookup(movie()).await;
    assert!(matches!(result, Err(ResolveError::Malformed(_))));

    let result = catalog(&server, "delay/2000/").lookup(movie()).await;
    assert_eq!(result, Err(ResolveError::Timeout(Duration::from_millis(200))));
}

#[tokio::test]
async fn test_resolve_over_http() {
    test::setup();
    let server = CatalogServer::new();

    let mut config = test::test_config();
    config.catalog = CatalogConfig {
        url: Some(server.url("catalog/")),
        ..CatalogConfig::default()
    };
    let catalog = HttpCatalog::from_config(&config.catalog).unwrap();
    let resolver = StreamResolver::new(
        &config,
        Arc::new(catalog),
        Arc::new(ResolverLinks::default()),
    );

    for _ in 0..3 {
        let result = resolver
            .resolve("movie", "tt0111161", &RequestExtras::default())
            .await
            .unwrap();
        assert_eq!(winner(&result), Some("Movie.1080p.WEB-DL"));
    }
    assert_eq!(server.accesses(), 1);
}
