use std::sync::Arc;

use streampick_service::config::Config;
use streampick_service::debrid::ResolverLinks;
use streampick_service::resolver::StreamResolver;
use streampick_service::types::ResolutionResult;
use streampick_test as test;

pub use test::{movie_candidates, record, CatalogServer, MockCatalog, MockDebrid};

/// Setup tests and create a resolver backed by a [`MockCatalog`].
///
/// The catalog already knows the [`movie_candidates`] of `tt0111161`. The `update_config` closure
/// can modify the default test configuration before the resolver is created.
pub fn setup_resolver(update_config: impl FnOnce(&mut Config)) -> (StreamResolver, MockCatalog) {
    test::setup();

    let mut config = test::test_config();
    update_config(&mut config);

    let catalog = MockCatalog::new();
    catalog.insert("movie/tt0111161.json", movie_candidates());

    let debrid = ResolverLinks::from_config(&config.debrid);
    let resolver = StreamResolver::new(&config, Arc::new(catalog.clone()), Arc::new(debrid));

    (resolver, catalog)
}

/// Like [`setup_resolver`] with the default configuration, but enriching through a [`MockDebrid`].
pub fn setup_resolver_with_debrid() -> (StreamResolver, MockCatalog, MockDebrid) {
    test::setup();

    let catalog = MockCatalog::new();
    catalog.insert("movie/tt0111161.json", movie_candidates());
    let debrid = MockDebrid::new();

    let resolver = StreamResolver::new(
        &test::test_config(),
        Arc::new(catalog.clone()),
        Arc::new(debrid.clone()),
    );

    (resolver, catalog, debrid)
}

/// The release title of the first stream, if any.
pub fn winner(result: &ResolutionResult) -> Option<&str> {
    let stream = result.streams.first()?;
    stream.title.split('\n').next()
}
