use std::net::SocketAddr;

use anyhow::{Context, Result};

use streampick_service::config::Config;
use streampick_service::metric;
use streampick_service::resolver::StreamResolver;

use crate::endpoints;

/// Creates the resolver and serves the HTTP API on the configured address.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("streampick-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let resolver =
        StreamResolver::from_config(&config).context("failed to create the stream resolver")?;

    let socket = config.bind.parse::<SocketAddr>()?;
    let app = endpoints::create_app(resolver, config.addon.clone());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(axum_server::bind(socket).serve(app.into_make_service()))?;
    tracing::info!("System shutdown complete");

    Ok(())
}
