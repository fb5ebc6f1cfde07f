use std::net::SocketAddr;

use anyhow::{Context, Result};
use sidebyside_service::config::Config;
use sidebyside_service::metric;

use crate::endpoints;
use crate::service::RequestService;

/// Creates the request service and serves the HTTP endpoints until shutdown.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("sidebyside-web")
        .enable_all()
        .thread_stack_size(2 * megs)
        .build()?;

    let service = web_pool
        .block_on(RequestService::create(&config))
        .context("failed to create HTTP service state")?;
    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address {:?}", config.bind))?;

    let app = endpoints::create_app(service, config.max_concurrent_requests);
    let server = axum_server::bind(socket).serve(app.into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
