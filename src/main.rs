use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_animal_expert::{
    config::Config,
    engine::EngineClient,
    server::{AppState, McpServer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP Animal Expert Server starting..."
    );

    // Initialize rule-engine client
    let engine = match EngineClient::new(&config.engine, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.engine.base_url, "Rule engine client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize rule engine client");
            return Err(e.into());
        }
    };

    // Probe the rule service. A transient outage is not fatal: every
    // verification turn surfaces engine errors on its own.
    match engine.list_rules().await {
        Ok(book) => info!(
            rules = book.rules.len(),
            animals = book.animals.len(),
            "Rule engine reachable"
        ),
        Err(e) => warn!(error = %e, "Rule engine not reachable at startup"),
    }

    let sweep_interval = Duration::from_secs(config.session.sweep_interval_secs);
    let idle_timeout_secs = config.session.idle_timeout_secs;

    // Create application state
    let state = Arc::new(AppState::new(config, engine));

    // Reclaim idle verification sessions in the background
    state.store.spawn_sweeper(sweep_interval);
    info!(
        idle_timeout_secs,
        sweep_interval_secs = sweep_interval.as_secs(),
        "Session expiry sweeper started"
    );

    // Start MCP server
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        mcp_animal_expert::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        mcp_animal_expert::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
