use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use amadeus_hotels_mcp::{
    AmadeusClient, BearerAuth, ClientPool, HotelTools, McpServer, PerformanceMonitor, Settings,
};

/// MCP server exposing Amadeus hotel search as tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "amadeus-hotels-mcp", version, about)]
struct Cli {
    /// Log level filter (overrides LOG_LEVEL).
    #[arg(long)]
    log_level: Option<String>,

    /// Number of pooled API clients (overrides CLIENT_POOL_SIZE).
    #[arg(long)]
    pool_size: Option<usize>,

    /// Response cache TTL in seconds (overrides CACHE_TTL_SECS).
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Disable the response cache.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    if let Some(size) = cli.pool_size {
        settings.client_pool_size = size;
    }
    if let Some(ttl) = cli.cache_ttl_secs {
        settings.cache_ttl = Duration::from_secs(ttl);
    }
    if cli.no_cache {
        settings.enable_caching = false;
    }

    // Logs go to stderr; stdout belongs to the JSON-RPC transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    settings.validate().context("invalid configuration")?;

    let clients = (0..settings.client_pool_size)
        .map(|_| AmadeusClient::new(&settings))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to construct API clients")?;
    let pool = Arc::new(ClientPool::new(clients, settings.pool_acquire_timeout));
    let monitor = Arc::new(PerformanceMonitor::new(settings.performance_history_size));
    let auth = BearerAuth::new(&settings.auth_tokens);

    info!(
        pool_size = settings.client_pool_size,
        caching = settings.enable_caching,
        cache_ttl_secs = settings.cache_ttl.as_secs(),
        auth_enabled = auth.enabled(),
        base_url = %settings.amadeus_base_url,
        "starting amadeus hotels MCP server"
    );

    let tools = HotelTools::new(Arc::clone(&pool), monitor, settings);
    let server = McpServer::new(tools, auth);
    server.run().await.context("transport failure")?;

    pool.close();
    info!("stdin closed, shutting down");
    Ok(())
}
