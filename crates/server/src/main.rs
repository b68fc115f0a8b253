use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use mcp_openapi_server::app;
use mcp_openapi_server::manager::ServerManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-openapi-server", version, about = "Serve OpenAPI operations as MCP tools")]
struct Args {
    /// Servers file (YAML)
    #[arg(long, env = "MCP_OPENAPI_CONFIG", default_value = "servers.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(long, env = "MCP_OPENAPI_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Timeout for spec fetches and backend calls; 0 disables it
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let manager = ServerManager::new(
        &args.config,
        Duration::from_secs(args.request_timeout_secs),
    )
    .with_context(|| format!("loading {}", args.config.display()))?;
    manager.start_servers().await;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(&manager))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.stop_servers();
    Ok(())
}
