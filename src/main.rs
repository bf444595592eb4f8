use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use coldquery::config::{Config, LogFormat, Transport};
use coldquery::protocol;
use coldquery::security::AuthGate;
use coldquery::session::{ActionContext, ConnectionPool, PoolExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();
    init_logging(&config);

    info!("coldquery v{}", env!("CARGO_PKG_VERSION"));

    if config.pool_can_starve() {
        warn!(
            "pool_max_size ({}) <= max_sessions ({}): autocommit requests can starve while every connection is pinned to a session",
            config.pool_max_size, config.max_sessions
        );
    }

    let pool = ConnectionPool::connect(&config)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let ctx = ActionContext::new(Arc::new(PoolExecutor::new(pool)), &config);
    let auth = AuthGate::from_config(&config);

    info!(
        "Sessions: max {}, ttl {}s; auth {}",
        config.max_sessions,
        config.session_ttl,
        if auth.is_enabled() { "enabled" } else { "disabled" }
    );

    let served = match config.transport {
        Transport::Stdio => serve_stdio(&config, ctx.clone(), auth).await,
        Transport::Tcp => serve_tcp(&config, ctx.clone(), auth).await,
    };

    ctx.shutdown().await;
    served
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout carries protocol traffic in stdio mode
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn serve_stdio(config: &Config, ctx: ActionContext, auth: AuthGate) -> Result<()> {
    info!("Serving on stdio");
    let served = protocol::serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        ctx,
        auth,
        config.max_request_bytes,
    );

    tokio::select! {
        result = served => {
            result.context("stdio transport failed")?;
            info!("stdin closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }
    Ok(())
}

async fn serve_tcp(config: &Config, ctx: ActionContext, auth: AuthGate) -> Result<()> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("TCP server listening on {}", address);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                info!("New TCP connection from {}", peer);
                let ctx = ctx.clone();
                let auth = auth.clone();
                let max_request_bytes = config.max_request_bytes;
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    if let Err(e) = protocol::serve(reader, writer, ctx, auth, max_request_bytes).await {
                        error!("Connection error from {}: {}", peer, e);
                    }
                    info!("Connection from {} closed", peer);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                return Ok(());
            }
        }
    }
}
