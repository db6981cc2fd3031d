use anyhow::{Context, Result};
use iaml_proxy::{AppState, ProxyConfig, build_app};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env().context("Failed to read proxy configuration")?;
    let addr = config.addr;
    let app = build_app(AppState::new(config).context("Failed to build HTTP client")?);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "iaml-proxy listening");

    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}
