//! streampace - Mock OpenAI-compatible chat completion server
//!
//! Usage:
//!   streampace                    # Use defaults
//!   CONFIG=config.toml streampace # Use config file
//!   PORT=9000 streampace          # Override the listen port

use std::net::SocketAddr;

use streampace::{create_router, Config, RuntimeState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "streampace=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load_from(&config_path).map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port);

    let state = RuntimeState::new(config).map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    for profile in state.registry.iter() {
        let policy = state.config.token_strategy.select(profile.tokens_per_second);
        tracing::info!(
            "Model {}: {} tokens/s, {} policy",
            profile.id,
            profile.tokens_per_second,
            policy.name()
        );
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("streampace listening on http://{}", addr);
    tracing::info!("Chat endpoint: POST /v1/chat/completions");
    tracing::info!("Models endpoint: GET /v1/models");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
