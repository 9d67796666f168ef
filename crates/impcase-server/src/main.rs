//! Impcase Server Binary
//!
//! Standalone collaboration server for shared cases.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use impcase_server::{serve, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    }
    .with_env();

    let state = Arc::new(AppState::new());
    serve(&config, state).await?;
    Ok(())
}
