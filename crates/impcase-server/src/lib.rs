//! Impcase Server - collaboration hub for shared cases
//!
//! Clients connect over websocket and exchange binary collaboration packets
//! with a single [`CollabHub`]. A small HTTP API reports hub status.

pub mod config;
pub mod http;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use impcase_core::sync::{bridge, serve_connection, CollabHub};

pub use config::{ServerConfig, ServerError};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared application state
pub struct AppState {
    pub hub: Arc<Mutex<CollabHub>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(CollabHub::new())),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the status API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(http::get_status))
        .route("/cases/{caseid}", get(http::get_case))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Accept websocket clients until the listener fails.
pub async fn serve_collab(listener: TcpListener, hub: Arc<Mutex<CollabHub>>) -> Result<(), ServerError> {
    tracing::info!("Collaboration server listening on {}", listener.local_addr()?);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub).await {
                        tracing::error!("Collaboration connection error from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Collaboration accept error: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: Arc<Mutex<CollabHub>>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::debug!("Websocket handshake complete");
    serve_connection(hub, bridge(ws)).await;
    Ok(())
}

/// Start the collaboration and status servers
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let collab = TcpListener::bind(&config.addr).await?;
    let collab = serve_collab(collab, Arc::clone(&state.hub));

    match &config.status_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr).await?;
            tracing::info!("Status API listening on {}", addr);
            let status = axum::serve(listener, create_router(state)).into_future();
            tokio::select! {
                result = collab => result,
                result = status => result.map_err(ServerError::from),
            }
        }
        None => collab.await,
    }
}
