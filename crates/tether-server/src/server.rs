//! Axum acceptor: upgrades `/ws` requests into running connections.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use tether_settings::TetherSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::{Connection, ConnectionLimits};
use crate::registry::{Hub, Registry};
use crate::router::Router;
use crate::socket::Socket;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections.
    pub hub: Arc<Hub>,
    /// Router handed to every accepted connection.
    pub router: Arc<dyn Router>,
    /// Limits applied to every accepted connection.
    pub limits: ConnectionLimits,
}

/// Build the Axum router with the WebSocket and health routes.
pub fn build_router(state: AppState, ws_path: &str) -> axum::Router {
    axum::Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve until [`ServerHandle::shutdown`].
pub async fn start(settings: &TetherSettings, router: Arc<dyn Router>) -> Result<ServerHandle, std::io::Error> {
    let hub = Arc::new(Hub::new());
    let state = AppState {
        hub: Arc::clone(&hub),
        router,
        limits: ConnectionLimits::from(&settings.connection),
    };
    let app = build_router(state, &settings.server.ws_path);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(port = local_addr.port(), path = %settings.server.ws_path, "tether server started");

    let token = CancellationToken::new();
    let shutdown = token.clone();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        token,
        task,
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    /// Bound port (useful when binding to port 0).
    pub port: u16,
    /// Live connections.
    pub hub: Arc<Hub>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Close every connection and stop accepting new ones.
    pub async fn shutdown(self) {
        self.hub.close_all();
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "server task failed during shutdown");
        }
        tracing::info!("tether server stopped");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.limits.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let registry: Arc<dyn Registry> = state.hub;
    let conn = Connection::create(Socket::from_axum(socket), state.router, registry, state.limits);
    tracing::info!(conn_id = %conn.id(), "websocket client connected");
    if let Err(e) = conn.run().await {
        tracing::error!(error = %e, "connection failed to start");
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.hub.connection_count(),
    }))
}
