use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use meetspace_core::UrlSuggester;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broadcast::BroadcastScheduler;
use crate::connections::{self, ConnectionRegistry, Heartbeat};
use crate::lifecycle::{self, Inbound, Lifecycle};
use crate::registry::PeerRegistry;

const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub broadcast_interval: Duration,
    pub heartbeat: Heartbeat,
    pub suggest_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            broadcast_interval: Duration::from_millis(100),
            heartbeat: Heartbeat::default(),
            suggest_timeout: Duration::from_secs(20),
        }
    }
}

impl ServerConfig {
    /// Zero periods or queue depth would panic inside a spawned task.
    fn check(&self) -> Result<(), std::io::Error> {
        let zero = [
            ("broadcast_interval", self.broadcast_interval.is_zero()),
            ("heartbeat.interval", self.heartbeat.interval.is_zero()),
            ("heartbeat.timeout", self.heartbeat.timeout.is_zero()),
            ("max_send_queue", self.max_send_queue == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{field} must be greater than zero"),
            )),
            None => Ok(()),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub peers: Arc<PeerRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub inbound_tx: mpsc::Sender<Inbound>,
    pub heartbeat: Heartbeat,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the lifecycle, broadcast, and HTTP tasks, and return a handle
/// that keeps them alive.
pub async fn start(
    config: ServerConfig,
    suggester: Arc<dyn UrlSuggester>,
) -> Result<ServerHandle, std::io::Error> {
    config.check()?;
    let peers = Arc::new(PeerRegistry::new());
    let connections = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_CHANNEL_CAPACITY);
    let lifecycle = Lifecycle::new(
        Arc::clone(&peers),
        Arc::clone(&connections),
        suggester,
        config.suggest_timeout,
    );
    let lifecycle_handle = tokio::spawn(lifecycle::run(lifecycle, inbound_rx));

    let broadcast_handle = BroadcastScheduler::new(
        Arc::clone(&peers),
        Arc::clone(&connections),
        config.broadcast_interval,
    )
    .start();

    let app_state = AppState {
        peers: Arc::clone(&peers),
        connections: Arc::clone(&connections),
        inbound_tx,
        heartbeat: config.heartbeat,
    };

    let router = build_router(app_state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        broadcast_ms = config.broadcast_interval.as_millis() as u64,
        "Meetspace server started"
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        peers,
        connections,
        _server: server_handle,
        _lifecycle: lifecycle_handle,
        _broadcast: broadcast_handle,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub peers: Arc<PeerRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    _server: tokio::task::JoinHandle<()>,
    _lifecycle: tokio::task::JoinHandle<()>,
    _broadcast: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Abort every background task.
    pub fn shutdown(self) {
        self._server.abort();
        self._broadcast.abort();
        self._lifecycle.abort();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (peer_id, rx) = state.connections.register();
    let Some(connection) = state.connections.get(&peer_id) else {
        return;
    };
    tracing::info!(peer_id = %peer_id, "WebSocket client connected");

    if state
        .inbound_tx
        .send(Inbound::Connected(peer_id.clone()))
        .await
        .is_err()
    {
        state.connections.unregister(&peer_id);
        return;
    }

    connections::handle_ws_connection(
        socket,
        connection,
        rx,
        state.inbound_tx.clone(),
        state.heartbeat,
    )
    .await;

    state.connections.unregister(&peer_id);
    let _ = state
        .inbound_tx
        .send(Inbound::Disconnected(peer_id.clone()))
        .await;
    tracing::info!(peer_id = %peer_id, "WebSocket client disconnected");
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.connections.count(),
        "peers": state.peers.len(),
    }))
}
