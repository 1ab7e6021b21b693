//! HTTP server for remote live-status viewers.
//!
//! - `GET /health`
//! - `GET /status`: engine status plus session counters
//! - `GET /frame`: render snapshot of the latest tracked frame
//! - `POST /command`: one console command, e.g. `{"command": "mode execute"}`
//!
//! # Architecture
//!
//! ```text
//! viewer ──→ GET /frame ──→ pose-binder ──→ shared engine
//!                                ↑
//!                       acquisition worker
//! ```

use crate::core::engine::{lock_engine, EngineStatus, SharedEngine};
use crate::core::snapshot::RenderSnapshot;
use crate::input::{OperatorCommand, OperatorSession};
use crate::stats::{SharedSessionStats, StatsSnapshot};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    engine: SharedEngine,
    stats: SharedSessionStats,
    /// Commands from the web share the console's command set
    session: Mutex<OperatorSession>,
}

impl ServerState {
    pub fn new(engine: SharedEngine, stats: SharedSessionStats) -> Self {
        let session = OperatorSession::new(engine.clone(), stats.clone());
        Self::with_session(engine, stats, session)
    }

    /// Use a session that already forwards key releases.
    pub fn with_session(
        engine: SharedEngine,
        stats: SharedSessionStats,
        session: OperatorSession,
    ) -> Self {
        Self {
            engine,
            stats,
            session: Mutex::new(session),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub engine: EngineStatus,
    pub session: StatsSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub status: String,
    pub message: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        engine: lock_engine(&state.engine).status(),
        session: state.stats.stats(),
    })
}

/// GET /frame
async fn frame(State(state): State<Arc<ServerState>>) -> Result<Json<RenderSnapshot>, ApiError> {
    lock_engine(&state.engine)
        .snapshot()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "NO_FRAME", "No frame tracked yet"))
}

/// POST /command
async fn command(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = OperatorCommand::parse(&request.command)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "INVALID_COMMAND", e))?;
    if command == OperatorCommand::Quit {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "NOT_ALLOWED",
            "quit is only accepted from the console",
        ));
    }

    let result = state
        .session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .execute(command);

    match result {
        Ok(message) => Ok(Json(CommandResponse {
            status: "ok".to_string(),
            message,
        })),
        Err(e) => {
            tracing::warn!("Remote command failed: {}", e);
            Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "COMMAND_FAILED", e))
        }
    }
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/frame", get(frame))
        .route("/command", post(command))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Pose binder server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
