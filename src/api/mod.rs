//! HTTP API over the [`ExecutionService`].
//!
//! | Route | |
//! |---|---|
//! | `GET /` | liveness |
//! | `POST /executions` | submit |
//! | `GET /executions` | list, `?status=&limit=` |
//! | `GET /executions/:id` | detail |
//! | `GET /executions/:id/logs` | log page, `?offset=&limit=` |
//! | `POST /executions/:id/cancel` | request cancellation |
//! | `GET /monitoring/readiness` | readiness |
//! | `GET /monitoring/info` | uptime and counters |
//! | `GET /monitoring/websocket-docs` | how to follow logs |

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::service::ExecutionService;

pub const SERVICE_NAME: &str = "ExecutionService";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ExecutionService>,
}

impl ApiState {
    pub fn new(service: Arc<ExecutionService>) -> Self {
        Self { service }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::health))
        .route(
            "/executions",
            get(handlers::list_executions).post(handlers::submit_execution),
        )
        .route("/executions/:execution_id", get(handlers::get_execution))
        .route(
            "/executions/:execution_id/logs",
            get(handlers::get_execution_logs),
        )
        .route(
            "/executions/:execution_id/cancel",
            post(handlers::cancel_execution),
        )
        .route("/monitoring/readiness", get(handlers::readiness))
        .route("/monitoring/info", get(handlers::info))
        .route("/monitoring/websocket-docs", get(handlers::websocket_docs))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_server(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
        e
    })?;
    tracing::info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
