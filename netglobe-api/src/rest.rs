//! HTTP surface: `/ws`, `/metrics`, `/healthz`, plus the viewer's static
//! assets when a frontend directory is configured.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use netglobe_core::subscribers::{SubscriberRegistry, UploadSignal};
use netglobe_telemetry::MetricsRecorder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::ws::handle_socket;
use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub signal: Arc<UploadSignal>,
    pub metrics: Arc<MetricsRecorder>,
    pub frontend_dir: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    let frontend_dir = state.frontend_dir.clone();
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state);

    match frontend_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener, ApiError> {
    TcpListener::bind(addr).await.map_err(|source| ApiError::Bind {
        addr: addr.to_owned(),
        source,
    })
}

/// Serves until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), ApiError> {
    let local_addr = listener.local_addr().map_err(ApiError::Serve)?;
    info!("Listening on {local_addr}");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        cancel.cancelled().await;
    })
    .await
    .map_err(ApiError::Serve)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.gather_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}
