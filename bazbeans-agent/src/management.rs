use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bazbeans_common::config::ManagementApiConfig;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared shutdown flag, checked by the agent's own tick loop between ticks.
/// Setting it lets the in-flight tick finish instead of aborting mid-command.
#[derive(Clone)]
pub struct ShutdownSignal {
    should_shutdown: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self { should_shutdown: Arc::new(AtomicBool::new(false)) }
    }

    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { should_shutdown: flag }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.should_shutdown.load(Ordering::SeqCst)
    }

    pub fn initiate_shutdown(&self) {
        self.should_shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ManagementState {
    config: ManagementApiConfig,
    shutdown: ShutdownSignal,
}

#[derive(Debug, Serialize)]
struct TerminationResponse {
    success: bool,
    message: String,
}

async fn auth_middleware(
    State(state): State<ManagementState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let Some(token) = &state.config.auth_token else {
        return Ok(next.run(request).await);
    };

    let auth_header = request.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok());
    match auth_header {
        Some(auth) if auth.strip_prefix("Bearer ") == Some(token.expose_secret().as_str()) => {
            Ok(next.run(request).await)
        }
        _ => {
            warn!("rejected management API request with missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn handle_terminate(State(state): State<ManagementState>) -> Json<TerminationResponse> {
    info!("received terminate command via management API");
    state.shutdown.initiate_shutdown();
    Json(TerminationResponse {
        success: true,
        message: "shutdown initiated, current tick will finish".to_string(),
    })
}

async fn handle_healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "bazbeans-agent",
    }))
}

fn router(state: ManagementState) -> Router {
    Router::new()
        .route("/control/terminate", post(handle_terminate))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route("/healthz", get(handle_healthz))
        .with_state(state)
}

/// Serves the management API until the process exits. A no-op if disabled
/// in config; callers typically spawn this as its own task alongside the
/// tick loop.
pub async fn serve(config: ManagementApiConfig, shutdown: ShutdownSignal) -> Result<()> {
    if !config.enabled {
        info!("management API disabled");
        return Ok(());
    }

    let listen_addr = config.listen_addr.clone();
    let state = ManagementState { config, shutdown };
    let app = router(state);

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind management API to {listen_addr}"))?;

    info!(addr = %listen_addr, "management API listening");
    axum::serve(listener, app).await.context("management API server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signal_starts_unset() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown_requested());
        signal.initiate_shutdown();
        assert!(signal.is_shutdown_requested());
    }
}
