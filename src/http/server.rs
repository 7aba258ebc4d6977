use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{error::ProxyError, interceptor::OfflineInterceptor, request::ProxyRequest};

/// Answered by the proxy itself, never intercepted.
pub const HEALTH_PATH: &str = "/__offline/health";

#[derive(Clone)]
pub struct AppState {
    interceptor: Arc<OfflineInterceptor>,
}

pub fn router(interceptor: Arc<OfflineInterceptor>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { interceptor })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let phase = state.interceptor.phase().await;
    Json(json!({
        "status": "healthy",
        "phase": phase,
        "cache": state.interceptor.config().cache_name,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn intercept(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let request = ProxyRequest::from_axum(request).await?;
    let response = state.interceptor.handle_fetch(request).await?;
    Ok(response.into_response())
}

pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn bind(addr: &str, interceptor: Arc<OfflineInterceptor>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router(interceptor),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self) -> std::io::Result<()> {
        info!("offline proxy listening on {}", self.local_addr()?);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
