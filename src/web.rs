use crate::app::{messages::DEFAULT_SEARCH_LIMIT, App, Request, Response};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

/// Serve the message API until Ctrl-C or SIGTERM, then drain the capture queue.
pub async fn start_app(app: App) -> anyhow::Result<()> {
    let listen_addr = app.config().listen_addr.clone();
    let app = Arc::new(app);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    log::info!("listening on {listen_addr}");

    axum::serve(listener, router(app.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutdown signal received");
}

pub fn router(app: Arc<App>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/api/message", post(message))
        .route("/api/search", post(search))
        .route("/api/stats", get(stats))
        .route("/api/analytics", get(analytics))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

/// Envelopes always come back with 200; failures are in `error`.
async fn message(
    State(state): State<Arc<SharedState>>,
    Json(request): Json<Request>,
) -> Json<Response> {
    log::debug!("request: {request:?}");
    Json(state.app.dispatch(request).await)
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Json<Response> {
    let request = Request::Search {
        query: payload.query,
        limit: payload.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    };

    Json(state.app.dispatch(request).await)
}

async fn stats(State(state): State<Arc<SharedState>>) -> Json<Response> {
    Json(state.app.dispatch(Request::GetStats).await)
}

async fn analytics(State(state): State<Arc<SharedState>>) -> Json<Response> {
    Json(state.app.dispatch(Request::GetAnalytics).await)
}
