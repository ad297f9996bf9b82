//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::error::RelayError;
use crate::event::EVENT_TYPE_HEADER;
use crate::relay::correlation::{self, CORRELATION_HEADER};
use crate::relay::forward::InboundRequest;
use crate::rules::RuleSet;
use crate::stats::RelayStats;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub dispatcher: Dispatcher,
    pub stats: RelayStats,
}

/// Build the router for the webhook, health, and stats endpoints.
pub fn router(state: AppState) -> Router {
    let webhook_path = state.config.server.webhook_path.clone();

    Router::new()
        .route(&webhook_path, post(handle_webhook))
        .route("/health", get(handle_health))
        .route("/api/stats", get(handle_get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "hook-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("hook-relay shut down gracefully");
    Ok(())
}

/// Handler for POST on the webhook path.
///
/// 1. Parse routing rules from the query string
/// 2. Buffer the body once
/// 3. Decode, select destinations, relay in order
/// 4. Answer 204, or the first failure's status
async fn handle_webhook(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let correlation_id = correlation::generate_id();
    state.stats.inc_received();

    let event_type = request
        .headers()
        .get(EVENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let span = hook_tracing::relay_request_span!(&correlation_id, &event_type);

    let mut response = async {
        let rules = RuleSet::from_query(request.uri().query().unwrap_or_default());
        if rules.is_empty() {
            tracing::debug!("No routing rules in query string");
        }

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read request body");
                return fail(&state, RelayError::UnreadableBody(e.to_string()));
            }
        };

        let inbound = InboundRequest {
            method: parts.method,
            headers: parts.headers,
            body,
        };

        match state
            .dispatcher
            .dispatch(&inbound, &rules, &correlation_id)
            .await
        {
            Ok(relayed) => {
                state.stats.record_relayed(relayed.len());
                tracing::info!(
                    route = %relayed.route,
                    destinations = relayed.len(),
                    "Delivery relayed"
                );
                StatusCode::NO_CONTENT.into_response()
            }
            Err(e) => fail(&state, e),
        }
    }
    .instrument(span.clone())
    .await;

    span.record("status", response.status().as_u16());
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn fail(state: &AppState, error: RelayError) -> Response {
    state.stats.inc_failed();
    tracing::warn!(error = %error, status = error.status_code().as_u16(), "Delivery failed");
    error.into_response()
}

/// GET /api/stats — return current relay statistics.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.stats.snapshot()).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, draining connections...");
}
