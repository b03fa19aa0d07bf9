//! Signal routes
//!
//! The trigger surface of the pipeline: an inbound signal names one of the
//! configured streams and requests an immediate run. Unrecognized stream
//! names are rejected with a structured error response, never silently
//! accepted.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use mdp_etl::{EtlRunner, TriggerOutcome};

use crate::error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<EtlRunner>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // GET kept alongside POST for parity with legacy signal senders.
        .route("/signal/:stream", get(signal).post(signal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    let streams: Vec<serde_json::Value> = state
        .runner
        .streams()
        .into_iter()
        .map(|stream| {
            let status = state
                .runner
                .status(&stream)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            json!({"stream": stream, "status": status})
        })
        .collect();

    Json(json!({
        "name": "MDP Server",
        "version": env!("CARGO_PKG_VERSION"),
        "streams": streams,
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[tracing::instrument(skip(state), fields(stream = %stream))]
async fn signal(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.runner.trigger(&stream)?;

    tracing::info!(outcome = ?outcome, "signal accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "result": "Signal accepted",
            "error": false,
            "coalesced": outcome == TriggerOutcome::Coalesced,
        })),
    ))
}
