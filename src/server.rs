//! Webhook HTTP server built on axum.
//!
//! Routes:
//! - POST /webhook: Telegram updates, always answered with `ok`
//! - GET /download_logs: the request log as a CSV attachment
//! - GET /: liveness text, also the keep-alive target

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use teloxide::types::Update;
use teloxide::Bot;
use tracing::{error, info, warn};

use crate::bot::{handle_update, Conversation};
use crate::request_log::RequestLog;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct ServerState {
    pub bot: Bot,
    pub conversation: Arc<Conversation>,
    pub request_log: Option<Arc<RequestLog>>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", post(webhook))
        .route("/download_logs", get(download_logs))
        .with_state(state)
}

/// Bind and serve until the process stops.
pub async fn serve(bind_addr: &str, port: u16, state: ServerState) -> Result<()> {
    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind webhook server to {addr}"))?;

    info!("Webhook server listening on {addr}");
    axum::serve(listener, router(state))
        .await
        .context("webhook server error")?;
    Ok(())
}

async fn health() -> &'static str {
    "Bot is running"
}

async fn webhook(State(state): State<ServerState>, body: Bytes) -> &'static str {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Discarding malformed update");
            return "ok";
        }
    };

    // Telegram redelivers updates that are not acknowledged quickly
    tokio::spawn(async move {
        if let Err(e) = handle_update(&state.bot, &state.conversation, update).await {
            error!(error = %e, "Failed to handle update");
        }
    });
    "ok"
}

async fn download_logs(State(state): State<ServerState>) -> Response {
    let Some(log) = state.request_log else {
        return (StatusCode::NOT_FOUND, "request log is disabled").into_response();
    };

    match log.contents() {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"logs.csv\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(path = %log.path().display(), error = %e, "Request log unavailable");
            (StatusCode::NOT_FOUND, "request log not found").into_response()
        }
    }
}
