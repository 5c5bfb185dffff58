//! Axum-based HTTP gateway.
//!
//! Three routes: a streaming conversation endpoint, a digest endpoint with
//! optional persistence, and a health probe. Body limits and request
//! timeouts guard the non-streaming surface.

use crate::agent::{ConversationRequest, Orchestrator, Scope};
use crate::config::AgentConfig;
use crate::digest::DigestGenerator;
use crate::store::Store;
use crate::transport::{stream_turn, TransportEvent};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout for non-streaming routes (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub digest: Arc<DigestGenerator>,
    pub store: Arc<dyn Store>,
    pub chunk_size: usize,
    pub keepalive: Duration,
    pub default_user: String,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        digest: Arc<DigestGenerator>,
        store: Arc<dyn Store>,
        agent: &AgentConfig,
    ) -> Self {
        Self {
            orchestrator,
            digest,
            store,
            chunk_size: agent.chunk_size,
            keepalive: Duration::from_secs(agent.keepalive_secs),
            default_user: agent.default_user.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Optional ISO date hint anchoring calendar retrieval.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DigestBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DigestQuery {
    #[serde(default)]
    pub persist: bool,
}

pub fn router(state: AppState) -> Router {
    // The chat route streams for longer than the request timeout allows, so
    // the timeout layer wraps only the non-streaming routes.
    let guarded = Router::new()
        .route("/digest", post(handle_digest))
        .route("/health", get(handle_health))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)));

    Router::new()
        .route("/agent/chat", post(handle_chat))
        .merge(guarded)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}

pub async fn run(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn scope_from(state: &AppState, body: &ChatBody) -> Scope {
    match &body.project_id {
        Some(project_id) => {
            let slug = body
                .project_slug
                .clone()
                .unwrap_or_else(|| project_id.clone());
            Scope::project(project_id, slug)
        }
        None => Scope::global(
            body.user_id
                .clone()
                .unwrap_or_else(|| state.default_user.clone()),
        ),
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Response {
    if body.message.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "message must not be empty").into_response();
    }

    let request = ConversationRequest {
        scope: scope_from(&state, &body),
        message: body.message,
        history: Vec::new(),
        date: body.date,
    };
    let events = stream_turn(
        state.orchestrator.clone(),
        request,
        state.chunk_size,
        state.keepalive,
    );
    let stream = events.map(|event: TransportEvent| {
        Ok::<_, std::convert::Infallible>(event.to_sse())
    });

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

async fn handle_digest(
    State(state): State<AppState>,
    Query(query): Query<DigestQuery>,
    Json(body): Json<DigestBody>,
) -> Response {
    let user = body
        .user_id
        .clone()
        .unwrap_or_else(|| state.default_user.clone());
    let scope = Scope::global(user);
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());

    let payload = state.digest.generate(&scope, date).await;

    if query.persist {
        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(%error, "digest serialization failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
                    .into_response();
            }
        };
        if let Err(error) = state.store.save_digest(&scope, date, &value).await {
            tracing::error!(%error, "digest persistence failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "persistence failed").into_response();
        }
    }

    Json(payload).into_response()
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
