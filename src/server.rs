//! HTTP chat surface: a bundled web page plus a small JSON API over
//! [`SessionStore`] and [`AnswerEngine`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::{ChatReply, SessionStore, SessionView};
use crate::error::QueryError;
use crate::rag::AnswerEngine;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<AnswerEngine>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    /// Wraps a ready engine with an empty session store whose sessions
    /// expire after `session_ttl` without activity.
    pub fn new(engine: AnswerEngine, session_ttl: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: Arc::new(SessionStore::with_idle_ttl(session_ttl)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
}

/// Handler failure rendered as `{ message, stage }`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn not_found(id: Uuid) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                message: format!("session {id} not found"),
                stage: None,
            },
        }
    }

    fn bad_body(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            body: ErrorBody {
                message: rejection.body_text(),
                stage: Some("input"),
            },
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                message: format!("{err:#}"),
                stage: None,
            },
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::EmptyQuestion => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!(stage = err.stage(), error = %err, "turn failed");
        }
        Self {
            status,
            body: ErrorBody {
                message: err.to_string(),
                stage: Some(err.stage()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Builds the router with every route attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/v1/sessions", post(create_session))
        .route(
            "/v1/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/v1/sessions/{id}/messages", post(post_message))
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("chat server listening on http://{addr}");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    info!("chat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let view = state.sessions.create().map_err(ApiError::internal)?;
    let live = state.sessions.len().map_err(ApiError::internal)?;
    info!(session = %view.id, live, "session opened");
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .sessions
        .get(id)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(id))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).map_err(ApiError::internal)? {
        info!(session = %id, "session closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(id))
    }
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Result<Json<PostMessage>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = request.map_err(ApiError::bad_body)?;
    let history = state
        .sessions
        .history(id)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(id))?;
    let question = request.content.trim().to_string();
    let start = Instant::now();
    let engine = Arc::clone(&state.engine);
    let asked = question.clone();
    let reply = tokio::task::spawn_blocking(move || engine.respond(&asked, &history))
        .await
        .context("answer task panicked")
        .map_err(ApiError::internal)??;
    let reply = ChatReply::from(reply);
    info!(
        session = %id,
        kind = ?reply.kind,
        route = ?reply.route,
        score = reply.score,
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "turn answered"
    );
    if !state
        .sessions
        .record(id, &question, &reply)
        .map_err(ApiError::internal)?
    {
        return Err(ApiError::not_found(id));
    }
    Ok(Json(reply))
}
