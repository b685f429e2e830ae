//! Request handlers for the Parley server.
//!
//! Thin HTTP glue over the shared [`Room`]: each handler validates its
//! inputs, calls one room operation, and maps the outcome onto a bare
//! status code (the wire contract carries no error bodies).

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parley_core::{ChatError, Message, MessageId, MessageKind, Participant, Room, Sweeper};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The room every handler operates on.
    pub room: Arc<Room>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            room: Arc::new(Room::new()),
            config,
        }
    }
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // The sweeper holds only a reference to the shared room and races
    // the handlers with no further coordination.
    let sweeper = Sweeper::new(
        Arc::clone(&state.room),
        config.presence.sweep_interval(),
        config.presence.stale_after(),
    );
    tokio::spawn(sweeper.run());

    // Build router
    let app = Router::new()
        .route("/participants", post(join).get(list_participants))
        .route("/status", post(heartbeat))
        .route("/messages", post(post_message).get(list_messages))
        .route("/messages/:id", put(edit_message).delete(delete_message))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler-level error: a [`ChatError`] mapped onto an HTTP status.
#[derive(Debug)]
struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::NameTaken(_) => StatusCode::CONFLICT,
            ChatError::UnknownParticipant(_) | ChatError::UnknownMessage(_) => {
                StatusCode::NOT_FOUND
            }
            ChatError::NotOwner(_) => StatusCode::UNAUTHORIZED,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, status = %status, "request rejected");
        }
        metrics::record_error(error_kind(&self.0));

        status.into_response()
    }
}

fn error_kind(error: &ChatError) -> &'static str {
    match error {
        ChatError::InvalidInput(_) => "invalid_input",
        ChatError::NameTaken(_) => "conflict",
        ChatError::UnknownParticipant(_) => "unknown_participant",
        ChatError::UnknownMessage(_) => "unknown_message",
        ChatError::NotOwner(_) => "not_owner",
        ChatError::Storage(_) => "storage",
    }
}

/// Extract the identity claim from the `user` header.
///
/// The header is an unauthenticated trusted claim, inherited as a
/// protocol constraint.
fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("user")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .ok_or(ApiError(ChatError::InvalidInput("missing user header")))
}

/// Parse the optional `limit` query value.
///
/// Taken as a raw string so a malformed value maps to 422 rather than an
/// extractor-level 400.
fn parse_limit(raw: Option<String>) -> Result<Option<usize>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| Some(n as usize))
            .ok_or(ApiError(ChatError::InvalidInput(
                "limit must be a positive integer",
            ))),
    }
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    to: String,
    text: String,
    #[serde(rename = "type")]
    kind: MessageKind,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<String>,
}

/// POST /participants
async fn join(
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinBody>,
) -> Result<StatusCode, ApiError> {
    let participant = state.room.join(&body.name)?;

    info!(participant = %participant.name, "participant joined");
    metrics::record_join();
    metrics::set_active_participants(state.room.participant_count());

    Ok(StatusCode::CREATED)
}

/// GET /participants
async fn list_participants(State(state): State<Arc<AppState>>) -> Json<Vec<Participant>> {
    Json(state.room.participants())
}

/// POST /status
async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers)?;
    state.room.heartbeat(&user)?;

    metrics::set_active_participants(state.room.participant_count());

    Ok(StatusCode::OK)
}

/// POST /messages
async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers)?;
    let message = state
        .room
        .post_message(&user, &body.to, &body.text, body.kind)?;

    debug!(id = message.id, from = %message.from, kind = ?message.kind, "message posted");
    metrics::record_message(message.kind);

    Ok(StatusCode::CREATED)
}

/// GET /messages
async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = caller(&headers)?;
    let limit = parse_limit(params.limit)?;

    Ok(Json(state.room.messages_for(&user, limit)?))
}

/// PUT /messages/:id
async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MessageId>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers)?;
    state
        .room
        .edit_message(id, &user, &body.to, &body.text, body.kind)?;

    debug!(id, editor = %user, "message edited");

    Ok(StatusCode::OK)
}

/// DELETE /messages/:id
async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MessageId>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers)?;
    state.room.delete_message(id, &user)?;

    debug!(id, requester = %user, "message deleted");

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ChatError::InvalidInput("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ChatError::NameTaken("ana".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                ChatError::UnknownParticipant("ana".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (ChatError::UnknownMessage(7), StatusCode::NOT_FOUND),
            (ChatError::NotOwner(7), StatusCode::UNAUTHORIZED),
            (
                ChatError::Storage("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).into_response().status(), expected);
        }
    }

    #[test]
    fn test_caller_header() {
        let mut headers = HeaderMap::new();
        assert!(caller(&headers).is_err());

        headers.insert("user", "  ".parse().unwrap());
        assert!(caller(&headers).is_err());

        headers.insert("user", "ana".parse().unwrap());
        assert_eq!(caller(&headers).unwrap(), "ana");
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("3".to_string())).unwrap(), Some(3));

        assert!(parse_limit(Some("0".to_string())).is_err());
        assert!(parse_limit(Some("-2".to_string())).is_err());
        assert!(parse_limit(Some("tres".to_string())).is_err());
    }
}
