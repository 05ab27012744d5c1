//! HTTP surface of the relay.
//!
//! - `POST /message`: validate and queue one message.
//! - `GET /message`: pop one message for clients that poll instead of
//!   holding a WebSocket open.
//! - `GET /health`: liveness plus the current queue size.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway::producer::Producer;
use crate::queue::BoundedQueue;
use crate::relay::filter::MessageFilter;
use crate::relay::message::Message;
use crate::utils::error::PublishError;

#[derive(Clone)]
pub struct AppState {
    pub producer: Producer,
    pub queue: Arc<BoundedQueue>,
    pub filter: MessageFilter,
}

/// Body of `POST /message`. Unlike stored messages, `type` is required here.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<PublishRequest> for Message {
    fn from(request: PublishRequest) -> Self {
        Message {
            kind: Some(request.kind),
            content: request.content,
            extra: request.extra,
        }
    }
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        let status = match self {
            PublishError::EmptyContent | PublishError::ContentTooLong { .. } => {
                StatusCode::BAD_REQUEST
            }
            PublishError::Serialize(_) | PublishError::QueueUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/message", post(handle_publish).get(handle_consume))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve the producer endpoint on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn handle_publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Value>, PublishError> {
    let message = Message::from(request);
    state.producer.publish(&message).await?;
    Ok(Json(json!({ "status": "success", "detail": "Message queued" })))
}

async fn handle_consume(State(state): State<AppState>) -> Json<Value> {
    let timeout = state.queue.config().pop_timeout;
    let popped = state.queue.pop(timeout).await.ok().flatten();

    match popped.filter(|message| state.filter.admits(message)) {
        Some(message) => Json(json!({ "status": "success", "message": message })),
        None => {
            info!("the queue is empty");
            Json(json!({ "status": "empty", "message": "The queue is empty" }))
        }
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let queue_size = state.queue.size().await;
    Json(json!({ "status": "ok", "queue_size": queue_size }))
}
