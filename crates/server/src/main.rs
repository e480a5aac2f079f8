use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use server_api::{
    create_bookmark, delete_bookmark, ensure_known_owner, list_bookmarks, ApiContext,
};
use shared::{
    domain::{Bookmark, BookmarkId, OwnerId},
    error::{ApiError, ErrorCode},
    protocol::{CreateBookmarkRequest, LoginRequest, LoginResponse, ServerEvent},
};
use storage::Storage;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiRejection = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; check the parent directory and its permissions"
        );
        error
    })?;
    let state = AppState::new(ApiContext { storage }, settings.event_buffer);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/bookmarks", get(http_list_bookmarks).post(http_create_bookmark))
        .route("/bookmarks/:bookmark_id", delete(http_delete_bookmark))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn error_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> ApiRejection {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (error_status(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiRejection> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiRejection> {
    let owner_id = server_api::login(&state.api, &req.username)
        .await
        .map_err(reject)?;
    Ok(Json(LoginResponse { owner_id }))
}

async fn http_list_bookmarks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Vec<Bookmark>>, ApiRejection> {
    let bookmarks = list_bookmarks(&state.api, OwnerId(q.owner_id))
        .await
        .map_err(reject)?;
    Ok(Json(bookmarks))
}

async fn http_create_bookmark(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookmarkRequest>,
) -> Result<(StatusCode, Json<Bookmark>), ApiRejection> {
    let (bookmark, event) = create_bookmark(&state.api, req.owner_id, &req.title, &req.url)
        .await
        .map_err(reject)?;
    state.publish(event);
    Ok((StatusCode::CREATED, Json(bookmark)))
}

async fn http_delete_bookmark(
    State(state): State<Arc<AppState>>,
    Path(bookmark_id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<StatusCode, ApiRejection> {
    let event = delete_bookmark(&state.api, OwnerId(q.owner_id), BookmarkId(bookmark_id))
        .await
        .map_err(reject)?;
    if let Some(event) = event {
        state.publish(event);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<OwnerQuery>,
) -> Result<Response, ApiRejection> {
    let owner_id = OwnerId(q.owner_id);
    ensure_known_owner(&state.api, owner_id)
        .await
        .map_err(reject)?;
    Ok(ws
        .on_upgrade(move |socket| ws_connection(state, socket, owner_id))
        .into_response())
}

/// Subscribes to the bus before acknowledging, so anything committed after
/// the client sees `Subscribed` reaches it.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket, owner_id: OwnerId) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events.subscribe());

    if send_event(&mut sender, &ServerEvent::Subscribed { owner_id })
        .await
        .is_err()
    {
        return;
    }
    info!(owner_id = owner_id.0, "ws: subscriber connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(owner_id = owner_id.0, skipped, "ws: subscriber lagged");
                    continue;
                }
            };
            if event.owner_id() != Some(owner_id) {
                continue;
            }
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!(owner_id = owner_id.0, "ws: subscriber disconnected");
}

async fn send_event<S>(sender: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "ws: dropping unencodable event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
